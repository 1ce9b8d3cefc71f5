//! Convenience constructors: one started server, one client per agent.

use std::sync::Arc;

use turnstile_core::{AgentId, Environment};

use crate::client::AgentClient;
use crate::config::{ConfigError, ServerConfig};
use crate::server::{ServerError, TurnServer};

/// Start a server for `env` with the default configuration and return one
/// client per agent, indexed by agent ID.
pub fn create_clients<E: Environment>(env: E) -> Result<Vec<AgentClient<E>>, ServerError> {
    create_clients_with_config(env, ServerConfig::default())
}

/// Like [`create_clients`], with an explicit configuration.
pub fn create_clients_with_config<E: Environment>(
    env: E,
    config: ServerConfig,
) -> Result<Vec<AgentClient<E>>, ServerError> {
    let policy = config.error_policy;
    let server = Arc::new(TurnServer::new(env, config)?);
    server.start()?;
    Ok(AgentId::all(server.num_agents())
        .map(|agent| AgentClient::new(Arc::clone(&server), agent, policy))
        .collect())
}

/// Start a server for a one-agent environment and return its sole client.
///
/// Wrap a scalar environment in
/// [`SingleAgent`](turnstile_core::SingleAgent) first.
pub fn create_single_client<E: Environment>(env: E) -> Result<AgentClient<E>, ServerError> {
    let num_agents = env.num_agents();
    if num_agents != 1 {
        return Err(ConfigError::NotSingleAgent { num_agents }.into());
    }
    create_clients(env)?
        .pop()
        .ok_or(ServerError::Config(ConfigError::NoAgents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_envs::{Countdown, TicTacToe};

    #[test]
    fn one_client_per_agent() {
        let clients = create_clients(Countdown::new(4, 3)).unwrap();
        let ids: Vec<_> = clients.iter().map(|c| c.agent()).collect();
        assert_eq!(ids, AgentId::all(4).collect::<Vec<_>>());
        assert!(clients.iter().all(|c| Arc::ptr_eq(c.server(), clients[0].server())));
        assert!(clients[0].server().is_running());
    }

    #[test]
    fn config_policy_is_installed() {
        let cfg = ServerConfig {
            error_policy: crate::config::ErrorPolicy::Propagate,
            thread_name: "ttt".into(),
            ..ServerConfig::default()
        };
        let clients = create_clients_with_config(TicTacToe::new(3), cfg).unwrap();
        assert!(clients
            .iter()
            .all(|c| c.error_policy() == crate::config::ErrorPolicy::Propagate));
    }

    #[test]
    fn single_client_requires_one_agent() {
        assert_eq!(
            create_single_client(TicTacToe::new(3)).err(),
            Some(ServerError::Config(ConfigError::NotSingleAgent { num_agents: 2 }))
        );
    }

    #[test]
    fn zero_agents_rejected() {
        assert_eq!(
            create_clients(Countdown::new(0, 1)).err(),
            Some(ServerError::Config(ConfigError::NoAgents))
        );
    }
}
