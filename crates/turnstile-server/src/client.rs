//! Per-agent client handle with a classic blocking reset/step interface.

use std::sync::Arc;

use tracing::warn;

use turnstile_core::{AgentId, ClientError, Environment, Message, Reply, Transition, TurnError};

use crate::config::ErrorPolicy;
use crate::server::TurnServer;

/// One agent's view of a shared multi-agent environment.
///
/// `reset()` and `step()` take `&mut self`, so a client can have at most
/// one request in flight. Clients are `Send` and meant to be moved onto
/// the agent's own thread.
pub struct AgentClient<E: Environment> {
    server: Arc<TurnServer<E>>,
    agent: AgentId,
    policy: ErrorPolicy,
}

impl<E: Environment> AgentClient<E> {
    /// Create a client for `agent` on a (possibly not yet started) server.
    pub fn new(server: Arc<TurnServer<E>>, agent: AgentId, policy: ErrorPolicy) -> Self {
        Self {
            server,
            agent,
            policy,
        }
    }

    /// The agent this client acts for.
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// Number of agents sharing the environment.
    pub fn num_agents(&self) -> usize {
        self.server.num_agents()
    }

    /// The shared server handle.
    pub fn server(&self) -> &Arc<TurnServer<E>> {
        &self.server
    }

    /// Current error policy.
    pub fn error_policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Replace the error policy.
    pub fn set_error_policy(&mut self, policy: ErrorPolicy) {
        self.policy = policy;
    }

    /// Start (or join) an episode and return this agent's first observation.
    ///
    /// Blocks until it is this agent's turn. Mid-episode, this is a vote to
    /// interrupt the episode for everyone.
    pub fn reset(&mut self) -> Result<E::Observation, ClientError> {
        let agent = self.agent;
        self.request(Message::Reset { agent }).map(|t| t.observation)
    }

    /// Submit an action and block until this agent's next observation.
    pub fn step(
        &mut self,
        action: E::Action,
    ) -> Result<Transition<E::Observation, E::Info>, ClientError> {
        let agent = self.agent;
        self.request(Message::Action { action, agent })
    }

    /// Stop the shared server. Idempotent.
    pub fn close(&self) {
        self.server.stop();
    }

    fn request(
        &mut self,
        msg: Message<E::Action>,
    ) -> Result<Transition<E::Observation, E::Info>, ClientError> {
        match self.server.exchange(self.agent, msg)? {
            Reply::Observation(t) => Ok(t),
            Reply::StopServer => Err(ClientError::Stopped),
            Reply::Error(e) => Err(self.on_error(e)),
        }
    }

    fn on_error(&self, e: TurnError) -> ClientError {
        if self.policy == ErrorPolicy::StopOnError {
            warn!(agent = %self.agent, error = %e, "request failed; stopping the server");
            self.server.stop();
        }
        ClientError::Turn(e)
    }
}

impl<E: Environment> std::fmt::Debug for AgentClient<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("agent", &self.agent)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use turnstile_core::ProtocolError;
    use turnstile_envs::TicTacToe;

    fn client(policy: ErrorPolicy) -> AgentClient<TicTacToe> {
        let server = TurnServer::new(TicTacToe::new(3), ServerConfig::default()).unwrap();
        server.start().unwrap();
        AgentClient::new(Arc::new(server), AgentId(0), policy)
    }

    #[test]
    fn propagate_leaves_server_running() {
        let mut c = client(ErrorPolicy::Propagate);
        let err = c.step((0, 0)).unwrap_err();
        assert_eq!(
            err,
            ClientError::from(ProtocolError::ResetRequired { agent: AgentId(0) })
        );
        assert!(c.server().is_running());
        assert!(c.reset().is_ok());
    }

    #[test]
    fn stop_on_error_stops_server() {
        let mut c = client(ErrorPolicy::StopOnError);
        assert!(c.step((0, 0)).is_err());
        assert!(!c.server().is_running());
        assert_eq!(c.reset().unwrap_err(), ClientError::NotRunning);
    }

    #[test]
    fn close_is_idempotent() {
        let mut c = client(ErrorPolicy::default());
        c.close();
        c.close();
        assert_eq!(c.reset().unwrap_err(), ClientError::NotRunning);
        assert_eq!(c.num_agents(), 2);
    }
}
