//! Server configuration, validation, and error types.
//!
//! [`ServerConfig`] is the input for constructing a
//! [`TurnServer`](crate::server::TurnServer).
//! [`validate()`](ServerConfig::validate) checks structural invariants
//! before any thread is spawned.

use thiserror::Error;

// ── ErrorPolicy ────────────────────────────────────────────────────

/// What an [`AgentClient`](crate::client::AgentClient) does when the server
/// answers a request with an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the server, then return the error. Every other agent blocked
    /// on the server observes a cancellation.
    #[default]
    StopOnError,
    /// Return the error and leave the server running.
    Propagate,
}

// ── ServerConfig ───────────────────────────────────────────────────

/// Configuration for a [`TurnServer`](crate::server::TurnServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Name of the dedicated server thread. Default: `"turnstile-server"`.
    pub thread_name: String,
    /// Capacity of the incoming message queue. `None` = unbounded.
    ///
    /// With a bound, clients block when the server falls behind.
    pub incoming_capacity: Option<usize>,
    /// Error policy installed on every client created by the factory.
    /// Default: [`ErrorPolicy::StopOnError`].
    pub error_policy: ErrorPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            thread_name: "turnstile-server".into(),
            incoming_capacity: None,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        if self.incoming_capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building a server or its clients.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The server thread name is empty or whitespace.
    #[error("server thread name must not be empty")]
    EmptyThreadName,
    /// A bounded incoming queue was configured with capacity zero.
    #[error("incoming queue capacity must be at least 1")]
    ZeroCapacity,
    /// The environment reports zero agents.
    #[error("environment must have at least one agent")]
    NoAgents,
    /// A single-agent client was requested for a multi-agent environment.
    #[error("expected a single-agent environment, found {num_agents} agents")]
    NotSingleAgent {
        /// Number of agents the environment reports.
        num_agents: usize,
    },
}
