//! Error types for the Turnstile turn-coordination server.
//!
//! Organized by origin: protocol violations committed by a client,
//! failures raised by the environment, errors carried inside server
//! replies, and the caller-facing error returned by agent clients.
//!
//! Every payload-carrying error is `Clone`: a single environment failure
//! is delivered to every agent that contributed to the failed round.

use thiserror::Error;

use crate::id::AgentId;

/// A client violated the turn/reset protocol.
///
/// Recovered locally by the server: the offending message is rejected
/// with an error reply to that agent only and the round for the other
/// agents is unaffected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The agent sent an action after its episode ended without resetting.
    #[error("agent {agent} did not call reset at the beginning of a new episode")]
    ResetRequired {
        /// The offending agent.
        agent: AgentId,
    },
    /// The agent is not part of the current round.
    #[error("it is currently not agent {agent}'s turn")]
    NotAgentsTurn {
        /// The offending agent.
        agent: AgentId,
    },
    /// The agent already contributed to the current round.
    #[error("an action has already been collected for agent {agent}")]
    DuplicateAction {
        /// The offending agent.
        agent: AgentId,
    },
    /// The agent ID is outside `0..num_agents`.
    #[error("agent {agent} does not exist in an environment of {num_agents} agents")]
    UnknownAgent {
        /// The unknown agent ID.
        agent: AgentId,
        /// Number of agents in the environment.
        num_agents: usize,
    },
    /// Actions were requested before every agent of the round contributed.
    #[error("actions not yet collected for all agents of the round")]
    RoundIncomplete,
    /// The environment reported an `agent_turn` that breaks its contract
    /// (unknown ID, duplicate ID, or empty while agents are still playing).
    #[error("environment reported an invalid agent turn {turn:?}: {reason}")]
    InvalidTurn {
        /// The turn as reported by the environment.
        turn: Vec<AgentId>,
        /// Which part of the contract was broken.
        reason: String,
    },
}

/// The environment failed during `reset()` or `step()`.
///
/// Not recoverable by the server. Environments must leave their
/// observable state untouched when returning an error, so the failed
/// round can be retried from a clean slate.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EnvError {
    /// An action was not legal in the current state.
    #[error("illegal action: {reason}")]
    IllegalAction {
        /// Why the action was rejected.
        reason: String,
    },
    /// Any other environment failure.
    #[error("environment failed: {reason}")]
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The environment panicked; the panic was caught on the server thread.
    #[error("environment panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
    /// A returned per-agent sequence had the wrong length.
    #[error("environment returned {got} {what} for {expected} agents")]
    ShapeMismatch {
        /// Which sequence was malformed (e.g. `"observations"`).
        what: &'static str,
        /// Length actually returned.
        got: usize,
        /// Expected length (`num_agents`).
        expected: usize,
    },
}

/// An error delivered by the server inside a reply.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The agent violated the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The environment failed while processing a round the agent took part in.
    #[error(transparent)]
    Environment(#[from] EnvError),
    /// An internal failure reported to the server from outside.
    #[error("internal server failure: {reason}")]
    Internal {
        /// Description of the failure.
        reason: String,
    },
}

/// Error returned to callers of an agent client's `reset()`/`step()`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The server rejected or could not complete the request.
    #[error(transparent)]
    Turn(#[from] TurnError),
    /// The server stopped while the call was waiting for its reply.
    ///
    /// This is a cancellation, not a failure.
    #[error("the server has stopped")]
    Stopped,
    /// The server was not running when the call was made.
    #[error("the turn server is not running")]
    NotRunning,
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Turn(TurnError::Protocol(e))
    }
}

impl From<EnvError> for ClientError {
    fn from(e: EnvError) -> Self {
        Self::Turn(TurnError::Environment(e))
    }
}

impl ClientError {
    /// Whether this error is a cancellation (`Stopped` or `NotRunning`)
    /// rather than a rejected request.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Stopped | Self::NotRunning)
    }
}
