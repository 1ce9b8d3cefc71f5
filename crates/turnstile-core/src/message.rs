//! Messages exchanged between agent clients and the turn server.
//!
//! Clients push [`Message`]s onto the server's single incoming queue; the
//! server answers on each agent's own outgoing queue with a [`Reply`].
//! An agent never sends a second request before it has received the reply
//! to the first.

use crate::env::Transition;
use crate::error::TurnError;
use crate::id::AgentId;

/// A request addressed to the turn server.
#[derive(Debug)]
pub enum Message<A> {
    /// An agent supplies its action for the current round.
    Action {
        /// The chosen action.
        action: A,
        /// The acting agent.
        agent: AgentId,
    },
    /// An agent requests a reset, or, mid-episode, an interrupt.
    Reset {
        /// The requesting agent.
        agent: AgentId,
    },
    /// An internal failure to deliver to every agent awaiting a reply.
    Error {
        /// The failure.
        cause: TurnError,
    },
    /// Poison pill: shut the server down.
    StopServer,
}

impl<A> Message<A> {
    /// The agent that sent this message, if any.
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Self::Action { agent, .. } | Self::Reset { agent } => Some(*agent),
            Self::Error { .. } | Self::StopServer => None,
        }
    }
}

/// The server's answer to one agent.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply<O, I> {
    /// The agent's next observation.
    Observation(Transition<O, I>),
    /// The request failed.
    Error(TurnError),
    /// The server is shutting down.
    StopServer,
}
