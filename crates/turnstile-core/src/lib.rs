//! Core types and traits for the Turnstile turn-coordination server.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the contract between the server and the simulations it drives:
//! agent IDs, the [`Environment`] trait, per-agent [`Transition`]s,
//! the [`Message`]/[`Reply`] protocol, and the error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod env;
pub mod error;
pub mod id;
pub mod message;
pub mod single;

pub use env::{check_turn, Environment, Info, StepOutcome, Transition};
pub use error::{ClientError, EnvError, ProtocolError, TurnError};
pub use id::{AgentId, AgentTurn};
pub use message::{Message, Reply};
pub use single::{SingleAgent, SingleAgentEnvironment};
