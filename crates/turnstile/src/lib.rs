//! Turnstile: drive one turn-based multi-agent environment from many agent
//! threads through a classic blocking `reset()`/`step()` interface.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Turnstile sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::thread;
//! use turnstile::envs::TicTacToe;
//! use turnstile::prelude::*;
//!
//! let mut clients = create_clients(TicTacToe::new(3)).unwrap();
//! let mut second = clients.pop().unwrap();
//! let mut first = clients.pop().unwrap();
//!
//! let agent1 = thread::spawn(move || {
//!     second.reset().unwrap();
//!     // Blocks until agent 0 moves again, or the server stops.
//!     second.step((1, 1))
//! });
//!
//! first.reset().unwrap();
//! let t = first.step((0, 0)).unwrap();
//! // Agent 0 sees agent 1's reply move.
//! assert_eq!(t.observation[1][1], 1);
//! assert!(!t.done);
//!
//! first.close();
//! assert_eq!(agent1.join().unwrap(), Err(ClientError::Stopped));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `turnstile-core` | Agent IDs, the environment trait, messages, errors |
//! | [`server`] | `turnstile-server` | Turn server, agent clients, configuration |
//! | [`envs`] | `turnstile-envs` | Reference environments |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`turnstile-core`).
pub use turnstile_core as types;

/// Turn server, agent clients, and configuration (`turnstile-server`).
///
/// [`server::create_clients`] covers the common case;
/// [`server::TurnServer`] gives control over the lifecycle.
pub use turnstile_server as server;

/// Reference environments (`turnstile-envs`).
pub use turnstile_envs as envs;

/// Common imports for typical Turnstile usage.
///
/// ```rust
/// use turnstile::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use turnstile_core::{
        AgentId, AgentTurn, Environment, Info, SingleAgent, SingleAgentEnvironment, StepOutcome,
        Transition,
    };

    // Errors
    pub use turnstile_core::{ClientError, EnvError, ProtocolError, TurnError};

    // Server
    pub use turnstile_server::{
        create_clients, create_clients_with_config, create_single_client, AgentClient,
        ErrorPolicy, ServerConfig, ServerError, ShutdownReport, TurnServer,
    };
}
