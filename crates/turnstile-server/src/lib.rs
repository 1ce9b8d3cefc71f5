//! Turn-coordination server for multi-agent environments.
//!
//! A [`TurnServer`] owns a shared [`Environment`](turnstile_core::Environment)
//! on a dedicated thread. Each agent drives it through its own
//! [`AgentClient`] with a blocking `reset()`/`step()` interface; the server
//! collects the actions of every agent whose turn it is, steps the
//! environment once per round, and routes each agent its own result.
//!
//! Use [`create_clients`] for the common case.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod client;
pub mod collector;
pub mod config;
pub mod factory;
pub mod server;
pub(crate) mod server_loop;
pub mod stats;

pub use client::AgentClient;
pub use collector::{ActionCollector, Slot};
pub use config::{ConfigError, ErrorPolicy, ServerConfig};
pub use factory::{create_clients, create_clients_with_config, create_single_client};
pub use server::{ServerError, ShutdownReport, TurnServer};
pub use stats::ServerStats;
