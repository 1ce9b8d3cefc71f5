//! Test utilities and mock environments for Turnstile development.
//!
//! - [`ProbeEnv`] wraps any environment and detects re-entrant calls.
//! - [`FailingEnv`] fails (or panics) on demand.
//! - [`ScriptedSingle`] replays a fixed single-agent episode.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod probe;

pub use fixtures::{FailMode, FailingEnv, ScriptedSingle};
pub use probe::{ProbeCounters, ProbeEnv};
