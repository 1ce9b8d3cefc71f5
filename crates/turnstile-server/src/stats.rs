//! Counters maintained by the server loop.
//!
//! [`ServerStats`] is owned by the server thread and handed back through
//! its `JoinHandle` when the loop exits.

/// Cumulative counters for one server run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Messages dequeued, including the final `StopServer`.
    pub messages: u64,
    /// Completed rounds (successful steps and interrupt resets).
    pub transitions: u64,
    /// Episodes started by a full environment reset.
    pub episodes: u64,
    /// Episodes cut short by an interrupt vote.
    pub interrupts: u64,
    /// Requests rejected for violating the turn/reset protocol.
    pub protocol_errors: u64,
    /// Environment calls that returned an error or panicked.
    pub env_failures: u64,
}
