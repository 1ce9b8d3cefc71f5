//! User-facing [`TurnServer`] handle and shutdown sequence.
//!
//! # Architecture
//!
//! ```text
//! Agent Thread(s)                       Server Thread
//!     |                                      |
//!     |--Message::{Action,Reset}------------>| incoming.recv()
//!     |   [incoming: unbounded or bounded]   | ServerLoop::handle()
//!     |                                      |   collect / step / reset
//!     |<--Reply on outgoing[agent]-----------|
//!     |   blocks on outgoing[agent].recv()   |
//! ```
//!
//! The server thread owns the environment; agent threads only touch the
//! channels. [`TurnServer::stop`] is safe to call from any thread, any
//! number of times.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{error, info, info_span, warn};

use turnstile_core::{AgentId, ClientError, Environment, Message, Reply, TurnError};

use crate::config::{ConfigError, ServerConfig};
use crate::server_loop::ServerLoop;
use crate::stats::ServerStats;

type StopCallback = Box<dyn FnOnce() + Send + 'static>;

// ── Error types ──────────────────────────────────────────────────

/// Error from the server lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ServerError {
    /// The configuration or the environment was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// `start()` was called on a server that was started (or stopped) before.
    #[error("the turn server has already been started")]
    AlreadyStarted,
    /// The server thread could not be spawned.
    #[error("failed to spawn server thread: {reason}")]
    ThreadSpawnFailed {
        /// The OS error.
        reason: String,
    },
    /// The server loop is not running.
    #[error("the turn server is not running")]
    NotRunning,
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`TurnServer::stop`].
///
/// Only the caller that actually performed the shutdown gets a populated
/// report; every other caller gets [`ShutdownReport::default()`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Whether the server thread was joined successfully.
    pub joined: bool,
    /// Replies discarded from the agents' queues.
    pub drained: usize,
    /// Counters of the finished run.
    pub stats: ServerStats,
}

// ── TurnServer ───────────────────────────────────────────────────

/// Handle to a turn-coordination server.
///
/// Created unstarted by [`TurnServer::new`]; the loop runs on a dedicated
/// thread once [`start`](Self::start) is called. Shared between agent
/// clients behind an [`Arc`]; dropping the last handle stops and joins
/// the server thread.
pub struct TurnServer<E: Environment> {
    num_agents: usize,
    config: ServerConfig,
    incoming: Sender<Message<E::Action>>,
    outgoing_tx: Vec<Sender<Reply<E::Observation, E::Info>>>,
    outgoing_rx: Vec<Receiver<Reply<E::Observation, E::Info>>>,
    /// Loop state until `start()` moves it onto the server thread.
    pending: Mutex<Option<ServerLoop<E>>>,
    /// Doubles as the stop lock: concurrent `stop()` callers queue here.
    thread: Mutex<Option<JoinHandle<ServerStats>>>,
    stop_callback: Arc<Mutex<Option<StopCallback>>>,
    running: Arc<AtomicBool>,
    stopping: AtomicBool,
}

impl<E: Environment> TurnServer<E> {
    /// Create a server for `env`. Nothing runs until [`start`](Self::start).
    pub fn new(env: E, config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_agents = env.num_agents();
        if num_agents == 0 {
            return Err(ConfigError::NoAgents);
        }

        let (incoming, incoming_rx) = match config.incoming_capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };
        let (outgoing_tx, outgoing_rx): (Vec<_>, Vec<_>) = (0..num_agents)
            .map(|_| crossbeam_channel::unbounded())
            .unzip();
        let state = ServerLoop::new(env, incoming_rx, outgoing_tx.clone());

        Ok(Self {
            num_agents,
            config,
            incoming,
            outgoing_tx,
            outgoing_rx,
            pending: Mutex::new(Some(state)),
            thread: Mutex::new(None),
            stop_callback: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            stopping: AtomicBool::new(false),
        })
    }

    /// Number of agents in the managed environment.
    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    /// The configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawn the server thread.
    ///
    /// A server runs at most once: calling `start()` again, or after
    /// `stop()`, fails with [`ServerError::AlreadyStarted`].
    pub fn start(&self) -> Result<(), ServerError> {
        let mut slot = lock(&self.thread);
        if self.stopping.load(Ordering::Acquire) {
            return Err(ServerError::AlreadyStarted);
        }
        let state = lock(&self.pending)
            .take()
            .ok_or(ServerError::AlreadyStarted)?;

        let name = self.config.thread_name.clone();
        let guard = ExitGuard {
            running: Arc::clone(&self.running),
            outgoing: self.outgoing_tx.clone(),
        };
        let callback = Arc::clone(&self.stop_callback);
        self.running.store(true, Ordering::Release);

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let span = info_span!("turn_server", thread = %name);
            let stats = span.in_scope(|| state.run());
            drop(guard);
            let cb = lock(&callback).take();
            if let Some(cb) = cb {
                cb();
            }
            stats
        });

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(ServerError::ThreadSpawnFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Whether the server loop is running and no stop has been requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.stopping.load(Ordering::Acquire)
    }

    /// Register a callback run on the server thread after its loop exits.
    ///
    /// Replaces any previously registered callback. The callback must not
    /// call [`stop`](Self::stop) or own a handle to this server.
    pub fn set_stop_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *lock(&self.stop_callback) = Some(Box::new(callback));
    }

    /// Deliver `cause` as an error reply to every agent currently waiting
    /// for a reply.
    pub fn report_error(&self, cause: TurnError) -> Result<(), ServerError> {
        if !self.is_running() {
            return Err(ServerError::NotRunning);
        }
        self.incoming
            .send(Message::Error { cause })
            .map_err(|_| ServerError::NotRunning)
    }

    /// Stop the server and join its thread.
    ///
    /// Thread-safe and idempotent. The first caller runs the shutdown
    /// sequence:
    ///
    /// 1. Mark the server as stopping, so new client calls fail fast.
    /// 2. Enqueue `StopServer` and join the server thread.
    /// 3. Replace whatever is queued for each agent with `StopServer`,
    ///    releasing every client blocked on a reply.
    ///
    /// Concurrent callers block until that sequence finishes.
    pub fn stop(&self) -> ShutdownReport {
        let mut thread = lock(&self.thread);
        if self.stopping.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        let start = Instant::now();

        // Never-started loop state owns the incoming receiver; drop it so
        // the send below cannot block on a full bounded queue.
        lock(&self.pending).take();

        let (joined, stats) = match thread.take() {
            Some(handle) => {
                // Fails only if the loop has already exited.
                let _ = self.incoming.send(Message::StopServer);
                match handle.join() {
                    Ok(stats) => (true, stats),
                    Err(_) => {
                        warn!("turn server thread panicked");
                        (false, ServerStats::default())
                    }
                }
            }
            None => (false, ServerStats::default()),
        };

        let mut drained = 0;
        for (tx, rx) in self.outgoing_tx.iter().zip(&self.outgoing_rx) {
            drained += rx.try_iter().count();
            // Cannot fail: `rx` is alive.
            let _ = tx.send(Reply::StopServer);
        }

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            joined,
            drained,
            stats,
        };
        info!(
            total_ms = report.total_ms,
            joined = report.joined,
            drained = report.drained,
            "turn server shut down"
        );
        report
    }

    /// Send a request on behalf of `agent` and block for the reply.
    pub(crate) fn exchange(
        &self,
        agent: AgentId,
        msg: Message<E::Action>,
    ) -> Result<Reply<E::Observation, E::Info>, ClientError> {
        if !self.is_running() {
            return Err(ClientError::NotRunning);
        }
        let rx = self
            .outgoing_rx
            .get(agent.index())
            .ok_or(ClientError::NotRunning)?;
        self.incoming
            .send(msg)
            .map_err(|_| ClientError::NotRunning)?;
        rx.recv().map_err(|_| ClientError::Stopped)
    }
}

impl<E: Environment> Drop for TurnServer<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<E: Environment> std::fmt::Debug for TurnServer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnServer")
            .field("num_agents", &self.num_agents)
            .field("thread_name", &self.config.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Marks the server stopped when its thread exits. If the thread is
/// unwinding, every agent also gets `StopServer` so no client stays
/// blocked on a reply that will never come.
struct ExitGuard<O, I> {
    running: Arc<AtomicBool>,
    outgoing: Vec<Sender<Reply<O, I>>>,
}

impl<O, I> Drop for ExitGuard<O, I> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if thread::panicking() {
            error!("turn server thread panicked; releasing waiting agents");
            for tx in &self.outgoing {
                // Cannot fail: the server handle keeps every receiver alive.
                let _ = tx.send(Reply::StopServer);
            }
        }
    }
}

/// Lock a mutex, recovering the data from a poisoned lock.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use turnstile_core::{AgentTurn, EnvError, StepOutcome};
    use turnstile_envs::TicTacToe;

    use crate::client::AgentClient;
    use crate::config::ErrorPolicy;

    /// An observation whose `clone()` panics, tripping the loop outside
    /// any environment call.
    #[derive(Debug)]
    struct Unclonable;

    impl Clone for Unclonable {
        fn clone(&self) -> Self {
            panic!("observation refuses to be cloned")
        }
    }

    struct UnclonableEnv;

    impl Environment for UnclonableEnv {
        type Observation = Unclonable;
        type Action = ();
        type Info = ();

        fn num_agents(&self) -> usize {
            1
        }

        fn agent_turn(&self) -> AgentTurn {
            AgentId::all(1).collect()
        }

        fn reset(&mut self) -> Result<Vec<Unclonable>, EnvError> {
            Ok(vec![Unclonable])
        }

        fn step(&mut self, _actions: Vec<()>) -> Result<StepOutcome<Unclonable, ()>, EnvError> {
            Err(EnvError::Failed {
                reason: "never stepped".into(),
            })
        }
    }

    fn server() -> TurnServer<TicTacToe> {
        TurnServer::new(TicTacToe::new(3), ServerConfig::default()).unwrap()
    }

    #[test]
    fn new_server_is_not_running() {
        let s = server();
        assert!(!s.is_running());
        assert_eq!(s.num_agents(), 2);
        assert_eq!(
            s.exchange(AgentId(0), Message::Reset { agent: AgentId(0) }),
            Err(ClientError::NotRunning)
        );
    }

    #[test]
    fn start_twice_fails() {
        let s = server();
        s.start().unwrap();
        assert!(s.is_running());
        assert_eq!(s.start(), Err(ServerError::AlreadyStarted));
        let report = s.stop();
        assert!(report.joined);
        assert!(!s.is_running());
    }

    #[test]
    fn stop_before_start_prevents_start() {
        let s = server();
        let report = s.stop();
        assert!(!report.joined);
        assert_eq!(s.start(), Err(ServerError::AlreadyStarted));
    }

    #[test]
    fn second_stop_returns_empty_report() {
        let s = server();
        s.start().unwrap();
        s.exchange(AgentId(0), Message::Reset { agent: AgentId(0) })
            .unwrap();
        let first = s.stop();
        assert!(first.joined);
        assert_eq!(first.stats.episodes, 1);
        assert_eq!(s.stop(), ShutdownReport::default());
    }

    #[test]
    fn stop_callback_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let s = server();
        let c = Arc::clone(&calls);
        s.set_stop_callback(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        s.start().unwrap();
        s.stop();
        s.stop();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_stops_the_server() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let s = server();
            let c = Arc::clone(&calls);
            s.set_stop_callback(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
            s.start().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let cfg = ServerConfig {
            incoming_capacity: Some(0),
            ..ServerConfig::default()
        };
        assert_eq!(
            TurnServer::new(TicTacToe::new(3), cfg).err(),
            Some(ConfigError::ZeroCapacity)
        );
    }

    #[test]
    fn report_error_requires_running_server() {
        let s = server();
        let cause = TurnError::Internal {
            reason: "x".into(),
        };
        assert_eq!(s.report_error(cause), Err(ServerError::NotRunning));
    }

    #[test]
    fn loop_panic_releases_waiting_clients() {
        let server = Arc::new(TurnServer::new(UnclonableEnv, ServerConfig::default()).unwrap());
        server.start().unwrap();
        let mut client = AgentClient::new(Arc::clone(&server), AgentId(0), ErrorPolicy::Propagate);

        assert_eq!(client.reset().unwrap_err(), ClientError::Stopped);
        assert!(!server.is_running());
        assert_eq!(client.reset().unwrap_err(), ClientError::NotRunning);

        let report = server.stop();
        assert!(!report.joined);
    }
}
