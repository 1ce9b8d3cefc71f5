//! Call-probing environment wrapper.
//!
//! [`ProbeEnv`] forwards every call to the wrapped environment while
//! recording, through shared atomics, how often `reset()`/`step()` ran and
//! whether two calls ever overlapped. The counters stay readable from the
//! test thread after the environment has been moved onto the server thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use turnstile_core::{AgentTurn, EnvError, Environment, StepOutcome};

/// Counters shared between a [`ProbeEnv`] and the test.
#[derive(Debug, Default)]
pub struct ProbeCounters {
    inside: AtomicBool,
    overlaps: AtomicUsize,
    resets: AtomicUsize,
    steps: AtomicUsize,
}

impl ProbeCounters {
    /// Calls that started while another call was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exit(&self) {
        self.inside.store(false, Ordering::SeqCst);
    }
}

/// Wraps an environment and probes how it is called.
pub struct ProbeEnv<E> {
    inner: E,
    counters: Arc<ProbeCounters>,
    delay: Duration,
}

impl<E: Environment> ProbeEnv<E> {
    /// Wrap `inner`; the returned counters observe every call.
    pub fn new(inner: E) -> (Self, Arc<ProbeCounters>) {
        let counters = Arc::new(ProbeCounters::default());
        let env = Self {
            inner,
            counters: Arc::clone(&counters),
            delay: Duration::ZERO,
        };
        (env, counters)
    }

    /// Sleep inside every call, widening the window for overlaps.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn probed<T>(&mut self, f: impl FnOnce(&mut E) -> T) -> T {
        self.counters.enter();
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let out = f(&mut self.inner);
        self.counters.exit();
        out
    }
}

impl<E: Environment> Environment for ProbeEnv<E> {
    type Observation = E::Observation;
    type Action = E::Action;
    type Info = E::Info;

    fn num_agents(&self) -> usize {
        self.inner.num_agents()
    }

    fn agent_turn(&self) -> AgentTurn {
        self.inner.agent_turn()
    }

    fn reset(&mut self) -> Result<Vec<E::Observation>, EnvError> {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        self.probed(|env| env.reset())
    }

    fn step(
        &mut self,
        actions: Vec<E::Action>,
    ) -> Result<StepOutcome<E::Observation, E::Info>, EnvError> {
        self.counters.steps.fetch_add(1, Ordering::SeqCst);
        self.probed(|env| env.step(actions))
    }
}
