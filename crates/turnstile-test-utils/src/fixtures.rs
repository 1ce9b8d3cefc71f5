//! Reusable environment fixtures.
//!
//! - [`FailingEnv`]: a one-agent environment that fails in a chosen way.
//! - [`ScriptedSingle`]: a scalar environment replaying a fixed episode.

use smallvec::smallvec;
use turnstile_core::{
    AgentId, AgentTurn, EnvError, Environment, SingleAgentEnvironment, StepOutcome,
};

/// How a [`FailingEnv`] misbehaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailMode {
    /// `reset()` returns an error.
    Reset,
    /// `step()` returns an error for the first `n` calls, then succeeds.
    StepTimes(usize),
    /// `step()` panics.
    PanicStep,
    /// `step()` returns empty sequences.
    ShortStep,
}

/// One-agent environment that fails on demand.
///
/// Observations count successful steps; the episode never ends on its own.
pub struct FailingEnv {
    pub mode: FailMode,
    steps: u32,
    failures: usize,
}

impl FailingEnv {
    pub fn new(mode: FailMode) -> Self {
        Self {
            mode,
            steps: 0,
            failures: 0,
        }
    }

    pub fn failing_reset() -> Self {
        Self::new(FailMode::Reset)
    }

    /// Fails the first `n` steps.
    pub fn failing_step(n: usize) -> Self {
        Self::new(FailMode::StepTimes(n))
    }

    pub fn panicking_step() -> Self {
        Self::new(FailMode::PanicStep)
    }

    pub fn short_step() -> Self {
        Self::new(FailMode::ShortStep)
    }

    /// How many calls have failed so far.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl Environment for FailingEnv {
    type Observation = u32;
    type Action = u32;
    type Info = ();

    fn num_agents(&self) -> usize {
        1
    }

    fn agent_turn(&self) -> AgentTurn {
        smallvec![AgentId(0)]
    }

    fn reset(&mut self) -> Result<Vec<u32>, EnvError> {
        if self.mode == FailMode::Reset {
            self.failures += 1;
            return Err(EnvError::Failed {
                reason: "deliberate reset failure".into(),
            });
        }
        self.steps = 0;
        Ok(vec![0])
    }

    fn step(&mut self, _actions: Vec<u32>) -> Result<StepOutcome<u32, ()>, EnvError> {
        match self.mode {
            FailMode::StepTimes(n) if self.failures < n => {
                self.failures += 1;
                Err(EnvError::Failed {
                    reason: format!("deliberate step failure {}", self.failures),
                })
            }
            FailMode::PanicStep => panic!("deliberate step panic"),
            FailMode::ShortStep => Ok(StepOutcome {
                observations: Vec::new(),
                rewards: Vec::new(),
                dones: Vec::new(),
                infos: Vec::new(),
            }),
            _ => {
                self.steps += 1;
                Ok(StepOutcome {
                    observations: vec![self.steps],
                    rewards: vec![1.0],
                    dones: vec![false],
                    infos: vec![()],
                })
            }
        }
    }
}

/// Scalar environment replaying a fixed script.
///
/// `reset()` yields `initial`; the k-th `step()` yields `script[k]` and
/// records the action it was given. Stepping past the script fails.
pub struct ScriptedSingle {
    pub initial: i64,
    pub script: Vec<(i64, f64, bool, String)>,
    pub actions: Vec<i64>,
    cursor: usize,
}

impl ScriptedSingle {
    pub fn new(initial: i64, script: Vec<(i64, f64, bool, String)>) -> Self {
        Self {
            initial,
            script,
            actions: Vec::new(),
            cursor: 0,
        }
    }
}

impl SingleAgentEnvironment for ScriptedSingle {
    type Observation = i64;
    type Action = i64;
    type Info = String;

    fn reset(&mut self) -> Result<i64, EnvError> {
        self.cursor = 0;
        self.actions.clear();
        Ok(self.initial)
    }

    fn step(&mut self, action: i64) -> Result<(i64, f64, bool, String), EnvError> {
        let entry = self
            .script
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| EnvError::Failed {
                reason: format!("script exhausted after {} steps", self.cursor),
            })?;
        self.cursor += 1;
        self.actions.push(action);
        Ok(entry)
    }
}
