//! The environment contract driven by the turn server, and the per-agent
//! result types handed back to clients.

use crate::error::{EnvError, ProtocolError};
use crate::id::{AgentId, AgentTurn};

/// A turn-based multi-agent simulation.
///
/// The server calls into an `Environment` from a single dedicated thread,
/// so implementations need to be [`Send`] but never [`Sync`].
///
/// # Contract
///
/// - `num_agents()` is at least 1 and fixed for the instance's lifetime.
/// - `reset()` returns exactly `num_agents()` observations, indexed by
///   [`AgentId`].
/// - `step()` receives one action per agent of `agent_turn()`, in that
///   order, and returns one entry per agent in every sequence of the
///   [`StepOutcome`] (not only for the agents that acted).
/// - `agent_turn()` contains only IDs below `num_agents()`, no
///   duplicates, and is non-empty unless every agent is done.
/// - `reset()` and `step()` are atomic: on `Err`, observable state
///   (including `agent_turn()`) is exactly as before the call.
pub trait Environment: Send + 'static {
    /// What each agent observes.
    type Observation: Clone + Send + 'static;
    /// What each agent submits on its turn.
    type Action: Send + 'static;
    /// Per-agent auxiliary data returned by `step()`.
    type Info: Clone + Send + 'static;

    /// Number of agents. Fixed for the lifetime of the environment.
    fn num_agents(&self) -> usize;

    /// Agents whose actions are required before the next `step()`.
    fn agent_turn(&self) -> AgentTurn;

    /// Start a new episode and return one observation per agent.
    fn reset(&mut self) -> Result<Vec<Self::Observation>, EnvError>;

    /// Apply the actions of the agents in `agent_turn()`, in that order.
    fn step(
        &mut self,
        actions: Vec<Self::Action>,
    ) -> Result<StepOutcome<Self::Observation, Self::Info>, EnvError>;
}

/// Parallel per-agent sequences returned by [`Environment::step`].
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome<O, I> {
    /// One observation per agent.
    pub observations: Vec<O>,
    /// One reward per agent.
    pub rewards: Vec<f64>,
    /// One done flag per agent.
    pub dones: Vec<bool>,
    /// One info record per agent.
    pub infos: Vec<I>,
}

impl<O, I> StepOutcome<O, I> {
    /// Check that every sequence holds exactly `num_agents` entries.
    pub fn check_shape(&self, num_agents: usize) -> Result<(), EnvError> {
        let lens = [
            ("observations", self.observations.len()),
            ("rewards", self.rewards.len()),
            ("dones", self.dones.len()),
            ("infos", self.infos.len()),
        ];
        for (what, got) in lens {
            if got != num_agents {
                return Err(EnvError::ShapeMismatch {
                    what,
                    got,
                    expected: num_agents,
                });
            }
        }
        Ok(())
    }
}

/// Info attached to a single agent's [`Transition`].
///
/// `details` is `None` for observations produced by `reset()` and holds
/// the environment's info record for observations produced by `step()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Info<I> {
    /// The episode was cut short because another agent requested a reset.
    pub interrupted: bool,
    /// The environment's own info record, if any.
    pub details: Option<I>,
}

impl<I> Default for Info<I> {
    fn default() -> Self {
        Self {
            interrupted: false,
            details: None,
        }
    }
}

/// What one agent receives from `reset()` or `step()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition<O, I> {
    /// The agent's observation.
    pub observation: O,
    /// The agent's reward for the last step.
    pub reward: f64,
    /// Whether the agent's episode has ended.
    pub done: bool,
    /// Auxiliary data.
    pub info: Info<I>,
}

impl<O, I> Transition<O, I> {
    /// A fresh post-reset observation: zero reward, not done, empty info.
    pub fn initial(observation: O) -> Self {
        Self {
            observation,
            reward: 0.0,
            done: false,
            info: Info::default(),
        }
    }

    /// Destructure into the classic `(observation, reward, done, info)` tuple.
    pub fn into_tuple(self) -> (O, f64, bool, Info<I>) {
        (self.observation, self.reward, self.done, self.info)
    }
}

/// Validate an `agent_turn` reported by an environment.
///
/// `all_done` relaxes the non-empty requirement: once every agent is done,
/// an empty turn is legal.
pub fn check_turn(turn: &[AgentId], num_agents: usize, all_done: bool) -> Result<(), ProtocolError> {
    let invalid = |reason: String| ProtocolError::InvalidTurn {
        turn: turn.to_vec(),
        reason,
    };

    if turn.is_empty() && !all_done {
        return Err(invalid("empty while agents are still playing".into()));
    }
    for (i, agent) in turn.iter().enumerate() {
        if agent.index() >= num_agents {
            return Err(invalid(format!(
                "agent {agent} out of range for {num_agents} agents"
            )));
        }
        if turn[..i].contains(agent) {
            return Err(invalid(format!("agent {agent} listed twice")));
        }
    }
    Ok(())
}
