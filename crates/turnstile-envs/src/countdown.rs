//! A simultaneous-move counting game.
//!
//! Every agent acts in every round. Each agent observes how many rounds
//! remain and calls out a number; calling out the remaining count scores
//! 1. All agents are done after `length` rounds.

use turnstile_core::{AgentId, AgentTurn, EnvError, Environment, StepOutcome};

/// Simultaneous-move environment with a fixed episode length.
#[derive(Clone, Debug)]
pub struct Countdown {
    num_agents: usize,
    length: u32,
    remaining: u32,
}

impl Countdown {
    /// `num_agents` agents, episodes of `length` rounds.
    pub fn new(num_agents: usize, length: u32) -> Self {
        Self {
            num_agents,
            length,
            remaining: length,
        }
    }

    /// Rounds left in the current episode.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Environment for Countdown {
    type Observation = u32;
    type Action = u32;
    /// Rounds played so far in the episode.
    type Info = u32;

    fn num_agents(&self) -> usize {
        self.num_agents
    }

    fn agent_turn(&self) -> AgentTurn {
        if self.remaining == 0 {
            AgentTurn::new()
        } else {
            AgentId::all(self.num_agents).collect()
        }
    }

    fn reset(&mut self) -> Result<Vec<u32>, EnvError> {
        self.remaining = self.length;
        Ok(vec![self.remaining; self.num_agents])
    }

    fn step(&mut self, actions: Vec<u32>) -> Result<StepOutcome<u32, u32>, EnvError> {
        if self.remaining == 0 {
            return Err(EnvError::IllegalAction {
                reason: "the episode is over".into(),
            });
        }
        if actions.len() != self.num_agents {
            return Err(EnvError::ShapeMismatch {
                what: "actions",
                got: actions.len(),
                expected: self.num_agents,
            });
        }
        let rewards = actions
            .iter()
            .map(|&a| if a == self.remaining { 1.0 } else { 0.0 })
            .collect();
        self.remaining -= 1;
        let played = self.length - self.remaining;
        Ok(StepOutcome {
            observations: vec![self.remaining; self.num_agents],
            rewards,
            dones: vec![self.remaining == 0; self.num_agents],
            infos: vec![played; self.num_agents],
        })
    }
}
