//! Single-agent adapter.
//!
//! The server only understands the sequence-based [`Environment`] contract.
//! [`SingleAgent`] lifts a scalar [`SingleAgentEnvironment`] into it by
//! wrapping values into length-1 sequences on the way in and unwrapping
//! them on the way out, so the core never branches on agent count.

use smallvec::smallvec;

use crate::env::{Environment, StepOutcome};
use crate::error::EnvError;
use crate::id::{AgentId, AgentTurn};

/// A classic single-agent environment with scalar results.
pub trait SingleAgentEnvironment: Send + 'static {
    /// What the agent observes.
    type Observation: Clone + Send + 'static;
    /// What the agent submits.
    type Action: Send + 'static;
    /// Auxiliary data returned by `step()`.
    type Info: Clone + Send + 'static;

    /// Start a new episode.
    fn reset(&mut self) -> Result<Self::Observation, EnvError>;

    /// Apply one action and return `(observation, reward, done, info)`.
    fn step(
        &mut self,
        action: Self::Action,
    ) -> Result<(Self::Observation, f64, bool, Self::Info), EnvError>;
}

/// Presents a [`SingleAgentEnvironment`] as a one-agent [`Environment`].
#[derive(Debug)]
pub struct SingleAgent<S> {
    inner: S,
}

impl<S> SingleAgent<S> {
    /// Wrap a single-agent environment.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The wrapped environment.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwrap.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: SingleAgentEnvironment> Environment for SingleAgent<S> {
    type Observation = S::Observation;
    type Action = S::Action;
    type Info = S::Info;

    fn num_agents(&self) -> usize {
        1
    }

    fn agent_turn(&self) -> AgentTurn {
        smallvec![AgentId(0)]
    }

    fn reset(&mut self) -> Result<Vec<Self::Observation>, EnvError> {
        Ok(vec![self.inner.reset()?])
    }

    fn step(
        &mut self,
        actions: Vec<Self::Action>,
    ) -> Result<StepOutcome<Self::Observation, Self::Info>, EnvError> {
        let [action]: [S::Action; 1] =
            actions
                .try_into()
                .map_err(|rest: Vec<S::Action>| EnvError::ShapeMismatch {
                    what: "actions",
                    got: rest.len(),
                    expected: 1,
                })?;
        let (observation, reward, done, info) = self.inner.step(action)?;
        Ok(StepOutcome {
            observations: vec![observation],
            rewards: vec![reward],
            dones: vec![done],
            infos: vec![info],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts up by the submitted action; done at 10.
    struct Counter {
        total: u32,
    }

    impl SingleAgentEnvironment for Counter {
        type Observation = u32;
        type Action = u32;
        type Info = ();

        fn reset(&mut self) -> Result<u32, EnvError> {
            self.total = 0;
            Ok(0)
        }

        fn step(&mut self, action: u32) -> Result<(u32, f64, bool, ()), EnvError> {
            self.total += action;
            Ok((self.total, action as f64, self.total >= 10, ()))
        }
    }

    #[test]
    fn sequences_have_length_one() {
        let mut env = SingleAgent::new(Counter { total: 0 });
        assert_eq!(env.num_agents(), 1);
        assert_eq!(env.agent_turn().as_slice(), &[AgentId(0)]);
        assert_eq!(env.reset().unwrap(), vec![0]);

        let out = env.step(vec![4]).unwrap();
        assert_eq!(out.observations, vec![4]);
        assert_eq!(out.rewards, vec![4.0]);
        assert_eq!(out.dones, vec![false]);
        assert!(out.check_shape(1).is_ok());

        let out = env.step(vec![6]).unwrap();
        assert_eq!(out.dones, vec![true]);
        assert_eq!(env.inner().total, 10);
    }

    #[test]
    fn wrong_action_count_is_rejected_without_stepping() {
        let mut env = SingleAgent::new(Counter { total: 0 });
        let err = env.step(vec![1, 2]).unwrap_err();
        assert_eq!(
            err,
            EnvError::ShapeMismatch {
                what: "actions",
                got: 2,
                expected: 1,
            }
        );
        assert_eq!(env.into_inner().total, 0);
    }
}
