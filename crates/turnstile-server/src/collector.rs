//! Per-round bookkeeping of which agents still owe an action.
//!
//! [`ActionCollector`] is keyed by the environment's `agent_turn` at the
//! start of a round. The insertion order of the keys is load-bearing: it
//! is the order in which collected actions are handed to
//! [`Environment::step`](turnstile_core::Environment::step) and the order
//! in which replies go out.

use indexmap::IndexMap;
use turnstile_core::{AgentId, AgentTurn, ProtocolError};

/// What an agent contributed to a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot<A> {
    /// A regular action.
    Action(A),
    /// A vote to interrupt the episode (a mid-episode reset request).
    Interrupt,
}

/// Collects one contribution per agent of the current round.
///
/// Invariants:
/// - a slot is filled at most once per round;
/// - [`all_collected()`](Self::all_collected) holds iff every slot is filled;
/// - [`is_interrupted()`](Self::is_interrupted) holds iff some slot of the
///   round holds [`Slot::Interrupt`].
#[derive(Debug)]
pub struct ActionCollector<A> {
    slots: IndexMap<AgentId, Option<Slot<A>>>,
    collected: usize,
    interrupted: bool,
}

impl<A> ActionCollector<A> {
    /// An empty round with no agents.
    pub fn new() -> Self {
        Self {
            slots: IndexMap::new(),
            collected: 0,
            interrupted: false,
        }
    }

    /// Discard the current round and open a new one keyed by `agents`,
    /// in the given order.
    pub fn reset<I: IntoIterator<Item = AgentId>>(&mut self, agents: I) {
        self.slots.clear();
        self.slots.extend(agents.into_iter().map(|a| (a, None)));
        self.collected = 0;
        self.interrupted = false;
    }

    /// Register an agent's contribution.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NotAgentsTurn`] if `agent` is not part of the round,
    /// [`ProtocolError::DuplicateAction`] if it already contributed.
    pub fn collect(&mut self, agent: AgentId, slot: Slot<A>) -> Result<(), ProtocolError> {
        let entry = self
            .slots
            .get_mut(&agent)
            .ok_or(ProtocolError::NotAgentsTurn { agent })?;
        if entry.is_some() {
            return Err(ProtocolError::DuplicateAction { agent });
        }
        if matches!(slot, Slot::Interrupt) {
            self.interrupted = true;
        }
        *entry = Some(slot);
        self.collected += 1;
        Ok(())
    }

    /// Whether every agent of the round has contributed.
    pub fn all_collected(&self) -> bool {
        self.collected == self.slots.len()
    }

    /// Whether any contribution of this round was an interrupt vote.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// The agents of the round, in round order.
    pub fn agent_turn(&self) -> AgentTurn {
        self.slots.keys().copied().collect()
    }

    /// Whether `agent` is part of the round.
    pub fn contains(&self, agent: AgentId) -> bool {
        self.slots.contains_key(&agent)
    }

    /// Number of agents in the round.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the round has no agents.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of filled slots.
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// A view of the round's contributions, in round order.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::RoundIncomplete`] unless every slot is filled.
    pub fn get_actions(&self) -> Result<IndexMap<AgentId, &Slot<A>>, ProtocolError> {
        if !self.all_collected() {
            return Err(ProtocolError::RoundIncomplete);
        }
        Ok(self
            .slots
            .iter()
            .filter_map(|(agent, slot)| slot.as_ref().map(|s| (*agent, s)))
            .collect())
    }

    /// Move the round's contributions out, in round order.
    ///
    /// The collector is left with the same agents and every slot empty, so
    /// a round whose transition fails can be collected again.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::RoundIncomplete`] unless every slot is filled.
    pub fn take_actions(&mut self) -> Result<IndexMap<AgentId, Slot<A>>, ProtocolError> {
        if !self.all_collected() {
            return Err(ProtocolError::RoundIncomplete);
        }
        let taken = self
            .slots
            .iter_mut()
            .filter_map(|(agent, slot)| slot.take().map(|s| (*agent, s)))
            .collect();
        self.collected = 0;
        self.interrupted = false;
        Ok(taken)
    }
}

impl<A> Default for ActionCollector<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ids(raw: &[u32]) -> Vec<AgentId> {
        raw.iter().copied().map(AgentId).collect()
    }

    #[test]
    fn new_round_is_trivially_complete() {
        let c: ActionCollector<u8> = ActionCollector::new();
        assert!(c.is_empty());
        assert!(c.all_collected());
        assert!(!c.is_interrupted());
    }

    #[test]
    fn collects_in_turn_order() {
        let mut c = ActionCollector::new();
        c.reset(ids(&[2, 0]));
        c.collect(AgentId(0), Slot::Action('a')).unwrap();
        assert!(!c.all_collected());
        assert_eq!(c.get_actions(), Err(ProtocolError::RoundIncomplete));
        c.collect(AgentId(2), Slot::Action('b')).unwrap();
        assert!(c.all_collected());

        let actions = c.get_actions().unwrap();
        let order: Vec<_> = actions.iter().map(|(a, s)| (*a, (*s).clone())).collect();
        assert_eq!(
            order,
            vec![
                (AgentId(2), Slot::Action('b')),
                (AgentId(0), Slot::Action('a')),
            ]
        );
    }

    #[test]
    fn rejects_outsiders_and_duplicates() {
        let mut c = ActionCollector::new();
        c.reset(ids(&[0]));
        assert_eq!(
            c.collect(AgentId(1), Slot::Action(1)),
            Err(ProtocolError::NotAgentsTurn { agent: AgentId(1) })
        );
        c.collect(AgentId(0), Slot::Action(1)).unwrap();
        assert_eq!(
            c.collect(AgentId(0), Slot::Interrupt),
            Err(ProtocolError::DuplicateAction { agent: AgentId(0) })
        );
        assert!(!c.is_interrupted());
        assert_eq!(c.collected(), 1);
    }

    #[test]
    fn interrupt_vote_marks_round() {
        let mut c: ActionCollector<u8> = ActionCollector::new();
        c.reset(ids(&[0, 1]));
        c.collect(AgentId(1), Slot::Interrupt).unwrap();
        assert!(c.is_interrupted());
        c.reset(ids(&[0, 1]));
        assert!(!c.is_interrupted());
    }

    #[test]
    fn take_reopens_the_same_round() {
        let mut c = ActionCollector::new();
        c.reset(ids(&[1, 0]));
        c.collect(AgentId(1), Slot::Action(10)).unwrap();
        c.collect(AgentId(0), Slot::Interrupt).unwrap();

        let taken = c.take_actions().unwrap();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken.get_index(0), Some((&AgentId(1), &Slot::Action(10))));
        assert_eq!(taken.get_index(1), Some((&AgentId(0), &Slot::Interrupt)));

        assert_eq!(c.agent_turn().as_slice(), &[AgentId(1), AgentId(0)]);
        assert_eq!(c.collected(), 0);
        assert!(!c.is_interrupted());
        assert!(c.contains(AgentId(0)));
        assert_eq!(c.take_actions(), Err(ProtocolError::RoundIncomplete));
    }

    proptest! {
        /// Round completeness: the collector completes exactly when every
        /// key has been filled once, whatever the order of attempts.
        #[test]
        fn completes_iff_every_key_filled_once(
            n in 1u32..6,
            attempts in proptest::collection::vec((0u32..8, any::<bool>()), 0..24),
        ) {
            let keys: Vec<AgentId> = (0..n).map(AgentId).collect();
            let mut c = ActionCollector::new();
            c.reset(keys.iter().copied());

            let mut filled = BTreeSet::new();
            let mut interrupted = false;
            for (raw, interrupt) in attempts {
                let agent = AgentId(raw);
                let slot = if interrupt { Slot::Interrupt } else { Slot::Action(raw) };
                let res = c.collect(agent, slot);
                let expect_ok = raw < n && !filled.contains(&raw);
                prop_assert_eq!(res.is_ok(), expect_ok);
                if expect_ok {
                    filled.insert(raw);
                    interrupted |= interrupt;
                }
                prop_assert_eq!(c.all_collected(), filled.len() == n as usize);
                prop_assert_eq!(c.is_interrupted(), interrupted);
                prop_assert_eq!(c.collected(), filled.len());
            }

            if c.all_collected() {
                let order: Vec<AgentId> = c.take_actions().unwrap().keys().copied().collect();
                prop_assert_eq!(order, keys);
            } else {
                prop_assert!(c.take_actions().is_err());
            }
        }
    }
}
