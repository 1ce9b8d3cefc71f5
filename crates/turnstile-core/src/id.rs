//! Strongly-typed agent identifiers and the [`AgentTurn`] type alias.

use smallvec::SmallVec;
use std::fmt;

/// Identifies an agent within a multi-agent environment.
///
/// Agent IDs are dense and 0-based: an environment with `n` agents uses
/// exactly `AgentId(0)..AgentId(n)`. `AgentId(k)` addresses the k-th
/// entry of every per-agent sequence the environment returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Position of this agent in per-agent sequences.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over all agent IDs of an environment with `num_agents` agents.
    pub fn all(num_agents: usize) -> impl Iterator<Item = AgentId> {
        (0..num_agents as u32).map(AgentId)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Ordered set of agents whose action is awaited next.
///
/// Strictly alternating games hold a single ID; simultaneous-move games
/// hold several. Inline capacity of 4 covers the common cases without
/// heap allocation.
pub type AgentTurn = SmallVec<[AgentId; 4]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_inner_value() {
        assert_eq!(AgentId(0).index(), 0);
        assert_eq!(AgentId(7).index(), 7);
    }

    #[test]
    fn all_is_dense_and_ordered() {
        let ids: Vec<AgentId> = AgentId::all(3).collect();
        assert_eq!(ids, vec![AgentId(0), AgentId(1), AgentId(2)]);
        assert_eq!(AgentId::all(0).count(), 0);
    }

    #[test]
    fn display_is_bare_number() {
        assert_eq!(AgentId(12).to_string(), "12");
    }
}
