//! Supervisor recruit/retire gate chain, generalized from
//! `agent_team.rs`'s `SpawnPolicy::evaluate` ordered-gate chain: that code
//! walked justification -> max-agents -> max-concurrent -> role spawn-edge ->
//! required-skills for a role-typed multi-template mission system. A
//! Supervisor workflow only needs team-size and round bounds plus idempotent
//! recruit/retire, so the role/skill/edge machinery is dropped and the gate
//! order is kept.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnDenyCode {
    MaxTeamSizeExceeded,
    MaxRoundsExceeded,
    AlreadyRecruited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnDecision {
    pub allowed: bool,
    pub code: Option<SpawnDenyCode>,
    pub reason: Option<String>,
}

impl SpawnDecision {
    fn allow() -> Self {
        Self { allowed: true, code: None, reason: None }
    }

    fn deny(code: SpawnDenyCode, reason: impl Into<String>) -> Self {
        Self { allowed: false, code: Some(code), reason: Some(reason.into()) }
    }
}

/// Recruit/retire requests are idempotent keyed on this hash rather than a
/// caller-supplied id, so a duplicated supervisor tool call (e.g. retried
/// after a transient provider error) cannot double-spawn.
pub fn agent_description_hash(role: &str, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role.as_bytes());
    hasher.update(b"\0");
    hasher.update(description.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Bounds and recruited-agent bookkeeping for a single Supervisor run:
/// max team size M (default 8), max rounds R (default 3).
pub struct TeamRoster {
    max_team_size: usize,
    max_rounds: u32,
    recruited: HashSet<String>,
    retired: HashSet<String>,
    rounds: AtomicU64,
}

impl TeamRoster {
    pub fn new(max_team_size: usize, max_rounds: u32) -> Self {
        Self {
            max_team_size,
            max_rounds,
            recruited: HashSet::new(),
            retired: HashSet::new(),
            rounds: AtomicU64::new(0),
        }
    }

    pub fn default_bounds() -> Self {
        Self::new(8, 3)
    }

    pub fn advance_round(&self) -> Result<u32, SpawnDenyCode> {
        let next = self.rounds.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        if next > self.max_rounds {
            return Err(SpawnDenyCode::MaxRoundsExceeded);
        }
        Ok(next)
    }

    /// Evaluates a recruit request: already-recruited is idempotent success
    /// reported as a denial with `AlreadyRecruited` so the caller can treat it
    /// as a no-op rather than an error.
    pub fn evaluate_recruit(&self, agent_key: &str) -> SpawnDecision {
        if self.recruited.contains(agent_key) {
            return SpawnDecision::deny(SpawnDenyCode::AlreadyRecruited, "agent already recruited");
        }
        let active = self.recruited.difference(&self.retired).count();
        if active >= self.max_team_size {
            return SpawnDecision::deny(
                SpawnDenyCode::MaxTeamSizeExceeded,
                format!("team size at cap ({active}/{})", self.max_team_size),
            );
        }
        SpawnDecision::allow()
    }

    pub fn record_recruit(&mut self, agent_key: String) {
        self.recruited.insert(agent_key);
    }

    /// Retiring an agent that was never recruited, or one already retired, is
    /// a no-op success (idempotent by `agent_id`).
    pub fn record_retire(&mut self, agent_id: &str) {
        self.retired.insert(agent_id.to_string());
    }

    pub fn active_count(&self) -> usize {
        self.recruited.difference(&self.retired).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_recruit_request_is_idempotent() {
        let mut roster = TeamRoster::default_bounds();
        let key = agent_description_hash("worker", "fetch changelog");
        assert!(roster.evaluate_recruit(&key).allowed);
        roster.record_recruit(key.clone());
        let second = roster.evaluate_recruit(&key);
        assert!(!second.allowed);
        assert_eq!(second.code, Some(SpawnDenyCode::AlreadyRecruited));
    }

    #[test]
    fn team_size_cap_is_enforced() {
        let mut roster = TeamRoster::new(1, 3);
        let a = agent_description_hash("worker", "a");
        let b = agent_description_hash("worker", "b");
        assert!(roster.evaluate_recruit(&a).allowed);
        roster.record_recruit(a);
        let decision = roster.evaluate_recruit(&b);
        assert_eq!(decision.code, Some(SpawnDenyCode::MaxTeamSizeExceeded));
    }

    #[test]
    fn retiring_frees_a_team_slot() {
        let mut roster = TeamRoster::new(1, 3);
        let a = agent_description_hash("worker", "a");
        roster.record_recruit(a.clone());
        roster.record_retire(&a);
        assert_eq!(roster.active_count(), 0);
        let b = agent_description_hash("worker", "b");
        assert!(roster.evaluate_recruit(&b).allowed);
    }

    #[test]
    fn rounds_are_bounded() {
        let roster = TeamRoster::new(8, 2);
        assert_eq!(roster.advance_round(), Ok(1));
        assert_eq!(roster.advance_round(), Ok(2));
        assert_eq!(roster.advance_round(), Err(SpawnDenyCode::MaxRoundsExceeded));
    }
}
