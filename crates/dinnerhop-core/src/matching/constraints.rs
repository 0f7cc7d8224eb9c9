//! Ranked pairing constraints.
//!
//! The ladder below is data, not control flow: [`crate::matching::PairingEngine`]
//! tries each step in order for every guest and takes the first step that
//! admits at least one host. Later steps only loosen, never tighten, so a
//! guest is always placed by the last step if the course has any host.
//!
//! | step             | capacity  | unique meeting | blocked pairs |
//! |------------------|-----------|----------------|---------------|
//! | `strict`         | base      | required       | never         |
//! | `repeat_meeting` | base      | relaxed        | never         |
//! | `flex`           | flex      | relaxed        | never         |
//! | `emergency`      | emergency | relaxed        | never         |
//! | `overflow`       | unbounded | relaxed        | never         |
//! | `forced`         | unbounded | relaxed        | allowed       |

use crate::model::{Assignment, CoupleId};

use super::MatchingConfig;

/// How far a host's seating limit may stretch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CapacityTier {
    Base,
    Flex,
    Emergency,
    Unbounded,
}

/// One rung of the relaxation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaxationStep {
    pub label: &'static str,
    pub capacity: CapacityTier,
    pub require_unique_meeting: bool,
    pub allow_blocked: bool,
}

pub const RELAXATION_LADDER: [RelaxationStep; 6] = [
    RelaxationStep {
        label: "strict",
        capacity: CapacityTier::Base,
        require_unique_meeting: true,
        allow_blocked: false,
    },
    RelaxationStep {
        label: "repeat_meeting",
        capacity: CapacityTier::Base,
        require_unique_meeting: false,
        allow_blocked: false,
    },
    RelaxationStep {
        label: "flex",
        capacity: CapacityTier::Flex,
        require_unique_meeting: false,
        allow_blocked: false,
    },
    RelaxationStep {
        label: "emergency",
        capacity: CapacityTier::Emergency,
        require_unique_meeting: false,
        allow_blocked: false,
    },
    RelaxationStep {
        label: "overflow",
        capacity: CapacityTier::Unbounded,
        require_unique_meeting: false,
        allow_blocked: false,
    },
    RelaxationStep {
        label: "forced",
        capacity: CapacityTier::Unbounded,
        require_unique_meeting: false,
        allow_blocked: true,
    },
];

/// Seating state of one host for the course being paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLoad {
    pub couple_id: CoupleId,
    pub max_guests: u32,
    pub flex_host: bool,
    pub emergency_host: bool,
    /// Guest persons seated so far
    pub seated: u32,
}

impl HostLoad {
    pub fn from_assignment(assignment: &Assignment) -> Self {
        Self {
            couple_id: assignment.couple_id,
            max_guests: assignment.max_guests,
            flex_host: assignment.flex_host,
            emergency_host: assignment.emergency_host,
            seated: 0,
        }
    }

    /// Seating limit at `tier`, `None` when unbounded.
    pub fn limit(&self, tier: CapacityTier, config: &MatchingConfig) -> Option<u32> {
        let flex = if self.flex_host { config.flex_extra_guests } else { 0 };
        let emergency = if self.emergency_host {
            config.emergency_extra_guests
        } else {
            0
        };
        match tier {
            CapacityTier::Base => Some(self.max_guests),
            CapacityTier::Flex => Some(self.max_guests + flex),
            CapacityTier::Emergency => Some(self.max_guests + flex + emergency),
            CapacityTier::Unbounded => None,
        }
    }

    pub fn fits(&self, persons: u32, tier: CapacityTier, config: &MatchingConfig) -> bool {
        self.limit(tier, config)
            .map_or(true, |limit| self.seated + persons <= limit)
    }

    /// Base seats still free; negative once squeezed.
    pub fn base_remaining(&self) -> i64 {
        i64::from(self.max_guests) - i64::from(self.seated)
    }

    pub fn over_base(&self) -> bool {
        self.seated > self.max_guests
    }
}

/// A host as seen by one guest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub host: CoupleId,
    /// Guest already visited this host in an earlier course
    pub repeat_meeting: bool,
    pub blocked: bool,
    pub base_remaining: i64,
    /// Lower is better: distance plus co-attendance penalty
    pub score: f64,
}

impl RelaxationStep {
    pub fn admits(&self, candidate: &Candidate, load: &HostLoad, persons: u32, config: &MatchingConfig) -> bool {
        if candidate.blocked && !self.allow_blocked {
            return false;
        }
        if candidate.repeat_meeting && self.require_unique_meeting {
            return false;
        }
        load.fits(persons, self.capacity, config)
    }
}

/// Best candidate among those a step admitted.
///
/// Order: unique meeting, not blocked, most base seats left, lowest score,
/// lowest host id.
pub fn best_candidate(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().min_by(|a, b| {
        a.repeat_meeting
            .cmp(&b.repeat_meeting)
            .then(a.blocked.cmp(&b.blocked))
            .then(b.base_remaining.cmp(&a.base_remaining))
            .then(a.score.total_cmp(&b.score))
            .then(a.host.cmp(&b.host))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(max_guests: u32, flex: bool, emergency: bool, seated: u32) -> HostLoad {
        HostLoad {
            couple_id: 1,
            max_guests,
            flex_host: flex,
            emergency_host: emergency,
            seated,
        }
    }

    fn candidate(host: CoupleId) -> Candidate {
        Candidate {
            host,
            repeat_meeting: false,
            blocked: false,
            base_remaining: 2,
            score: 0.0,
        }
    }

    #[test]
    fn ladder_only_loosens() {
        for pair in RELAXATION_LADDER.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(a.capacity <= b.capacity);
            assert!(a.require_unique_meeting || !b.require_unique_meeting);
            assert!(!a.allow_blocked || b.allow_blocked);
        }
        let last = RELAXATION_LADDER[RELAXATION_LADDER.len() - 1];
        assert!(last.allow_blocked && last.capacity == CapacityTier::Unbounded);
    }

    #[test]
    fn repeat_meeting_is_relaxed_before_capacity() {
        let first_relaxed_unique = RELAXATION_LADDER
            .iter()
            .position(|s| !s.require_unique_meeting)
            .unwrap();
        let first_beyond_base = RELAXATION_LADDER
            .iter()
            .position(|s| s.capacity > CapacityTier::Base)
            .unwrap();
        assert!(first_relaxed_unique < first_beyond_base);
    }

    #[test]
    fn limits_stack_per_tier() {
        let config = MatchingConfig::default();
        let host = load(4, true, true, 0);
        assert_eq!(host.limit(CapacityTier::Base, &config), Some(4));
        assert_eq!(host.limit(CapacityTier::Flex, &config), Some(6));
        assert_eq!(host.limit(CapacityTier::Emergency, &config), Some(8));
        assert_eq!(host.limit(CapacityTier::Unbounded, &config), None);

        let plain = load(4, false, false, 0);
        assert_eq!(plain.limit(CapacityTier::Emergency, &config), Some(4));
    }

    #[test]
    fn promoted_host_only_fits_at_emergency() {
        let config = MatchingConfig::default();
        let host = load(0, false, true, 0);
        assert!(!host.fits(2, CapacityTier::Flex, &config));
        assert!(host.fits(2, CapacityTier::Emergency, &config));
    }

    #[test]
    fn strict_step_rejects_repeat_and_blocked() {
        let config = MatchingConfig::default();
        let host = load(4, false, false, 0);
        let strict = RELAXATION_LADDER[0];
        let mut c = candidate(1);
        assert!(strict.admits(&c, &host, 2, &config));
        c.repeat_meeting = true;
        assert!(!strict.admits(&c, &host, 2, &config));
        assert!(RELAXATION_LADDER[1].admits(&c, &host, 2, &config));
        c.blocked = true;
        assert!(!RELAXATION_LADDER[4].admits(&c, &host, 2, &config));
        assert!(RELAXATION_LADDER[5].admits(&c, &host, 2, &config));
    }

    #[test]
    fn ranking_prefers_capacity_then_score() {
        let mut roomy = candidate(3);
        roomy.base_remaining = 4;
        roomy.score = 9.0;
        let mut near = candidate(2);
        near.score = 0.5;
        let mut nearer = candidate(5);
        nearer.score = 0.1;

        assert_eq!(best_candidate(&[near, roomy]).unwrap().host, 3);
        assert_eq!(best_candidate(&[near, nearer]).unwrap().host, 5);
        assert!(best_candidate(&[]).is_none());
    }
}
