//! Two-step matching.
//!
//! Step A ([`RoleAssignmentEngine`]) decides which course every couple
//! hosts. Step B ([`PairingEngine`]) seats every guest couple at a host,
//! course by course, walking the [`constraints::RELAXATION_LADDER`] when
//! the strict constraints cannot all be met. [`MatchRunner`] wraps both
//! steps with validation, envelope drafting and the plan commit.

pub mod constraints;
pub mod pairing;
pub mod roles;
pub mod runner;

use serde::{Deserialize, Serialize};

pub use constraints::{CapacityTier, HostLoad, RelaxationStep, RELAXATION_LADDER};
pub use pairing::{PairingEngine, PairingInput, PairingOutcome};
pub use roles::{RoleAssignment, RoleAssignmentEngine};
pub use runner::{refresh_envelope_states, MatchDraft, MatchReport, MatchRequest, MatchRunner};

/// Matching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Fewest active couples an event needs before matching runs
    #[serde(default = "default_min_couples")]
    pub min_couples: usize,
    /// Guest persons a host seats when the couple gave no capacity
    #[serde(default = "default_max_guests")]
    pub default_max_guests: u32,
    /// Extra persons a flex host squeezes in
    #[serde(default = "default_extra_guests")]
    pub flex_extra_guests: u32,
    /// Extra persons an emergency host takes on top of flex
    #[serde(default = "default_extra_guests")]
    pub emergency_extra_guests: u32,
    /// Score per kilometre between guest and host
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,
    /// Score per earlier shared table with someone already seated
    #[serde(default = "default_co_attendance_weight")]
    pub co_attendance_weight: f64,
}

fn default_min_couples() -> usize {
    3
}
fn default_max_guests() -> u32 {
    4
}
fn default_extra_guests() -> u32 {
    2
}
fn default_distance_weight() -> f64 {
    1.0
}
fn default_co_attendance_weight() -> f64 {
    5.0
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_couples: default_min_couples(),
            default_max_guests: default_max_guests(),
            flex_extra_guests: default_extra_guests(),
            emergency_extra_guests: default_extra_guests(),
            distance_weight: default_distance_weight(),
            co_attendance_weight: default_co_attendance_weight(),
        }
    }
}
