//! Envelopes: per-guest, per-course destination info with a reveal schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::couple::CoupleId;
use super::course::Course;
use super::plan::PlanId;

/// Unique identifier for an envelope.
pub type EnvelopeId = i64;

/// How much of an envelope a guest can see right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeState {
    Sealed,
    Teasing,
    Clue1,
    Clue2,
    Street,
    Number,
    Open,
}

impl EnvelopeState {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeState::Sealed => "sealed",
            EnvelopeState::Teasing => "teasing",
            EnvelopeState::Clue1 => "clue_1",
            EnvelopeState::Clue2 => "clue_2",
            EnvelopeState::Street => "street",
            EnvelopeState::Number => "number",
            EnvelopeState::Open => "open",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sealed" => Some(EnvelopeState::Sealed),
            "teasing" => Some(EnvelopeState::Teasing),
            "clue_1" => Some(EnvelopeState::Clue1),
            "clue_2" => Some(EnvelopeState::Clue2),
            "street" => Some(EnvelopeState::Street),
            "number" => Some(EnvelopeState::Number),
            "open" => Some(EnvelopeState::Open),
            _ => None,
        }
    }
}

/// Reveal timestamps of one envelope, ordered earliest to latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealSchedule {
    pub teasing_at: DateTime<Utc>,
    pub clue_1_at: DateTime<Utc>,
    pub clue_2_at: DateTime<Utc>,
    pub street_at: DateTime<Utc>,
    pub number_at: DateTime<Utc>,
    pub opened_at: DateTime<Utc>,
}

impl RevealSchedule {
    /// Stages in reveal order.
    pub fn stages(&self) -> [(EnvelopeState, DateTime<Utc>); 6] {
        [
            (EnvelopeState::Teasing, self.teasing_at),
            (EnvelopeState::Clue1, self.clue_1_at),
            (EnvelopeState::Clue2, self.clue_2_at),
            (EnvelopeState::Street, self.street_at),
            (EnvelopeState::Number, self.number_at),
            (EnvelopeState::Open, self.opened_at),
        ]
    }

    /// Latest stage whose timestamp has passed at `now`.
    pub fn state_at(&self, now: DateTime<Utc>) -> EnvelopeState {
        self.stages()
            .iter()
            .rev()
            .find(|(_, at)| *at <= now)
            .map(|(state, _)| *state)
            .unwrap_or(EnvelopeState::Sealed)
    }

    pub fn is_ordered(&self) -> bool {
        self.stages().windows(2).all(|w| w[0].1 <= w[1].1)
    }
}

/// Destination record for one guest couple and one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub plan_id: PlanId,
    pub couple_id: CoupleId,
    pub course: Course,
    /// `None` for the afterparty; equal to `couple_id` when self-hosted
    pub host_couple_id: Option<CoupleId>,
    pub destination_address: String,
    pub destination_notes: Option<String>,
    pub cycling_distance_km: Option<f64>,
    pub schedule: RevealSchedule,
    pub current_state: EnvelopeState,
    /// Opaque token for guest-facing links
    pub access_token: String,
    pub cancelled: bool,
}

impl Envelope {
    pub fn is_self_hosted(&self) -> bool {
        self.host_couple_id == Some(self.couple_id)
    }
}

/// Envelope data before it has been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEnvelope {
    pub couple_id: CoupleId,
    pub course: Course,
    pub host_couple_id: Option<CoupleId>,
    pub destination_address: String,
    pub destination_notes: Option<String>,
    pub cycling_distance_km: Option<f64>,
    pub schedule: RevealSchedule,
    pub current_state: EnvelopeState,
}
