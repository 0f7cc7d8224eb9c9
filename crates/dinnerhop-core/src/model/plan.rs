//! Roles, match plans, pairings, and matching diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::couple::{CoupleId, EventId};
use super::course::Course;

/// Unique identifier for a match plan.
pub type PlanId = i64;

/// Unique identifier for a course pairing.
pub type PairingId = i64;

/// Role of a couple for one course.
///
/// Every active couple has one assignment per hosted course: host for one
/// of them, guest for the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub event_id: EventId,
    pub couple_id: CoupleId,
    pub course: Course,
    pub is_host: bool,
    /// Guest persons the host can seat without squeezing
    pub max_guests: u32,
    pub flex_host: bool,
    pub emergency_host: bool,
    /// Hosts only its own envelope; never receives guests
    #[serde(default)]
    pub self_serving: bool,
}

impl Assignment {
    pub fn guest(event_id: EventId, couple_id: CoupleId, course: Course) -> Self {
        Self {
            event_id,
            couple_id,
            course,
            is_host: false,
            max_guests: 0,
            flex_host: false,
            emergency_host: false,
            self_serving: false,
        }
    }

    pub fn host(event_id: EventId, couple_id: CoupleId, course: Course, max_guests: u32) -> Self {
        Self {
            event_id,
            couple_id,
            course,
            is_host: true,
            max_guests,
            flex_host: false,
            emergency_host: false,
            self_serving: false,
        }
    }

    /// Host role for a couple that serves the course to itself.
    pub fn self_host(event_id: EventId, couple_id: CoupleId, course: Course) -> Self {
        Self {
            self_serving: true,
            ..Self::host(event_id, couple_id, course, 0)
        }
    }

    /// Whether matching may seat guests with this host.
    pub fn seats_guests(&self) -> bool {
        self.is_host && !self.self_serving
    }
}

/// Lifecycle of a match plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Superseded,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Active => "active",
            PlanStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PlanStatus::Draft),
            "active" => Some(PlanStatus::Active),
            "superseded" => Some(PlanStatus::Superseded),
            _ => None,
        }
    }
}

/// One complete matching result for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPlan {
    pub id: PlanId,
    pub event_id: EventId,
    pub version: u32,
    pub status: PlanStatus,
    /// Bumped by every cascade mutation; used for optimistic checks
    pub revision: i64,
    pub stats: MatchStats,
    pub created_at: DateTime<Utc>,
}

/// A guest couple seated at a host couple's table for one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoursePairing {
    pub id: PairingId,
    pub plan_id: PlanId,
    pub course: Course,
    pub host_couple_id: CoupleId,
    pub guest_couple_id: CoupleId,
    /// Pairing violates a blocked pair and was kept for human review
    pub forced: bool,
}

/// Pairing data before it has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPairing {
    pub course: Course,
    pub host_couple_id: CoupleId,
    pub guest_couple_id: CoupleId,
    pub forced: bool,
}

/// Category of a relaxed constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A host seats more guest persons than its `max_guests`
    Capacity,
    /// A couple does not host the course it asked for
    Preference,
    /// A blocked pair was forced together
    Block,
    /// A guest visits a host it has already visited
    UniqueMeeting,
    /// A guest could not be seated at all
    Unplaced,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningKind::Capacity => "capacity",
            WarningKind::Preference => "preference",
            WarningKind::Block => "block",
            WarningKind::UniqueMeeting => "unique_meeting",
            WarningKind::Unplaced => "unplaced",
        };
        f.write_str(s)
    }
}

/// A non-fatal constraint relaxation recorded during matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchWarning {
    pub kind: WarningKind,
    pub course: Option<Course>,
    pub couple_ids: Vec<CoupleId>,
    pub message: String,
}

impl MatchWarning {
    pub fn new(
        kind: WarningKind,
        course: Option<Course>,
        couple_ids: Vec<CoupleId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            course,
            couple_ids,
            message: message.into(),
        }
    }

    /// Whether this warning names both couples.
    pub fn concerns(&self, a: CoupleId, b: CoupleId) -> bool {
        self.couple_ids.contains(&a) && self.couple_ids.contains(&b)
    }
}

/// Aggregate numbers of a matching run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub couples: usize,
    pub hosts_per_course: BTreeMap<Course, usize>,
    pub pairings: usize,
    pub forced_pairings: usize,
    pub envelopes: usize,
    /// Fraction of couples with a preference that host their preferred course
    pub preference_satisfaction: f64,
    pub warnings: Vec<MatchWarning>,
}

impl MatchStats {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &MatchWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}
