//! Progressive-disclosure timing for envelopes.
//!
//! Every envelope reveals its content in stages: a teaser, two clues about
//! the hosts, the street, the house number, and finally the opened
//! envelope at course start. Offsets are configured as "minutes before
//! course start". The calculator is pure: travel legs are resolved
//! beforehand (see [`distance`]) and passed in.
//!
//! ## Distance adjustment
//!
//! When enabled and a cycling duration is known, the street and number
//! stages move earlier by `lead_per_travel_minute * duration`, capped at
//! `max_adjustment_minutes`. After adjustment the offsets are normalized:
//!
//! ```text
//! teasing >= clue_1 >= clue_2 >= street >= number >= 0   (minutes before start)
//! ```
//!
//! A stage that would overtake its predecessor collapses onto it, and no
//! stage opens more than [`MAX_OFFSET_MINUTES`] before course start.

pub mod distance;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Course, RevealSchedule};

pub use distance::{
    estimate_legs, resolve_legs, straight_line_leg, DistanceConfig, LegRequest, NoRoutes,
    RouteProvider, TravelLeg,
};

/// Upper bound for any stage offset: one week.
pub const MAX_OFFSET_MINUTES: i64 = 7 * 24 * 60;

/// Minutes before course start at which each stage is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOffsets {
    pub teasing: i64,
    pub clue_1: i64,
    pub clue_2: i64,
    pub street: i64,
    pub number: i64,
}

impl Default for StageOffsets {
    fn default() -> Self {
        Self {
            teasing: 240,
            clue_1: 180,
            clue_2: 120,
            street: 60,
            number: 20,
        }
    }
}

impl StageOffsets {
    /// Clamp into `0..=MAX_OFFSET_MINUTES` and make every stage no earlier
    /// than the one before it.
    pub fn normalized(self) -> Self {
        let teasing = self.teasing.clamp(0, MAX_OFFSET_MINUTES);
        let clue_1 = self.clue_1.max(0).min(teasing);
        let clue_2 = self.clue_2.max(0).min(clue_1);
        let street = self.street.max(0).min(clue_2);
        let number = self.number.max(0).min(street);
        Self {
            teasing,
            clue_1,
            clue_2,
            street,
            number,
        }
    }

    fn with_override(self, o: &OffsetOverride) -> Self {
        Self {
            teasing: o.teasing.unwrap_or(self.teasing),
            clue_1: o.clue_1.unwrap_or(self.clue_1),
            clue_2: o.clue_2.unwrap_or(self.clue_2),
            street: o.street.unwrap_or(self.street),
            number: o.number.unwrap_or(self.number),
        }
    }
}

/// Per-course replacement of individual offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetOverride {
    #[serde(default)]
    pub teasing: Option<i64>,
    #[serde(default)]
    pub clue_1: Option<i64>,
    #[serde(default)]
    pub clue_2: Option<i64>,
    #[serde(default)]
    pub street: Option<i64>,
    #[serde(default)]
    pub number: Option<i64>,
}

/// Per-event timing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTiming {
    #[serde(default)]
    pub offsets: StageOffsets,
    #[serde(default = "default_true")]
    pub distance_adjustment_enabled: bool,
    /// Minutes of extra lead per minute of cycling
    #[serde(default = "default_lead_per_travel_minute")]
    pub lead_per_travel_minute: f64,
    #[serde(default = "default_max_adjustment_minutes")]
    pub max_adjustment_minutes: i64,
    #[serde(default)]
    pub course_overrides: BTreeMap<Course, OffsetOverride>,
}

fn default_true() -> bool {
    true
}
fn default_lead_per_travel_minute() -> f64 {
    1.0
}
fn default_max_adjustment_minutes() -> i64 {
    45
}

impl Default for EventTiming {
    fn default() -> Self {
        Self {
            offsets: StageOffsets::default(),
            distance_adjustment_enabled: true,
            lead_per_travel_minute: default_lead_per_travel_minute(),
            max_adjustment_minutes: default_max_adjustment_minutes(),
            course_overrides: BTreeMap::new(),
        }
    }
}

/// Computes reveal schedules from course start times and travel legs.
#[derive(Debug, Clone)]
pub struct EnvelopeTimingCalculator {
    timing: EventTiming,
}

impl EnvelopeTimingCalculator {
    pub fn new(timing: EventTiming) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> &EventTiming {
        &self.timing
    }

    /// Effective offsets for a course, given an optional cycling duration.
    pub fn offsets_for(&self, course: Course, travel_minutes: Option<f64>) -> StageOffsets {
        let mut offsets = match self.timing.course_overrides.get(&course) {
            Some(o) => self.timing.offsets.with_override(o),
            None => self.timing.offsets,
        };

        if self.timing.distance_adjustment_enabled {
            if let Some(minutes) = travel_minutes.filter(|m| m.is_finite() && *m > 0.0) {
                let lead = (minutes * self.timing.lead_per_travel_minute.max(0.0)).round() as i64;
                let lead = lead.clamp(0, self.timing.max_adjustment_minutes.max(0));
                offsets.street = offsets.street.saturating_add(lead);
                offsets.number = offsets.number.saturating_add(lead);
            }
        }

        offsets.normalized()
    }

    /// Reveal schedule for one envelope.
    pub fn schedule(
        &self,
        course: Course,
        course_start: DateTime<Utc>,
        leg: Option<&TravelLeg>,
    ) -> RevealSchedule {
        let offsets = self.offsets_for(course, leg.map(|l| l.duration_minutes));
        let at = |minutes: i64| {
            course_start
                .checked_sub_signed(Duration::minutes(minutes))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        RevealSchedule {
            teasing_at: at(offsets.teasing),
            clue_1_at: at(offsets.clue_1),
            clue_2_at: at(offsets.clue_2),
            street_at: at(offsets.street),
            number_at: at(offsets.number),
            opened_at: course_start,
        }
    }
}
