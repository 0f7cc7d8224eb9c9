//! Participants, events, and hard pairing constraints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::course::Course;
use super::plan::PlanId;

/// Unique identifier for an event.
pub type EventId = i64;

/// Unique identifier for a couple.
pub type CoupleId = i64;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS84 position of a couple's home.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres.
    pub fn haversine_km(&self, other: &Coordinates) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// A participating unit of one or two people.
///
/// Couples are never hard-deleted while pairings reference them; dropping
/// out sets `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Couple {
    pub id: CoupleId,
    pub event_id: EventId,
    pub name: String,
    /// Number of people (1 or 2)
    pub persons: u32,
    pub address: String,
    pub address_notes: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// Course this couple would like to host
    pub course_preference: Option<Course>,
    pub allergies: Vec<String>,
    pub fun_facts: Vec<String>,
    /// One entry per person, used for age clues
    pub birth_years: Vec<i32>,
    /// Override of the default host capacity (guest persons)
    pub max_guests: Option<u32>,
    /// Willing to squeeze in a few extra guests
    pub flex_host: bool,
    /// Willing to take guests as a last resort
    pub emergency_host: bool,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

/// Registration data for a couple that has no id yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCouple {
    pub event_id: EventId,
    pub name: String,
    pub persons: u32,
    pub address: String,
    pub address_notes: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub course_preference: Option<Course>,
    pub allergies: Vec<String>,
    pub fun_facts: Vec<String>,
    pub birth_years: Vec<i32>,
    pub max_guests: Option<u32>,
    pub flex_host: bool,
    pub emergency_host: bool,
}

impl NewCouple {
    /// A two-person couple with no preferences.
    pub fn new(event_id: EventId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            event_id,
            name: name.into(),
            persons: 2,
            address: address.into(),
            address_notes: None,
            coordinates: None,
            course_preference: None,
            allergies: Vec::new(),
            fun_facts: Vec::new(),
            birth_years: Vec::new(),
            max_guests: None,
            flex_host: false,
            emergency_host: false,
        }
    }

    pub fn with_persons(mut self, persons: u32) -> Self {
        self.persons = persons.clamp(1, 2);
        self
    }

    pub fn with_preference(mut self, course: Course) -> Self {
        self.course_preference = Some(course);
        self
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.coordinates = Some(Coordinates::new(lat, lon));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.address_notes = Some(notes.into());
        self
    }

    pub fn with_fun_fact(mut self, fact: impl Into<String>) -> Self {
        self.fun_facts.push(fact.into());
        self
    }

    pub fn with_birth_year(mut self, year: i32) -> Self {
        self.birth_years.push(year);
        self
    }

    pub fn with_max_guests(mut self, max_guests: u32) -> Self {
        self.max_guests = Some(max_guests);
        self
    }

    pub fn flex(mut self) -> Self {
        self.flex_host = true;
        self
    }

    pub fn emergency(mut self) -> Self {
        self.emergency_host = true;
        self
    }
}

/// Two couples that must never be paired as host and guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedPair {
    pub event_id: EventId,
    pub couple_a: CoupleId,
    pub couple_b: CoupleId,
}

impl BlockedPair {
    pub fn new(event_id: EventId, couple_a: CoupleId, couple_b: CoupleId) -> Self {
        Self {
            event_id,
            couple_a,
            couple_b,
        }
    }

    /// Whether this block covers the unordered pair `(a, b)`.
    pub fn involves(&self, a: CoupleId, b: CoupleId) -> bool {
        (self.couple_a == a && self.couple_b == b) || (self.couple_a == b && self.couple_b == a)
    }
}

/// Closing stage of the evening: everybody meets at one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Afterparty {
    pub starts_at: DateTime<Utc>,
    pub address: String,
    pub notes: Option<String>,
}

/// A progressive dinner event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DinnerEvent {
    pub id: EventId,
    pub name: String,
    pub starter_at: DateTime<Utc>,
    pub main_at: DateTime<Utc>,
    pub dessert_at: DateTime<Utc>,
    pub afterparty: Option<Afterparty>,
    /// Set only by committing a new match plan
    pub active_plan_id: Option<PlanId>,
    pub created_at: DateTime<Utc>,
}

impl DinnerEvent {
    /// Start time of a course, `None` for an afterparty the event does not have.
    pub fn course_start(&self, course: Course) -> Option<DateTime<Utc>> {
        match course {
            Course::Starter => Some(self.starter_at),
            Course::Main => Some(self.main_at),
            Course::Dessert => Some(self.dessert_at),
            Course::Afterparty => self.afterparty.as_ref().map(|a| a.starts_at),
        }
    }
}
