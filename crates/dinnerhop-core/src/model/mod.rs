//! Domain types shared by every engine.
//!
//! Ids are SQLite row ids. Couples and assignments belong to an event;
//! pairings and envelopes belong to one match plan version.

mod couple;
mod course;
mod envelope;
mod plan;

pub use couple::{Afterparty, BlockedPair, Coordinates, Couple, CoupleId, DinnerEvent, EventId, NewCouple};
pub use course::Course;
pub use envelope::{Envelope, EnvelopeId, EnvelopeState, NewEnvelope, RevealSchedule};
pub use plan::{
    Assignment, CoursePairing, MatchPlan, MatchStats, MatchWarning, NewPairing, PairingId, PlanId,
    PlanStatus, WarningKind,
};
