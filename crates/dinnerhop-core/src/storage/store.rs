//! Storage vocabulary used by the matching runner and cascade repair.
//!
//! Every engine operation is expressed through these select, insert,
//! update and delete calls so the engines can run against any backend.
//! Backends must make [`MatchStore::transaction`] serialize writers per
//! match plan; the SQLite implementation uses `BEGIN IMMEDIATE`.

use crate::audit::AuditSink;
use crate::clues::{CourseClues, StreetInfo};
use crate::error::DatabaseError;
use crate::model::{
    Assignment, BlockedPair, Coordinates, Couple, CoupleId, Course, CoursePairing, DinnerEvent,
    Envelope, EnvelopeId, EnvelopeState, EventId, MatchPlan, MatchStats, NewEnvelope, NewPairing,
    PairingId, PlanId,
};
use crate::timing::EventTiming;

type DbResult<T> = Result<T, DatabaseError>;

/// Persistence operations over couples, assignments, plans, pairings and envelopes.
pub trait MatchStore: AuditSink {
    /// Run `f` atomically. Any error rolls back every write made by `f`.
    fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DatabaseError>;

    // === Events ===

    fn event(&self, id: EventId) -> DbResult<Option<DinnerEvent>>;

    /// Per-event timing, `None` when the event uses configured defaults.
    fn event_timing(&self, event_id: EventId) -> DbResult<Option<EventTiming>>;

    // === Couples ===

    fn couple(&self, id: CoupleId) -> DbResult<Option<Couple>>;

    /// All couples of an event, cancelled ones included.
    fn couples_for_event(&self, event_id: EventId) -> DbResult<Vec<Couple>>;

    fn update_couple_address(
        &mut self,
        id: CoupleId,
        address: &str,
        notes: Option<&str>,
        coordinates: Option<Coordinates>,
    ) -> DbResult<()>;

    /// Set the soft-delete flag. Returns true if the stored value changed.
    fn set_couple_cancelled(&mut self, id: CoupleId, cancelled: bool) -> DbResult<bool>;

    fn blocked_pairs(&self, event_id: EventId) -> DbResult<Vec<BlockedPair>>;

    // === Assignments ===

    fn assignments_for_event(&self, event_id: EventId) -> DbResult<Vec<Assignment>>;

    fn assignments_for_couple(&self, event_id: EventId, couple_id: CoupleId) -> DbResult<Vec<Assignment>>;

    /// Insert or replace the assignment for `(event, couple, course)`.
    fn upsert_assignment(&mut self, assignment: &Assignment) -> DbResult<()>;

    fn delete_assignment(&mut self, event_id: EventId, couple_id: CoupleId, course: Course) -> DbResult<usize>;

    // === Plans ===

    fn plan(&self, id: PlanId) -> DbResult<Option<MatchPlan>>;

    /// Highest version for the event, 0 when none exists.
    fn latest_plan_version(&self, event_id: EventId) -> DbResult<u32>;

    /// Insert a plan in `draft` status.
    fn insert_plan(&mut self, event_id: EventId, version: u32, stats: &MatchStats) -> DbResult<PlanId>;

    /// Supersede the event's active plan and activate `plan_id`.
    fn activate_plan(&mut self, event_id: EventId, plan_id: PlanId) -> DbResult<()>;

    /// Increment the revision if it still equals `expected`. Returns false on mismatch.
    fn bump_plan_revision(&mut self, plan_id: PlanId, expected: i64) -> DbResult<bool>;

    // === Pairings ===

    fn pairings_for_plan(&self, plan_id: PlanId) -> DbResult<Vec<CoursePairing>>;

    fn pairings_for_host(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<CoursePairing>>;

    fn pairings_for_guest(&self, plan_id: PlanId, guest: CoupleId) -> DbResult<Vec<CoursePairing>>;

    fn insert_pairing(&mut self, plan_id: PlanId, pairing: &NewPairing) -> DbResult<PairingId>;

    fn delete_pairings(&mut self, ids: &[PairingId]) -> DbResult<usize>;

    fn set_pairing_host(&mut self, id: PairingId, host: CoupleId) -> DbResult<()>;

    // === Envelopes ===

    fn envelopes_for_plan(&self, plan_id: PlanId) -> DbResult<Vec<Envelope>>;

    /// Envelopes the couple receives, cancelled ones included.
    fn envelopes_for_couple(&self, plan_id: PlanId, couple_id: CoupleId) -> DbResult<Vec<Envelope>>;

    /// Non-cancelled envelopes pointing at `host`, its own self-hosted one included.
    fn envelopes_for_host(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<Envelope>>;

    fn insert_envelope(&mut self, plan_id: PlanId, envelope: &NewEnvelope) -> DbResult<EnvelopeId>;

    /// Mark envelopes cancelled. Returns how many were live before.
    fn cancel_envelopes(&mut self, ids: &[EnvelopeId]) -> DbResult<usize>;

    fn update_envelope_destination(
        &mut self,
        id: EnvelopeId,
        host: Option<CoupleId>,
        address: &str,
        notes: Option<&str>,
    ) -> DbResult<()>;

    fn update_envelope_state(&mut self, id: EnvelopeId, state: EnvelopeState) -> DbResult<()>;

    // === Derived host data ===

    fn course_clues(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<CourseClues>>;

    /// Replace every clue allocation of `host` in `plan_id` with `clues`.
    fn replace_course_clues(&mut self, plan_id: PlanId, host: CoupleId, clues: &[CourseClues]) -> DbResult<()>;

    fn street_info(&self, plan_id: PlanId, host: CoupleId) -> DbResult<Vec<StreetInfo>>;

    /// Replace every street fragment record of `host` in `plan_id` with `info`.
    fn replace_street_info(&mut self, plan_id: PlanId, host: CoupleId, info: &[StreetInfo]) -> DbResult<()>;
}
