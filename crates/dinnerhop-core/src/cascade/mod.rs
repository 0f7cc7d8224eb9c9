//! Consistency repair on an active match plan.
//!
//! [`CascadeRepair`] applies one [`Mutation`] at a time inside a storage
//! transaction, checks and bumps the plan's revision, and reports guests
//! left without a host instead of re-placing them. Re-placement is a
//! separate step: [`unplaced_guests`] lists who needs it, a `reassign`
//! seats them, and [`issue_envelope`] writes their new envelope.

mod engine;
mod mutation;

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::{DatabaseError, RepairError};
use crate::model::{CoupleId, Course, EnvelopeId, MatchPlan, NewEnvelope, PlanId};
use crate::storage::MatchStore;
use crate::timing::{straight_line_leg, DistanceConfig, EnvelopeTimingCalculator, EventTiming};

pub use engine::{CascadeRepair, RepairOutcome};
pub use mutation::Mutation;

/// Guest assignments on hosted courses with no pairing in `plan_id`.
///
/// Cancelled couples are skipped. Sorted by couple, then course.
pub fn unplaced_guests<S: MatchStore>(
    store: &S,
    plan_id: PlanId,
) -> Result<Vec<(CoupleId, Course)>, RepairError> {
    let plan = store.plan(plan_id)?.ok_or(RepairError::PlanNotFound(plan_id))?;

    let cancelled: HashSet<CoupleId> = store
        .couples_for_event(plan.event_id)?
        .into_iter()
        .filter(|c| c.cancelled)
        .map(|c| c.id)
        .collect();
    let placed: HashSet<(CoupleId, Course)> = store
        .pairings_for_plan(plan_id)?
        .into_iter()
        .map(|p| (p.guest_couple_id, p.course))
        .collect();

    let mut unplaced: Vec<(CoupleId, Course)> = store
        .assignments_for_event(plan.event_id)?
        .into_iter()
        .filter(|a| !a.is_host && a.course.is_hosted() && !cancelled.contains(&a.couple_id))
        .map(|a| (a.couple_id, a.course))
        .filter(|key| !placed.contains(key))
        .collect();
    unplaced.sort_unstable();
    Ok(unplaced)
}

/// Write a fresh envelope for `couple_id` and `course`, replacing any live one.
///
/// The destination is the couple itself when it hosts the course, otherwise
/// the host of its pairing. Timing uses the event's stored timing (or
/// `default_timing`) and a straight-line leg when both homes are geocoded.
pub fn issue_envelope<S: MatchStore>(
    store: &mut S,
    plan: &MatchPlan,
    couple_id: CoupleId,
    course: Course,
    default_timing: &EventTiming,
    distance: &DistanceConfig,
    now: DateTime<Utc>,
) -> Result<EnvelopeId, RepairError> {
    if !course.is_hosted() {
        return Err(RepairError::NotHostable(course));
    }
    let event = store.event(plan.event_id)?.ok_or_else(|| {
        DatabaseError::QueryFailed(format!("event {} of plan {} is missing", plan.event_id, plan.id))
    })?;
    let couple = store.couple(couple_id)?.ok_or(RepairError::CoupleNotFound(couple_id))?;
    if couple.cancelled {
        return Err(RepairError::CoupleCancelled(couple_id));
    }

    let hosts_course = store
        .assignments_for_couple(plan.event_id, couple_id)?
        .iter()
        .any(|a| a.course == course && a.is_host);
    let host = if hosts_course {
        couple.clone()
    } else {
        let host_id = store
            .pairings_for_guest(plan.id, couple_id)?
            .into_iter()
            .find(|p| p.course == course)
            .map(|p| p.host_couple_id)
            .ok_or(RepairError::NoHost { couple_id, course })?;
        store.couple(host_id)?.ok_or(RepairError::CoupleNotFound(host_id))?
    };

    let leg = match (hosts_course, couple.coordinates, host.coordinates) {
        (false, Some(from), Some(to)) => Some(straight_line_leg(from, to, distance)),
        _ => None,
    };
    let timing = store
        .event_timing(plan.event_id)?
        .unwrap_or_else(|| default_timing.clone());
    let start = event.course_start(course).ok_or(RepairError::NotHostable(course))?;
    let schedule = EnvelopeTimingCalculator::new(timing).schedule(course, start, leg.as_ref());

    let stale: Vec<EnvelopeId> = store
        .envelopes_for_couple(plan.id, couple_id)?
        .into_iter()
        .filter(|e| e.course == course && !e.cancelled)
        .map(|e| e.id)
        .collect();
    store.cancel_envelopes(&stale)?;

    let id = store.insert_envelope(
        plan.id,
        &NewEnvelope {
            couple_id,
            course,
            host_couple_id: Some(host.id),
            destination_address: host.address.clone(),
            destination_notes: host.address_notes.clone(),
            cycling_distance_km: if hosts_course {
                Some(0.0)
            } else {
                leg.map(|l| l.distance_km)
            },
            current_state: schedule.state_at(now),
            schedule,
        },
    )?;
    Ok(id)
}
