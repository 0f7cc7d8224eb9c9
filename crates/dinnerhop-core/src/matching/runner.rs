//! The "run matching" boundary.
//!
//! A run is split in two so that travel legs can be resolved in between
//! without holding a write transaction:
//!
//! 1. [`MatchRunner::prepare`] validates the event, runs Step A (reusing
//!    existing assignments) and Step B, and returns a [`MatchDraft`].
//! 2. [`MatchRunner::commit`] drafts envelopes with their reveal schedules,
//!    allocates clues, and writes everything as plan `version + 1`. The new
//!    plan replaces the active one only once all its rows are written.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::audit::{self, AuditEntry};
use crate::clues::{street_info, ClueAllocator, ClueConfig};
use crate::error::{DatabaseError, RepairError, Result, ValidationError};
use crate::model::{
    Assignment, Couple, CoupleId, Course, DinnerEvent, EventId, MatchPlan, MatchStats, NewEnvelope,
    NewPairing, PlanId, PlanStatus,
};
use crate::storage::{Config, MatchStore};
use crate::timing::{
    estimate_legs, resolve_legs, DistanceConfig, EnvelopeTimingCalculator, EventTiming, LegRequest,
    RouteProvider, TravelLeg,
};

use super::pairing::{PairingEngine, PairingInput, PairingOutcome};
use super::roles::{RoleAssignment, RoleAssignmentEngine};
use super::MatchingConfig;

/// What to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRequest {
    pub event_id: EventId,
    /// Courses whose pairings are copied from the active plan
    pub frozen_courses: BTreeSet<Course>,
}

impl MatchRequest {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            frozen_courses: BTreeSet::new(),
        }
    }

    pub fn freeze(mut self, course: Course) -> Self {
        if course.is_hosted() {
            self.frozen_courses.insert(course);
        }
        self
    }
}

/// Computed but not yet written matching result.
#[derive(Debug, Clone)]
pub struct MatchDraft {
    event: DinnerEvent,
    couples: Vec<Couple>,
    roles: RoleAssignment,
    pairing: PairingOutcome,
    frozen_courses: BTreeSet<Course>,
    timing: EventTiming,
    stats: MatchStats,
    /// Active plan and its revision when the draft was computed
    base: Option<(PlanId, i64)>,
}

impl MatchDraft {
    pub fn event(&self) -> &DinnerEvent {
        &self.event
    }

    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.roles.assignments
    }

    pub fn pairings(&self) -> &[NewPairing] {
        &self.pairing.pairings
    }

    pub fn unplaced(&self) -> &[(CoupleId, Course)] {
        &self.pairing.unplaced
    }

    fn couple(&self, id: CoupleId) -> Option<&Couple> {
        self.couples.iter().find(|c| c.id == id)
    }

    /// Guest-to-host legs for every pairing where both homes are geocoded.
    pub fn leg_requests(&self) -> Vec<LegRequest> {
        self.pairing
            .pairings
            .iter()
            .filter_map(|p| {
                let from = self.couple(p.guest_couple_id)?.coordinates?;
                let to = self.couple(p.host_couple_id)?.coordinates?;
                Some(LegRequest {
                    couple_id: p.guest_couple_id,
                    course: p.course,
                    from,
                    to,
                })
            })
            .collect()
    }

    /// One envelope per couple and course it attends, plus the afterparty.
    pub fn envelopes(&self, legs: &HashMap<(CoupleId, Course), TravelLeg>, now: DateTime<Utc>) -> Vec<NewEnvelope> {
        let calc = EnvelopeTimingCalculator::new(self.timing.clone());
        let mut envelopes = Vec::new();

        for couple in &self.couples {
            for course in Course::HOSTED {
                let Some(start) = self.event.course_start(course) else {
                    continue;
                };
                let hosts_course = self
                    .roles
                    .assignments
                    .iter()
                    .any(|a| a.couple_id == couple.id && a.course == course && a.is_host);

                let (host, leg) = if hosts_course {
                    (couple, None)
                } else {
                    match self.pairing.host_of(couple.id, course).and_then(|h| self.couple(h)) {
                        Some(host) => (host, legs.get(&(couple.id, course))),
                        None => continue,
                    }
                };

                let schedule = calc.schedule(course, start, leg);
                envelopes.push(NewEnvelope {
                    couple_id: couple.id,
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
                });
            }

            if let Some(party) = &self.event.afterparty {
                let schedule = calc.schedule(Course::Afterparty, party.starts_at, None);
                envelopes.push(NewEnvelope {
                    couple_id: couple.id,
                    course: Course::Afterparty,
                    host_couple_id: None,
                    destination_address: party.address.clone(),
                    destination_notes: party.notes.clone(),
                    cycling_distance_km: None,
                    current_state: schedule.state_at(now),
                    schedule,
                });
            }
        }

        envelopes
    }
}

/// A committed run.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub plan: MatchPlan,
    pub envelopes: usize,
    pub unplaced: Vec<(CoupleId, Course)>,
}

/// Runs Step A and Step B for an event and commits a new plan version.
#[derive(Debug, Clone, Default)]
pub struct MatchRunner {
    matching: MatchingConfig,
    timing: EventTiming,
    distance: DistanceConfig,
    clues: ClueConfig,
}

impl MatchRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            matching: config.matching.clone(),
            timing: config.timing.clone(),
            distance: config.distance.clone(),
            clues: config.clues.clone(),
        }
    }

    /// Validate and compute a matching without writing anything.
    ///
    /// # Errors
    /// Returns a validation error for an unknown event or too few active couples.
    pub fn prepare<S: MatchStore>(&self, store: &S, request: &MatchRequest) -> Result<MatchDraft> {
        let event = store
            .event(request.event_id)?
            .ok_or(ValidationError::EventNotFound(request.event_id))?;

        let couples: Vec<Couple> = store
            .couples_for_event(event.id)?
            .into_iter()
            .filter(|c| !c.cancelled)
            .collect();
        if couples.len() < self.matching.min_couples {
            return Err(ValidationError::TooFewCouples {
                event_id: event.id,
                found: couples.len(),
                min: self.matching.min_couples,
            }
            .into());
        }

        let existing = store.assignments_for_event(event.id)?;
        let roles = RoleAssignmentEngine::new(self.matching.clone()).assign(event.id, &couples, &existing);

        let (frozen_courses, frozen) = self.frozen_pairings(store, &event, &request.frozen_courses)?;
        let blocked = store.blocked_pairs(event.id)?;
        let pairing = PairingEngine::new(self.matching.clone()).pair(&PairingInput {
            couples: &couples,
            assignments: &roles.assignments,
            blocked: &blocked,
            frozen_courses: &frozen_courses,
            frozen: &frozen,
        });

        let timing = store.event_timing(event.id)?.unwrap_or_else(|| self.timing.clone());
        let base = plan_revision(store, event.active_plan_id)?;

        let mut hosts_per_course = BTreeMap::new();
        for a in roles.assignments.iter().filter(|a| a.is_host) {
            *hosts_per_course.entry(a.course).or_insert(0) += 1;
        }
        let stats = MatchStats {
            couples: couples.len(),
            hosts_per_course,
            pairings: pairing.pairings.len(),
            forced_pairings: pairing.forced_count(),
            envelopes: 0,
            preference_satisfaction: roles.satisfaction,
            warnings: roles
                .warnings
                .iter()
                .chain(&pairing.warnings)
                .cloned()
                .collect(),
        };

        Ok(MatchDraft {
            event,
            couples,
            roles,
            pairing,
            frozen_courses,
            timing,
            stats,
            base,
        })
    }

    fn frozen_pairings<S: MatchStore>(
        &self,
        store: &S,
        event: &DinnerEvent,
        requested: &BTreeSet<Course>,
    ) -> Result<(BTreeSet<Course>, Vec<NewPairing>)> {
        if requested.is_empty() {
            return Ok((BTreeSet::new(), Vec::new()));
        }
        let Some(active) = event.active_plan_id else {
            tracing::warn!(event_id = event.id, "no active plan, frozen courses are re-paired");
            return Ok((BTreeSet::new(), Vec::new()));
        };
        let frozen = store
            .pairings_for_plan(active)?
            .into_iter()
            .filter(|p| requested.contains(&p.course))
            .map(|p| NewPairing {
                course: p.course,
                host_couple_id: p.host_couple_id,
                guest_couple_id: p.guest_couple_id,
                forced: p.forced,
            })
            .collect();
        Ok((requested.clone(), frozen))
    }

    /// Write the draft as a new plan version and make it the active plan.
    pub fn commit<S: MatchStore>(
        &self,
        store: &mut S,
        draft: MatchDraft,
        legs: &HashMap<(CoupleId, Course), TravelLeg>,
    ) -> Result<MatchReport> {
        let envelopes = draft.envelopes(legs, Utc::now());
        let allocator = ClueAllocator::new(self.clues.clone());
        let event_id = draft.event.id;

        let mut stats = draft.stats.clone();
        stats.envelopes = envelopes.len();

        let plan = store.transaction(|tx| -> Result<MatchPlan> {
            // Cascades applied after prepare would be lost by superseding.
            let active = tx.event(event_id)?.and_then(|e| e.active_plan_id);
            if plan_revision(&*tx, active)? != draft.base {
                return Err(RepairError::StaleDraft { event_id }.into());
            }

            for a in &draft.roles.created {
                tx.upsert_assignment(a)?;
            }

            let version = tx.latest_plan_version(event_id)? + 1;
            let plan_id = tx.insert_plan(event_id, version, &stats)?;

            for p in &draft.pairing.pairings {
                tx.insert_pairing(plan_id, p)?;
            }
            for e in &envelopes {
                tx.insert_envelope(plan_id, e)?;
            }
            for couple in &draft.couples {
                let courses = draft.roles.host_courses(couple.id);
                if courses.is_empty() {
                    continue;
                }
                tx.replace_course_clues(plan_id, couple.id, &allocator.for_host(plan_id, couple, &courses))?;
                let info: Vec<_> = courses.iter().map(|c| street_info(plan_id, couple, *c)).collect();
                tx.replace_street_info(plan_id, couple.id, &info)?;
            }

            tx.activate_plan(event_id, plan_id)?;
            tx.plan(plan_id)?
                .ok_or_else(|| DatabaseError::QueryFailed(format!("plan {plan_id} vanished during commit")).into())
        })?;

        tracing::info!(
            event_id,
            plan_id = plan.id,
            version = plan.version,
            pairings = stats.pairings,
            forced = stats.forced_pairings,
            envelopes = stats.envelopes,
            warnings = stats.warnings.len(),
            "matching committed"
        );

        let entry = AuditEntry::new(event_id, Some(plan.id), "run_matching")
            .with_couples(draft.pairing.unplaced.iter().map(|(c, _)| *c).collect())
            .with_warnings(stats.warnings.clone())
            .with_details(serde_json::json!({
                "version": plan.version,
                "pairings": stats.pairings,
                "forced_pairings": stats.forced_pairings,
                "envelopes": stats.envelopes,
                "preference_satisfaction": stats.preference_satisfaction,
                "frozen_courses": draft.frozen_courses,
            }));
        audit::record(&*store, &entry);

        Ok(MatchReport {
            plan,
            envelopes: stats.envelopes,
            unplaced: draft.pairing.unplaced,
        })
    }

    /// Prepare and commit using straight-line travel estimates.
    pub fn run<S: MatchStore>(&self, store: &mut S, request: &MatchRequest) -> Result<MatchReport> {
        let draft = self.prepare(store, request)?;
        let legs = estimate_legs(&draft.leg_requests(), &self.distance);
        self.commit(store, draft, &legs)
    }

    /// Prepare and commit, resolving travel legs through `provider`.
    pub async fn run_with_routes<S: MatchStore, P: RouteProvider>(
        &self,
        store: &mut S,
        request: &MatchRequest,
        provider: &P,
    ) -> Result<MatchReport> {
        let draft = self.prepare(store, request)?;
        let legs = resolve_legs(provider, &draft.leg_requests(), &self.distance).await;
        self.commit(store, draft, &legs)
    }
}

fn plan_revision<S: MatchStore>(store: &S, plan_id: Option<PlanId>) -> Result<Option<(PlanId, i64)>> {
    let Some(plan_id) = plan_id else {
        return Ok(None);
    };
    Ok(store.plan(plan_id)?.map(|p| (p.id, p.revision)))
}

/// Recompute `current_state` of every live envelope in a plan at `now`.
///
/// Returns how many envelopes changed state.
pub fn refresh_envelope_states<S: MatchStore>(store: &mut S, plan_id: PlanId, now: DateTime<Utc>) -> Result<usize> {
    store.transaction(|tx| -> Result<usize> {
        let plan = tx
            .plan(plan_id)?
            .ok_or(RepairError::PlanNotFound(plan_id))?;
        if plan.status == PlanStatus::Superseded {
            return Ok(0);
        }
        let mut changed = 0;
        for envelope in tx.envelopes_for_plan(plan_id)?.into_iter().filter(|e| !e.cancelled) {
            let state = envelope.schedule.state_at(now);
            if state != envelope.current_state {
                tx.update_envelope_state(envelope.id, state)?;
                changed += 1;
            }
        }
        Ok(changed)
    })
}
