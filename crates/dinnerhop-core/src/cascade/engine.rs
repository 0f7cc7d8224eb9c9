use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::audit::{self, AuditEntry};
use crate::clues::{street_info, ClueAllocator, ClueConfig};
use crate::error::RepairError;
use crate::model::{
    Assignment, Coordinates, Couple, CoupleId, Course, EnvelopeId, EventId, MatchPlan, MatchWarning, NewPairing,
    PairingId, PlanId, PlanStatus, WarningKind,
};
use crate::storage::{Config, MatchStore};
use crate::timing::{DistanceConfig, EventTiming};

use super::{issue_envelope, Mutation};

/// What one cascade call changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub event_id: EventId,
    pub plan_id: PlanId,
    pub action: String,
    /// Plan revision after the call
    pub revision: i64,
    pub envelopes_cancelled: usize,
    pub envelopes_updated: usize,
    pub pairings_removed: usize,
    pub pairings_created: usize,
    pub pairings_repointed: usize,
    pub assignments_created: usize,
    pub assignments_deleted: usize,
    /// Roles rewritten in place, such as host to guest
    pub assignments_updated: usize,
    pub couple_cancelled: bool,
    pub couple_updated: bool,
    /// Guests left without a host, for re-placement by the caller
    pub unplaced: Vec<(CoupleId, Course)>,
    /// Seats that have a host but no live envelope yet
    pub needs_envelope: Vec<(CoupleId, Course)>,
    /// Constraints the mutation was allowed to break
    pub warnings: Vec<MatchWarning>,
    #[serde(skip)]
    changed: bool,
}

impl RepairOutcome {
    fn new(plan: &MatchPlan, action: &str) -> Self {
        Self {
            event_id: plan.event_id,
            plan_id: plan.id,
            action: action.to_string(),
            revision: plan.revision,
            ..Self::default()
        }
    }

    /// Whether the call wrote anything.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Distinct couples in [`Self::unplaced`].
    pub fn unplaced_couple_ids(&self) -> Vec<CoupleId> {
        let ids: BTreeSet<CoupleId> = self.unplaced.iter().map(|(c, _)| *c).collect();
        ids.into_iter().collect()
    }

    fn mark(&mut self, wrote: bool) {
        self.changed |= wrote;
    }
}

/// Applies [`Mutation`]s to an active match plan.
#[derive(Debug, Clone, Default)]
pub struct CascadeRepair {
    timing: EventTiming,
    distance: DistanceConfig,
    clues: ClueConfig,
}

type RepairResult<T> = Result<T, RepairError>;

impl CascadeRepair {
    pub fn new(config: &Config) -> Self {
        Self {
            timing: config.timing.clone(),
            distance: config.distance.clone(),
            clues: config.clues.clone(),
        }
    }

    /// Apply `mutation` to `plan_id` atomically.
    ///
    /// Calls that change nothing leave the revision alone, so repeating a
    /// mutation is safe.
    pub fn apply<S: MatchStore>(&self, store: &mut S, plan_id: PlanId, mutation: &Mutation) -> RepairResult<RepairOutcome> {
        self.apply_at(store, plan_id, None, mutation)
    }

    /// Like [`Self::apply`], failing with [`RepairError::Conflict`] unless the
    /// plan is still at `expected_revision`.
    pub fn apply_at<S: MatchStore>(
        &self,
        store: &mut S,
        plan_id: PlanId,
        expected_revision: Option<i64>,
        mutation: &Mutation,
    ) -> RepairResult<RepairOutcome> {
        let outcome = store.transaction(|tx| -> RepairResult<RepairOutcome> {
            let plan = active_plan(tx, plan_id)?;
            if let Some(expected) = expected_revision {
                if plan.revision != expected {
                    return Err(RepairError::Conflict { plan_id, expected });
                }
            }

            let mut out = RepairOutcome::new(&plan, mutation.action());
            match mutation {
                Mutation::GuestDropout { couple_id } => self.guest_dropout(tx, &plan, *couple_id, &mut out)?,
                Mutation::HostDropout { couple_id } => self.host_dropout(tx, &plan, *couple_id, &mut out)?,
                Mutation::AddressChange {
                    couple_id,
                    address,
                    notes,
                    coordinates,
                } => self.address_change(tx, &plan, *couple_id, address, notes.as_deref(), *coordinates, &mut out)?,
                Mutation::Reassign {
                    couple_id,
                    course,
                    new_host_couple_id,
                } => self.reassign(tx, &plan, *couple_id, *course, *new_host_couple_id, &mut out)?,
                Mutation::ResignHost { couple_id, courses } => self.resign_host(tx, &plan, *couple_id, courses, &mut out)?,
                Mutation::Split {
                    couple_id,
                    new_couple_id,
                } => self.split(tx, &plan, *couple_id, *new_couple_id, &mut out)?,
                Mutation::TransferHost {
                    couple_id,
                    to_couple_id,
                    courses,
                } => self.transfer_host(tx, &plan, *couple_id, *to_couple_id, courses, &mut out)?,
                Mutation::PromoteHost { couple_id, course } => self.promote_host(tx, &plan, *couple_id, *course, &mut out)?,
            }

            finish(tx, &plan, &mut out)?;
            Ok(out)
        })?;

        if outcome.changed() {
            tracing::info!(
                plan_id,
                action = mutation.action(),
                couple_id = mutation.couple_id(),
                revision = outcome.revision,
                unplaced = outcome.unplaced.len(),
                "cascade mutation applied"
            );
        } else {
            tracing::debug!(plan_id, action = mutation.action(), "cascade mutation was a no-op");
        }

        let mut couples = mutation.couples();
        couples.extend(outcome.unplaced_couple_ids());
        let entry = AuditEntry::new(outcome.event_id, Some(plan_id), mutation.action())
            .with_couples(couples)
            .with_warnings(outcome.warnings.clone())
            .with_details(serde_json::json!({ "mutation": mutation, "outcome": &outcome }));
        audit::record(&*store, &entry);

        Ok(outcome)
    }

    /// Write fresh envelopes for seats reported in [`RepairOutcome::needs_envelope`].
    pub fn issue_envelopes<S: MatchStore>(
        &self,
        store: &mut S,
        plan_id: PlanId,
        seats: &[(CoupleId, Course)],
    ) -> RepairResult<Vec<EnvelopeId>> {
        let (event_id, ids) = store.transaction(|tx| -> RepairResult<(EventId, Vec<EnvelopeId>)> {
            let plan = active_plan(tx, plan_id)?;
            let now = Utc::now();
            let mut ids = Vec::with_capacity(seats.len());
            for (couple_id, course) in seats {
                ids.push(issue_envelope(tx, &plan, *couple_id, *course, &self.timing, &self.distance, now)?);
            }
            if !ids.is_empty() && !tx.bump_plan_revision(plan.id, plan.revision)? {
                return Err(RepairError::Conflict {
                    plan_id,
                    expected: plan.revision,
                });
            }
            Ok((plan.event_id, ids))
        })?;

        tracing::info!(plan_id, issued = ids.len(), "envelopes issued");
        let entry = AuditEntry::new(event_id, Some(plan_id), "issue_envelopes")
            .with_couples(seats.iter().map(|(c, _)| *c).collect())
            .with_details(serde_json::json!({ "seats": seats, "envelopes": &ids }));
        audit::record(&*store, &entry);

        Ok(ids)
    }

    fn guest_dropout<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        let couple = member(tx, plan, couple_id)?;

        let envelopes: Vec<EnvelopeId> = tx
            .envelopes_for_couple(plan.id, couple.id)?
            .into_iter()
            .filter(|e| !e.cancelled && !e.is_self_hosted())
            .map(|e| e.id)
            .collect();
        out.envelopes_cancelled += tx.cancel_envelopes(&envelopes)?;

        let pairings: Vec<PairingId> = tx
            .pairings_for_guest(plan.id, couple.id)?
            .iter()
            .map(|p| p.id)
            .collect();
        out.pairings_removed += tx.delete_pairings(&pairings)?;

        out.couple_cancelled = tx.set_couple_cancelled(couple.id, true)?;
        out.mark(out.envelopes_cancelled > 0 || out.pairings_removed > 0 || out.couple_cancelled);
        Ok(())
    }

    fn host_dropout<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        let couple = member(tx, plan, couple_id)?;
        release_hosting(tx, plan, couple.id, &Course::HOSTED, out)?;

        for a in tx.assignments_for_couple(plan.event_id, couple.id)? {
            if a.is_host {
                out.assignments_deleted += tx.delete_assignment(plan.event_id, couple.id, a.course)?;
            }
        }
        out.mark(out.assignments_deleted > 0);

        self.refresh_host_data(tx, plan, couple.id)
    }

    #[allow(clippy::too_many_arguments)]
    fn address_change<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        address: &str,
        notes: Option<&str>,
        coordinates: Option<Coordinates>,
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        let couple = member(tx, plan, couple_id)?;
        let address = address.trim();
        // A new address without new coordinates invalidates the old ones.
        let coordinates = coordinates.or(if address == couple.address {
            couple.coordinates
        } else {
            None
        });

        if couple.address != address || couple.address_notes.as_deref() != notes || couple.coordinates != coordinates {
            tx.update_couple_address(couple.id, address, notes, coordinates)?;
            out.couple_updated = true;
            out.mark(true);
        }

        for envelope in tx.envelopes_for_host(plan.id, couple.id)? {
            if envelope.destination_address != address || envelope.destination_notes.as_deref() != notes {
                tx.update_envelope_destination(envelope.id, Some(couple.id), address, notes)?;
                out.envelopes_updated += 1;
                out.mark(true);
            }
        }

        self.refresh_host_data(tx, plan, couple.id)
    }

    fn reassign<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        course: Course,
        new_host: CoupleId,
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        let course = hosted(course)?;
        if couple_id == new_host {
            return Err(RepairError::SameCouple(couple_id));
        }
        let guest = active_member(tx, plan, couple_id)?;
        active_member(tx, plan, new_host)?;

        // A self-serving host has no table to seat guests at.
        let role = tx
            .assignments_for_couple(plan.event_id, new_host)?
            .into_iter()
            .find(|a| a.course == course && a.seats_guests())
            .ok_or(RepairError::NotAHost {
                couple_id: new_host,
                course,
            })?;
        let guest_roles = tx.assignments_for_couple(plan.event_id, couple_id)?;
        if guest_roles.iter().any(|a| a.course == course && a.is_host) {
            return Err(RepairError::AlreadyHosting { couple_id, course });
        }
        if is_blocked(tx, plan, couple_id, new_host)? {
            return Err(RepairError::BlockedPair(couple_id, new_host));
        }

        let current: Vec<_> = tx
            .pairings_for_guest(plan.id, couple_id)?
            .into_iter()
            .filter(|p| p.course == course)
            .collect();
        let already_seated = matches!(current.as_slice(), [p] if p.host_couple_id == new_host);

        if !already_seated {
            let mut seated = guest.persons;
            for p in tx.pairings_for_host(plan.id, new_host)? {
                if p.course == course && p.guest_couple_id != couple_id {
                    seated += tx.couple(p.guest_couple_id)?.map_or(0, |c| c.persons);
                }
            }
            if seated > role.max_guests {
                tracing::warn!(plan_id = plan.id, host = new_host, seated, capacity = role.max_guests, "reassign over capacity");
                out.warnings.push(MatchWarning::new(
                    WarningKind::Capacity,
                    Some(course),
                    vec![new_host, couple_id],
                    format!(
                        "host {new_host} seats {seated} guest persons after reassigning {couple_id}, capacity {}",
                        role.max_guests
                    ),
                ));
            }

            let ids: Vec<PairingId> = current.iter().map(|p| p.id).collect();
            out.pairings_removed += tx.delete_pairings(&ids)?;
            tx.insert_pairing(
                plan.id,
                &NewPairing {
                    course,
                    host_couple_id: new_host,
                    guest_couple_id: couple_id,
                    forced: false,
                },
            )?;
            out.pairings_created += 1;
            out.mark(true);
        }

        // Identity is (couple, course): any envelope not known to point at the
        // new host is stale, whoever it points at.
        let live: Vec<_> = tx
            .envelopes_for_couple(plan.id, couple_id)?
            .into_iter()
            .filter(|e| e.course == course && !e.cancelled)
            .collect();
        let (current_envelopes, stale): (Vec<_>, Vec<_>) = live
            .into_iter()
            .partition(|e| already_seated && e.host_couple_id == Some(new_host));
        let stale: Vec<EnvelopeId> = stale.iter().map(|e| e.id).collect();
        out.envelopes_cancelled += tx.cancel_envelopes(&stale)?;
        out.mark(out.envelopes_cancelled > 0);
        if current_envelopes.is_empty() {
            out.needs_envelope.push((couple_id, course));
        }

        if !guest_roles.iter().any(|a| a.course == course) {
            tx.upsert_assignment(&Assignment::guest(plan.event_id, couple_id, course))?;
            out.assignments_created += 1;
            out.mark(true);
        }
        Ok(())
    }

    fn resign_host<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        courses: &[Course],
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        let couple = member(tx, plan, couple_id)?;
        let roles = tx.assignments_for_couple(plan.event_id, couple.id)?;

        let mut resigning = Vec::new();
        if courses.is_empty() {
            resigning.extend(roles.iter().filter(|a| a.is_host).map(|a| a.course));
        } else {
            for course in courses {
                let course = hosted(*course)?;
                match roles.iter().find(|a| a.course == course) {
                    Some(a) if a.is_host => resigning.push(course),
                    // already a guest there
                    Some(_) => {}
                    None => return Err(RepairError::NotAHost { couple_id, course }),
                }
            }
        }
        if resigning.is_empty() {
            return Ok(());
        }

        release_hosting(tx, plan, couple.id, &resigning, out)?;
        for course in &resigning {
            tx.upsert_assignment(&Assignment::guest(plan.event_id, couple.id, *course))?;
            out.assignments_updated += 1;
            out.unplaced.push((couple.id, *course));
        }
        out.mark(true);

        self.refresh_host_data(tx, plan, couple.id)
    }

    fn split<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        new_couple_id: CoupleId,
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        if couple_id == new_couple_id {
            return Err(RepairError::SameCouple(couple_id));
        }
        member(tx, plan, couple_id)?;
        let split_off = active_member(tx, plan, new_couple_id)?;

        if !tx.pairings_for_guest(plan.id, split_off.id)?.is_empty()
            || !tx.pairings_for_host(plan.id, split_off.id)?.is_empty()
        {
            return Err(RepairError::AlreadyPlaced(split_off.id));
        }

        let roles = tx.assignments_for_couple(plan.event_id, split_off.id)?;
        for course in Course::HOSTED {
            match roles.iter().find(|a| a.course == course) {
                Some(a) if a.is_host => continue,
                Some(_) => {}
                None => {
                    tx.upsert_assignment(&Assignment::guest(plan.event_id, split_off.id, course))?;
                    out.assignments_created += 1;
                    out.mark(true);
                }
            }
            out.unplaced.push((split_off.id, course));
        }
        Ok(())
    }

    fn transfer_host<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        from: CoupleId,
        to: CoupleId,
        courses: &[Course],
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        if from == to {
            return Err(RepairError::SameCouple(from));
        }
        member(tx, plan, from)?;
        let target = active_member(tx, plan, to)?;

        let from_roles = tx.assignments_for_couple(plan.event_id, from)?;
        let requested: BTreeSet<Course> = if courses.is_empty() {
            from_roles.iter().filter(|a| a.is_host).map(|a| a.course).collect()
        } else {
            courses.iter().map(|c| hosted(*c)).collect::<RepairResult<_>>()?
        };

        for course in requested {
            let to_roles = tx.assignments_for_couple(plan.event_id, to)?;
            let to_host_role = to_roles.iter().find(|a| a.course == course && a.is_host).cloned();
            let Some(source) = from_roles.iter().find(|a| a.course == course && a.is_host) else {
                if to_host_role.is_some() {
                    // handed over by an earlier call
                    continue;
                }
                return Err(RepairError::NotAHost { couple_id: from, course });
            };

            let guests: Vec<_> = tx
                .pairings_for_host(plan.id, from)?
                .into_iter()
                .filter(|p| p.course == course && p.guest_couple_id != to)
                .collect();
            for p in &guests {
                if is_blocked(tx, plan, to, p.guest_couple_id)? {
                    return Err(RepairError::BlockedPair(to, p.guest_couple_id));
                }
            }

            let own_seat: Vec<PairingId> = tx
                .pairings_for_guest(plan.id, to)?
                .iter()
                .filter(|p| p.course == course)
                .map(|p| p.id)
                .collect();
            out.pairings_removed += tx.delete_pairings(&own_seat)?;
            for p in &guests {
                tx.set_pairing_host(p.id, to)?;
                out.pairings_repointed += 1;
            }

            for envelope in tx.envelopes_for_host(plan.id, from)? {
                if envelope.course != course {
                    continue;
                }
                if envelope.couple_id == from {
                    out.envelopes_cancelled += tx.cancel_envelopes(&[envelope.id])?;
                } else {
                    tx.update_envelope_destination(
                        envelope.id,
                        Some(to),
                        &target.address,
                        target.address_notes.as_deref(),
                    )?;
                    out.envelopes_updated += 1;
                }
            }

            // The new host's own envelope now points at itself.
            let own: Vec<_> = tx
                .envelopes_for_couple(plan.id, to)?
                .into_iter()
                .filter(|e| e.course == course && !e.cancelled)
                .collect();
            for envelope in own.iter().filter(|e| !e.is_self_hosted()) {
                tx.update_envelope_destination(envelope.id, Some(to), &target.address, target.address_notes.as_deref())?;
                out.envelopes_updated += 1;
            }
            if own.is_empty() {
                out.needs_envelope.push((to, course));
            }

            let role = match to_host_role {
                Some(existing) => {
                    out.assignments_updated += 1;
                    Assignment {
                        max_guests: existing.max_guests + source.max_guests,
                        flex_host: existing.flex_host || source.flex_host,
                        emergency_host: existing.emergency_host || source.emergency_host,
                        self_serving: existing.self_serving && source.self_serving,
                        ..existing
                    }
                }
                None => {
                    out.assignments_created += 1;
                    Assignment {
                        event_id: plan.event_id,
                        couple_id: to,
                        course,
                        is_host: true,
                        max_guests: source.max_guests,
                        flex_host: source.flex_host,
                        emergency_host: source.emergency_host,
                        self_serving: source.self_serving,
                    }
                }
            };
            tx.upsert_assignment(&role)?;
            out.assignments_deleted += tx.delete_assignment(plan.event_id, from, course)?;
            out.mark(true);
        }

        self.refresh_host_data(tx, plan, from)?;
        self.refresh_host_data(tx, plan, to)
    }

    fn promote_host<S: MatchStore>(
        &self,
        tx: &mut S,
        plan: &MatchPlan,
        couple_id: CoupleId,
        course: Course,
        out: &mut RepairOutcome,
    ) -> RepairResult<()> {
        let course = hosted(course)?;
        active_member(tx, plan, couple_id)?;
        if hosts(tx, plan, couple_id, course)? {
            return Ok(());
        }

        let seat: Vec<PairingId> = tx
            .pairings_for_guest(plan.id, couple_id)?
            .iter()
            .filter(|p| p.course == course)
            .map(|p| p.id)
            .collect();
        out.pairings_removed += tx.delete_pairings(&seat)?;

        let envelopes: Vec<EnvelopeId> = tx
            .envelopes_for_couple(plan.id, couple_id)?
            .into_iter()
            .filter(|e| e.course == course && !e.cancelled)
            .map(|e| e.id)
            .collect();
        out.envelopes_cancelled += tx.cancel_envelopes(&envelopes)?;

        tx.upsert_assignment(&Assignment::self_host(plan.event_id, couple_id, course))?;
        out.assignments_created += 1;
        out.needs_envelope.push((couple_id, course));
        out.mark(true);

        self.refresh_host_data(tx, plan, couple_id)
    }

    /// Re-derive clue allocations and street fragments from the couple's
    /// current host roles; a couple hosting nothing ends up with none.
    fn refresh_host_data<S: MatchStore>(&self, tx: &mut S, plan: &MatchPlan, couple_id: CoupleId) -> RepairResult<()> {
        let Some(couple) = tx.couple(couple_id)? else {
            return Ok(());
        };
        let courses: Vec<Course> = tx
            .assignments_for_couple(plan.event_id, couple_id)?
            .into_iter()
            .filter(|a| a.is_host && a.course.is_hosted())
            .map(|a| a.course)
            .collect();

        let clues = ClueAllocator::new(self.clues.clone()).for_host(plan.id, &couple, &courses);
        tx.replace_course_clues(plan.id, couple.id, &clues)?;
        let info: Vec<_> = courses.iter().map(|c| street_info(plan.id, &couple, *c)).collect();
        tx.replace_street_info(plan.id, couple.id, &info)?;
        Ok(())
    }
}

fn active_plan<S: MatchStore>(tx: &S, plan_id: PlanId) -> RepairResult<MatchPlan> {
    let plan = tx.plan(plan_id)?.ok_or(RepairError::PlanNotFound(plan_id))?;
    if plan.status != PlanStatus::Active {
        return Err(RepairError::PlanNotActive(plan_id));
    }
    Ok(plan)
}

fn finish<S: MatchStore>(tx: &mut S, plan: &MatchPlan, out: &mut RepairOutcome) -> RepairResult<()> {
    out.unplaced.sort_unstable();
    out.unplaced.dedup();
    out.needs_envelope.sort_unstable();
    out.needs_envelope.dedup();

    if out.changed {
        if !tx.bump_plan_revision(plan.id, plan.revision)? {
            return Err(RepairError::Conflict {
                plan_id: plan.id,
                expected: plan.revision,
            });
        }
        out.revision = plan.revision + 1;
    }
    Ok(())
}

/// Couple of the plan's event, cancelled or not.
fn member<S: MatchStore>(tx: &S, plan: &MatchPlan, couple_id: CoupleId) -> RepairResult<Couple> {
    let couple = tx.couple(couple_id)?.ok_or(RepairError::CoupleNotFound(couple_id))?;
    if couple.event_id != plan.event_id {
        return Err(RepairError::WrongEvent {
            couple_id,
            event_id: plan.event_id,
        });
    }
    Ok(couple)
}

fn active_member<S: MatchStore>(tx: &S, plan: &MatchPlan, couple_id: CoupleId) -> RepairResult<Couple> {
    let couple = member(tx, plan, couple_id)?;
    if couple.cancelled {
        return Err(RepairError::CoupleCancelled(couple_id));
    }
    Ok(couple)
}

fn hosted(course: Course) -> RepairResult<Course> {
    if course.is_hosted() {
        Ok(course)
    } else {
        Err(RepairError::NotHostable(course))
    }
}

fn hosts<S: MatchStore>(tx: &S, plan: &MatchPlan, couple_id: CoupleId, course: Course) -> RepairResult<bool> {
    Ok(tx
        .assignments_for_couple(plan.event_id, couple_id)?
        .iter()
        .any(|a| a.course == course && a.is_host))
}

fn is_blocked<S: MatchStore>(tx: &S, plan: &MatchPlan, a: CoupleId, b: CoupleId) -> RepairResult<bool> {
    Ok(tx.blocked_pairs(plan.event_id)?.iter().any(|p| p.involves(a, b)))
}

/// Cancel envelopes pointing at `host` and drop its pairings for `courses`,
/// reporting the seated guests as unplaced.
fn release_hosting<S: MatchStore>(
    tx: &mut S,
    plan: &MatchPlan,
    host: CoupleId,
    courses: &[Course],
    out: &mut RepairOutcome,
) -> RepairResult<()> {
    let envelopes: Vec<EnvelopeId> = tx
        .envelopes_for_host(plan.id, host)?
        .into_iter()
        .filter(|e| courses.contains(&e.course))
        .map(|e| e.id)
        .collect();
    out.envelopes_cancelled += tx.cancel_envelopes(&envelopes)?;

    let pairings: Vec<_> = tx
        .pairings_for_host(plan.id, host)?
        .into_iter()
        .filter(|p| courses.contains(&p.course))
        .collect();
    out.unplaced
        .extend(pairings.iter().map(|p| (p.guest_couple_id, p.course)));
    let ids: Vec<PairingId> = pairings.iter().map(|p| p.id).collect();
    out.pairings_removed += tx.delete_pairings(&ids)?;

    out.mark(out.envelopes_cancelled > 0 || out.pairings_removed > 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::unplaced_guests;
    use crate::matching::{MatchRequest, MatchRunner};
    use crate::model::{EnvelopeState, NewCouple};
    use crate::storage::DinnerDb;
    use chrono::{Duration, TimeZone};

    fn matched(couples: usize) -> (DinnerDb, EventId, PlanId) {
        let mut db = DinnerDb::open_memory().unwrap();
        let start = Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap();
        let event = db
            .create_event("Summer hop", start, start + Duration::hours(2), start + Duration::hours(4), None)
            .unwrap();
        for i in 0..couples {
            db.add_couple(&NewCouple::new(event, format!("C{i}"), format!("Ahornweg {}", i + 1)).with_fun_fact("Juggles"))
                .unwrap();
        }
        let plan = MatchRunner::default()
            .run(&mut db, &MatchRequest::new(event))
            .unwrap()
            .plan
            .id;
        (db, event, plan)
    }

    fn host_of(db: &DinnerDb, event: EventId, course: Course) -> CoupleId {
        db.assignments_for_event(event)
            .unwrap()
            .into_iter()
            .find(|a| a.is_host && a.course == course)
            .unwrap()
            .couple_id
    }

    fn revision(db: &DinnerDb, plan: PlanId) -> i64 {
        db.plan(plan).unwrap().unwrap().revision
    }

    #[test]
    fn guest_dropout_twice_is_a_noop() {
        let (mut db, event, plan) = matched(3);
        let guest = host_of(&db, event, Course::Main);
        let repair = CascadeRepair::default();
        let mutation = Mutation::GuestDropout { couple_id: guest };

        let first = repair.apply(&mut db, plan, &mutation).unwrap();
        assert!(first.changed());
        assert!(first.couple_cancelled);
        assert_eq!(first.pairings_removed, 2);
        assert_eq!(first.envelopes_cancelled, 2);
        assert_eq!(first.revision, 1);

        let second = repair.apply(&mut db, plan, &mutation).unwrap();
        assert!(!second.changed());
        assert_eq!(second.pairings_removed, 0);
        assert_eq!(second.revision, 1);
        assert_eq!(revision(&db, plan), 1);

        // Its own hosted course is untouched.
        let live: Vec<_> = db
            .envelopes_for_host(plan, guest)
            .unwrap()
            .into_iter()
            .filter(|e| e.course == Course::Main)
            .collect();
        assert_eq!(live.len(), 3);
    }

    #[test]
    fn stale_revision_is_a_conflict() {
        let (mut db, event, plan) = matched(3);
        let guest = host_of(&db, event, Course::Starter);
        let err = CascadeRepair::default()
            .apply_at(&mut db, plan, Some(7), &Mutation::GuestDropout { couple_id: guest })
            .unwrap_err();
        assert!(matches!(err, RepairError::Conflict { expected: 7, .. }));
        assert!(!db.couple(guest).unwrap().unwrap().cancelled);
    }

    #[test]
    fn superseded_plan_is_refused() {
        let (mut db, event, old) = matched(3);
        MatchRunner::default().run(&mut db, &MatchRequest::new(event)).unwrap();
        let err = CascadeRepair::default()
            .apply(&mut db, old, &Mutation::HostDropout { couple_id: 1 })
            .unwrap_err();
        assert!(matches!(err, RepairError::PlanNotActive(p) if p == old));
    }

    #[test]
    fn failed_validation_writes_nothing() {
        let (mut db, event, plan) = matched(6);
        let guest = db
            .pairings_for_plan(plan)
            .unwrap()
            .into_iter()
            .find(|p| p.course == Course::Starter)
            .unwrap();
        let other_host = db
            .assignments_for_event(event)
            .unwrap()
            .into_iter()
            .find(|a| a.is_host && a.course == Course::Starter && a.couple_id != guest.host_couple_id)
            .unwrap()
            .couple_id;
        db.add_blocked_pair(event, guest.guest_couple_id, other_host).unwrap();

        let err = CascadeRepair::default()
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: guest.guest_couple_id,
                    course: Course::Starter,
                    new_host_couple_id: other_host,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepairError::BlockedPair(..)));
        assert_eq!(revision(&db, plan), 0);
        assert!(db.pairings_for_plan(plan).unwrap().iter().any(|p| p.id == guest.id));
    }

    #[test]
    fn reassign_rejects_non_hosts_and_hosts_of_the_course() {
        let (mut db, event, plan) = matched(3);
        let starter = host_of(&db, event, Course::Starter);
        let main = host_of(&db, event, Course::Main);
        let dessert = host_of(&db, event, Course::Dessert);
        let repair = CascadeRepair::default();

        let err = repair
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: main,
                    course: Course::Starter,
                    new_host_couple_id: dessert,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepairError::NotAHost { couple_id, course: Course::Starter } if couple_id == dessert));

        let err = repair
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: main,
                    course: Course::Main,
                    new_host_couple_id: starter,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepairError::NotAHost { .. }));

        let err = repair
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: main,
                    course: Course::Afterparty,
                    new_host_couple_id: starter,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepairError::NotHostable(Course::Afterparty)));
    }

    #[test]
    fn reassign_past_capacity_warns() {
        let (mut db, event, plan) = matched(6);
        let starters: Vec<_> = db
            .pairings_for_plan(plan)
            .unwrap()
            .into_iter()
            .filter(|p| p.course == Course::Starter)
            .collect();
        let moved = &starters[0];
        let target = starters
            .iter()
            .find(|p| p.host_couple_id != moved.host_couple_id)
            .unwrap()
            .host_couple_id;
        let seated_before = starters.iter().filter(|p| p.host_couple_id == target).count();
        assert_eq!(seated_before, 2);

        let out = CascadeRepair::default()
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: moved.guest_couple_id,
                    course: Course::Starter,
                    new_host_couple_id: target,
                },
            )
            .unwrap();
        assert_eq!(out.pairings_created, 1);
        assert_eq!(out.warnings.len(), 1);
        let warning = &out.warnings[0];
        assert_eq!(warning.kind, WarningKind::Capacity);
        assert_eq!(warning.course, Some(Course::Starter));
        assert!(warning.concerns(target, moved.guest_couple_id));

        let entry = db
            .audit_entries(event)
            .unwrap()
            .into_iter()
            .rev()
            .find(|e| e.action == "reassign")
            .unwrap();
        assert_eq!(entry.warnings, out.warnings);

        // Moving back leaves the original table within capacity.
        let back = CascadeRepair::default()
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: moved.guest_couple_id,
                    course: Course::Starter,
                    new_host_couple_id: moved.host_couple_id,
                },
            )
            .unwrap();
        assert!(back.warnings.is_empty());
    }

    #[test]
    fn promote_host_serves_itself() {
        let (mut db, event, plan) = matched(3);
        let guest = host_of(&db, event, Course::Starter);
        let repair = CascadeRepair::default();
        let mutation = Mutation::PromoteHost {
            couple_id: guest,
            course: Course::Dessert,
        };

        let out = repair.apply(&mut db, plan, &mutation).unwrap();
        assert_eq!(out.pairings_removed, 1);
        assert_eq!(out.envelopes_cancelled, 1);
        assert_eq!(out.needs_envelope, vec![(guest, Course::Dessert)]);

        let role = db
            .assignments_for_couple(event, guest)
            .unwrap()
            .into_iter()
            .find(|a| a.course == Course::Dessert)
            .unwrap();
        assert!(role.is_host && role.self_serving && !role.emergency_host);
        assert_eq!(role.max_guests, 0);

        let ids = repair.issue_envelopes(&mut db, plan, &out.needs_envelope).unwrap();
        assert_eq!(ids.len(), 1);
        let envelope = db
            .envelopes_for_couple(plan, guest)
            .unwrap()
            .into_iter()
            .find(|e| e.id == ids[0])
            .unwrap();
        assert!(envelope.is_self_hosted());
        assert_eq!(envelope.current_state, EnvelopeState::Sealed);

        assert!(!repair.apply(&mut db, plan, &mutation).unwrap().changed());
        assert!(unplaced_guests(&db, plan).unwrap().is_empty());
    }

    #[test]
    fn promoted_couple_never_receives_guests() {
        let (mut db, event, plan) = matched(6);
        let promoted = host_of(&db, event, Course::Starter);
        let repair = CascadeRepair::default();
        repair
            .apply(
                &mut db,
                plan,
                &Mutation::PromoteHost {
                    couple_id: promoted,
                    course: Course::Dessert,
                },
            )
            .unwrap();

        let dessert_guest = db
            .assignments_for_event(event)
            .unwrap()
            .into_iter()
            .find(|a| !a.is_host && a.course == Course::Dessert)
            .unwrap()
            .couple_id;
        let err = repair
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: dessert_guest,
                    course: Course::Dessert,
                    new_host_couple_id: promoted,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RepairError::NotAHost { couple_id, .. } if couple_id == promoted));

        let rematched = MatchRunner::default()
            .run(&mut db, &MatchRequest::new(event))
            .unwrap()
            .plan
            .id;
        let dessert_tables: Vec<_> = db
            .pairings_for_plan(rematched)
            .unwrap()
            .into_iter()
            .filter(|p| p.course == Course::Dessert)
            .collect();
        assert!(!dessert_tables.is_empty());
        assert!(dessert_tables.iter().all(|p| p.host_couple_id != promoted && p.guest_couple_id != promoted));
    }

    #[test]
    fn resign_host_leaves_the_couple_as_unplaced_guest() {
        let (mut db, event, plan) = matched(3);
        let host = host_of(&db, event, Course::Main);
        let out = CascadeRepair::default()
            .apply(
                &mut db,
                plan,
                &Mutation::ResignHost {
                    couple_id: host,
                    courses: vec![],
                },
            )
            .unwrap();

        assert_eq!(out.pairings_removed, 2);
        assert_eq!(out.envelopes_cancelled, 3);
        assert_eq!(out.assignments_updated, 1);
        assert_eq!(out.assignments_created, 0);
        assert_eq!(out.assignments_deleted, 0);
        assert_eq!(out.unplaced.len(), 3);
        assert!(out.unplaced.contains(&(host, Course::Main)));
        assert_eq!(db.assignments_for_couple(event, host).unwrap().len(), 3);
        assert_eq!(unplaced_guests(&db, plan).unwrap(), out.unplaced);
        assert!(db.course_clues(plan, host).unwrap().is_empty());
        assert!(db.street_info(plan, host).unwrap().is_empty());
    }

    #[test]
    fn split_reports_new_couple_until_placed() {
        let (mut db, event, plan) = matched(3);
        let original = host_of(&db, event, Course::Starter);
        let split_off = db.add_couple(&NewCouple::new(event, "Split", "Birkenweg 2")).unwrap();
        let repair = CascadeRepair::default();
        let mutation = Mutation::Split {
            couple_id: original,
            new_couple_id: split_off,
        };

        let out = repair.apply(&mut db, plan, &mutation).unwrap();
        assert_eq!(out.assignments_created, 3);
        assert_eq!(out.unplaced_couple_ids(), vec![split_off]);
        assert_eq!(out.unplaced.len(), 3);

        let again = repair.apply(&mut db, plan, &mutation).unwrap();
        assert!(!again.changed());
        assert_eq!(again.unplaced, out.unplaced);

        let main_host = host_of(&db, event, Course::Main);
        repair
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: split_off,
                    course: Course::Main,
                    new_host_couple_id: main_host,
                },
            )
            .unwrap();
        let err = repair.apply(&mut db, plan, &mutation).unwrap_err();
        assert!(matches!(err, RepairError::AlreadyPlaced(id) if id == split_off));
    }

    #[test]
    fn couples_of_other_events_are_rejected() {
        let (mut db, _, plan) = matched(3);
        let start = Utc.with_ymd_and_hms(2030, 7, 1, 18, 0, 0).unwrap();
        let other = db
            .create_event("Other", start, start + Duration::hours(2), start + Duration::hours(4), None)
            .unwrap();
        let stranger = db.add_couple(&NewCouple::new(other, "Stranger", "Elsewhere 1")).unwrap();
        let err = CascadeRepair::default()
            .apply(&mut db, plan, &Mutation::GuestDropout { couple_id: stranger })
            .unwrap_err();
        assert!(matches!(err, RepairError::WrongEvent { .. }));
    }
}
