//! Integration tests for cascade repair against a committed plan.
//!
//! Each test registers couples in an in-memory database, runs a full
//! matching, and then applies mutations through `CascadeRepair`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;

use dinnerhop_core::{
    unplaced_guests, CascadeRepair, CoupleId, Course, DinnerDb, Envelope, EventId, MatchRequest, MatchRunner,
    MatchStore, Mutation, NewCouple, PlanId,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 9, 14, 18, 0, 0).unwrap()
}

/// Couple `i` lives `i` hundredths of a degree north of the first one.
fn matched_event(couples: usize) -> (DinnerDb, EventId, PlanId) {
    let mut db = DinnerDb::open_memory().unwrap();
    let event = db
        .create_event("Autumn hop", start(), start() + Duration::hours(2), start() + Duration::hours(4), None)
        .unwrap();
    for i in 0..couples {
        db.add_couple(
            &NewCouple::new(event, format!("Couple {i}"), format!("Lindenallee {}", i + 1))
                .with_coordinates(52.50 + i as f64 * 0.01, 13.40)
                .with_fun_fact(format!("Has {i} cats")),
        )
        .unwrap();
    }
    let report = MatchRunner::default().run(&mut db, &MatchRequest::new(event)).unwrap();
    (db, event, report.plan.id)
}

fn hosts_of(db: &DinnerDb, event: EventId, course: Course) -> Vec<CoupleId> {
    db.assignments_for_event(event)
        .unwrap()
        .into_iter()
        .filter(|a| a.is_host && a.course == course)
        .map(|a| a.couple_id)
        .collect()
}

fn guests_of(db: &DinnerDb, plan: PlanId, host: CoupleId, course: Course) -> Vec<CoupleId> {
    let mut guests: Vec<_> = db
        .pairings_for_host(plan, host)
        .unwrap()
        .into_iter()
        .filter(|p| p.course == course)
        .map(|p| p.guest_couple_id)
        .collect();
    guests.sort_unstable();
    guests
}

fn live_envelope(db: &DinnerDb, plan: PlanId, couple: CoupleId, course: Course) -> Option<Envelope> {
    db.envelopes_for_couple(plan, couple)
        .unwrap()
        .into_iter()
        .find(|e| e.course == course && !e.cancelled)
}

/// Pairings and live envelopes, reduced to comparable tuples.
fn snapshot(db: &DinnerDb, plan: PlanId) -> (BTreeSet<(Course, CoupleId, CoupleId)>, BTreeSet<(i64, bool)>) {
    let pairings = db
        .pairings_for_plan(plan)
        .unwrap()
        .into_iter()
        .map(|p| (p.course, p.host_couple_id, p.guest_couple_id))
        .collect();
    let envelopes = db
        .envelopes_for_plan(plan)
        .unwrap()
        .into_iter()
        .map(|e| (e.id, e.cancelled))
        .collect();
    (pairings, envelopes)
}

#[test]
fn host_dropout_unplaces_exactly_its_guests() {
    let (mut db, event, plan) = matched_event(6);
    let host = hosts_of(&db, event, Course::Main)[0];
    let guests = guests_of(&db, plan, host, Course::Main);
    assert_eq!(guests.len(), 2);
    let guest_envelopes: Vec<_> = guests
        .iter()
        .map(|g| live_envelope(&db, plan, *g, Course::Main).unwrap().id)
        .collect();

    let out = CascadeRepair::default()
        .apply(&mut db, plan, &Mutation::HostDropout { couple_id: host })
        .unwrap();

    assert_eq!(out.unplaced_couple_ids(), guests);
    assert!(out.unplaced.iter().all(|(_, course)| *course == Course::Main));
    assert_eq!(out.pairings_removed, 2);
    // two guest envelopes plus the host's own
    assert_eq!(out.envelopes_cancelled, 3);
    assert_eq!(out.assignments_deleted, 1);

    let envelopes = db.envelopes_for_plan(plan).unwrap();
    for id in guest_envelopes {
        assert!(envelopes.iter().find(|e| e.id == id).unwrap().cancelled);
    }
    assert!(guests_of(&db, plan, host, Course::Main).is_empty());
    assert!(!db
        .assignments_for_couple(event, host)
        .unwrap()
        .iter()
        .any(|a| a.is_host));
    assert!(db.course_clues(plan, host).unwrap().is_empty());

    assert_eq!(unplaced_guests(&db, plan).unwrap(), out.unplaced);
}

#[test]
fn transfer_host_moves_role_pairings_and_envelopes() {
    let (mut db, event, plan) = matched_event(4);
    // Four couples: two starter hosts with one guest each.
    let starter_hosts = hosts_of(&db, event, Course::Starter);
    assert_eq!(starter_hosts.len(), 2);
    let from = starter_hosts
        .iter()
        .copied()
        .find(|h| guests_of(&db, plan, *h, Course::Starter).len() == 1)
        .unwrap();
    let guest = guests_of(&db, plan, from, Course::Starter)[0];
    let to = db
        .couples_for_event(event)
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .find(|c| *c != from && *c != guest && !starter_hosts.contains(c))
        .unwrap();
    let from_capacity = db
        .assignments_for_couple(event, from)
        .unwrap()
        .into_iter()
        .find(|a| a.course == Course::Starter)
        .unwrap()
        .max_guests;

    let out = CascadeRepair::default()
        .apply(
            &mut db,
            plan,
            &Mutation::TransferHost {
                couple_id: from,
                to_couple_id: to,
                courses: vec![Course::Starter],
            },
        )
        .unwrap();
    assert_eq!(out.assignments_created, 1);
    assert_eq!(out.pairings_repointed, 1);

    assert_eq!(guests_of(&db, plan, to, Course::Starter), vec![guest]);
    let target = db.couple(to).unwrap().unwrap();
    let envelope = live_envelope(&db, plan, guest, Course::Starter).unwrap();
    assert_eq!(envelope.host_couple_id, Some(to));
    assert_eq!(envelope.destination_address, target.address);

    let from_roles = db.assignments_for_couple(event, from).unwrap();
    assert!(!from_roles.iter().any(|a| a.course == Course::Starter));
    let to_role = db
        .assignments_for_couple(event, to)
        .unwrap()
        .into_iter()
        .find(|a| a.course == Course::Starter)
        .unwrap();
    assert!(to_role.is_host);
    assert_eq!(to_role.max_guests, from_capacity);

    // The new host no longer travels for the starter.
    assert!(db
        .pairings_for_guest(plan, to)
        .unwrap()
        .iter()
        .all(|p| p.course != Course::Starter));
    assert!(live_envelope(&db, plan, to, Course::Starter)
        .unwrap()
        .is_self_hosted());
    assert!(live_envelope(&db, plan, from, Course::Starter).is_none());

    // Repeating the transfer changes nothing.
    let again = CascadeRepair::default()
        .apply(
            &mut db,
            plan,
            &Mutation::TransferHost {
                couple_id: from,
                to_couple_id: to,
                courses: vec![Course::Starter],
            },
        )
        .unwrap();
    assert!(!again.changed());
}

#[test]
fn address_change_updates_every_envelope_of_the_host() {
    let (mut db, event, plan) = matched_event(3);
    let host = hosts_of(&db, event, Course::Dessert)[0];
    let before = db.envelopes_for_host(plan, host).unwrap();
    assert_eq!(before.len(), 3);
    let pairings_before = db.pairings_for_plan(plan).unwrap();

    let mutation = Mutation::AddressChange {
        couple_id: host,
        address: "Kastanienallee 5, 10435 Berlin".to_string(),
        notes: Some("Hinterhof".to_string()),
        coordinates: None,
    };
    let out = CascadeRepair::default().apply(&mut db, plan, &mutation).unwrap();
    assert_eq!(out.envelopes_updated, 3);
    assert!(out.couple_updated);

    let after = db.envelopes_for_host(plan, host).unwrap();
    assert_eq!(after.len(), 3);
    for e in &after {
        assert_eq!(e.destination_address, "Kastanienallee 5, 10435 Berlin");
        assert_eq!(e.destination_notes.as_deref(), Some("Hinterhof"));
        let old = before.iter().find(|b| b.id == e.id).unwrap();
        assert_eq!(old.schedule, e.schedule);
    }
    assert_eq!(db.pairings_for_plan(plan).unwrap(), pairings_before);

    let info = db.street_info(plan, host).unwrap();
    assert_eq!(info[0].street, "Kastanienallee");
    assert_eq!(info[0].house_number.as_deref(), Some("5"));

    let moved = db.couple(host).unwrap().unwrap();
    assert!(moved.coordinates.is_none());

    let again = CascadeRepair::default().apply(&mut db, plan, &mutation).unwrap();
    assert!(!again.changed());
    assert_eq!(again.envelopes_updated, 0);

    // Only envelopes whose destination differs count as updated.
    let notes_only = Mutation::AddressChange {
        couple_id: host,
        address: "Kastanienallee 5, 10435 Berlin".to_string(),
        notes: None,
        coordinates: None,
    };
    let out = CascadeRepair::default().apply(&mut db, plan, &notes_only).unwrap();
    assert!(out.changed());
    assert_eq!(out.envelopes_updated, 3);
}

#[test]
fn reassign_twice_equals_once() {
    let (mut db, event, plan) = matched_event(6);
    let starter_hosts = hosts_of(&db, event, Course::Starter);
    let (old_host, new_host) = (starter_hosts[0], starter_hosts[1]);
    let guest = guests_of(&db, plan, old_host, Course::Starter)[0];
    let repair = CascadeRepair::default();
    let mutation = Mutation::Reassign {
        couple_id: guest,
        course: Course::Starter,
        new_host_couple_id: new_host,
    };

    let first = repair.apply(&mut db, plan, &mutation).unwrap();
    assert_eq!(first.pairings_created, 1);
    assert_eq!(first.pairings_removed, 1);
    assert_eq!(first.envelopes_cancelled, 1);
    assert_eq!(first.needs_envelope, vec![(guest, Course::Starter)]);
    assert!(live_envelope(&db, plan, guest, Course::Starter).is_none());
    let once = snapshot(&db, plan);
    let revision = db.plan(plan).unwrap().unwrap().revision;

    let second = repair.apply(&mut db, plan, &mutation).unwrap();
    assert!(!second.changed());
    assert_eq!(snapshot(&db, plan), once);
    assert_eq!(db.plan(plan).unwrap().unwrap().revision, revision);

    // A fresh envelope with timing for the new host survives a repeat.
    repair.issue_envelopes(&mut db, plan, &first.needs_envelope).unwrap();
    let envelope = live_envelope(&db, plan, guest, Course::Starter).unwrap();
    assert_eq!(envelope.host_couple_id, Some(new_host));
    assert!(envelope.schedule.is_ordered());
    assert!(envelope.cycling_distance_km.is_some());

    let issued = snapshot(&db, plan);
    let third = repair.apply(&mut db, plan, &mutation).unwrap();
    assert!(third.needs_envelope.is_empty());
    assert_eq!(snapshot(&db, plan), issued);
}

#[test]
fn dropped_out_guests_never_stay_paired() {
    let (mut db, event, plan) = matched_event(9);
    let repair = CascadeRepair::default();
    let dessert_hosts = hosts_of(&db, event, Course::Dessert);
    let leaving = guests_of(&db, plan, dessert_hosts[0], Course::Dessert);

    for couple_id in &leaving {
        repair
            .apply(&mut db, plan, &Mutation::GuestDropout { couple_id: *couple_id })
            .unwrap();
    }

    let cancelled: BTreeSet<CoupleId> = db
        .couples_for_event(event)
        .unwrap()
        .into_iter()
        .filter(|c| c.cancelled)
        .map(|c| c.id)
        .collect();
    assert_eq!(cancelled.len(), leaving.len());
    for p in db.pairings_for_plan(plan).unwrap() {
        assert!(!cancelled.contains(&p.guest_couple_id));
    }
    for e in db.envelopes_for_plan(plan).unwrap() {
        if cancelled.contains(&e.couple_id) && !e.is_self_hosted() {
            assert!(e.cancelled);
        }
    }
    assert!(unplaced_guests(&db, plan).unwrap().is_empty());
    assert_eq!(db.plan(plan).unwrap().unwrap().revision, leaving.len() as i64);
}

#[test]
fn host_dropout_then_reassign_restores_full_placement() {
    let (mut db, event, plan) = matched_event(6);
    let repair = CascadeRepair::default();
    let main_hosts = hosts_of(&db, event, Course::Main);
    let (leaving, remaining) = (main_hosts[0], main_hosts[1]);

    let out = repair
        .apply(&mut db, plan, &Mutation::HostDropout { couple_id: leaving })
        .unwrap();
    for (guest, course) in out.unplaced.clone() {
        let placed = repair
            .apply(
                &mut db,
                plan,
                &Mutation::Reassign {
                    couple_id: guest,
                    course,
                    new_host_couple_id: remaining,
                },
            )
            .unwrap();
        repair.issue_envelopes(&mut db, plan, &placed.needs_envelope).unwrap();
    }

    assert!(unplaced_guests(&db, plan).unwrap().is_empty());
    assert_eq!(guests_of(&db, plan, remaining, Course::Main).len(), 4);

    let audit = db.audit_entries(event).unwrap();
    let actions: Vec<_> = audit.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions.first(), Some(&"run_matching"));
    assert!(actions.contains(&"host_dropout"));
    assert_eq!(actions.iter().filter(|a| **a == "reassign").count(), 2);
    assert_eq!(actions.iter().filter(|a| **a == "issue_envelopes").count(), 2);
}
