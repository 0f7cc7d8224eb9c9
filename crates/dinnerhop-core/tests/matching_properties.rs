//! Property tests for Step A, Step B and envelope timing.
//!
//! Couple sets are generated in memory; no storage is involved.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

use dinnerhop_core::matching::{PairingEngine, PairingInput, RoleAssignmentEngine};
use dinnerhop_core::timing::{OffsetOverride, StageOffsets, MAX_OFFSET_MINUTES};
use dinnerhop_core::{
    BlockedPair, Coordinates, Couple, CoupleId, Course, EnvelopeTimingCalculator, EventTiming, TravelLeg,
    WarningKind,
};

#[derive(Debug, Clone)]
struct Registration {
    persons: u32,
    preference: Option<Course>,
    max_guests: Option<u32>,
    flex: bool,
    emergency: bool,
    lat_offset: u8,
}

fn arb_registration() -> impl Strategy<Value = Registration> {
    (
        1u32..=2,
        prop_oneof![
            Just(None),
            Just(Some(Course::Starter)),
            Just(Some(Course::Main)),
            Just(Some(Course::Dessert)),
        ],
        prop_oneof![Just(None), (0u32..=6).prop_map(Some)],
        any::<bool>(),
        any::<bool>(),
        0u8..50,
    )
        .prop_map(|(persons, preference, max_guests, flex, emergency, lat_offset)| Registration {
            persons,
            preference,
            max_guests,
            flex,
            emergency,
            lat_offset,
        })
}

fn couples_from(registrations: &[Registration]) -> Vec<Couple> {
    registrations
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let id = i as CoupleId + 1;
            Couple {
                id,
                event_id: 1,
                name: format!("Couple {id}"),
                persons: r.persons,
                address: format!("Weg {id}"),
                address_notes: None,
                coordinates: Some(Coordinates::new(52.4 + f64::from(r.lat_offset) * 0.005, 13.4)),
                course_preference: r.preference,
                allergies: vec![],
                fun_facts: vec![],
                birth_years: vec![],
                max_guests: r.max_guests,
                flex_host: r.flex,
                emergency_host: r.emergency,
                cancelled: false,
                created_at: Utc::now(),
            }
        })
        .collect()
}

fn blocked_from(pairs: &[(usize, usize)], n: usize) -> Vec<BlockedPair> {
    pairs
        .iter()
        .map(|(a, b)| (a % n, b % n))
        .filter(|(a, b)| a != b)
        .map(|(a, b)| BlockedPair::new(1, a as CoupleId + 1, b as CoupleId + 1))
        .collect()
}

/// Mostly realistic offsets, sometimes far outside any sane range.
fn offset() -> impl Strategy<Value = i64> {
    prop_oneof![4 => -30i64..400, 1 => any::<i64>()]
}

proptest! {
    #[test]
    fn every_couple_hosts_exactly_once(registrations in prop::collection::vec(arb_registration(), 3..20)) {
        let couples = couples_from(&registrations);
        let roles = RoleAssignmentEngine::default().assign(1, &couples, &[]);

        for c in &couples {
            let mine: Vec<_> = roles.assignments.iter().filter(|a| a.couple_id == c.id).collect();
            prop_assert_eq!(mine.len(), 3);
            prop_assert_eq!(mine.iter().filter(|a| a.is_host).count(), 1);
        }

        let mut hosts = [0usize; 3];
        for a in roles.assignments.iter().filter(|a| a.is_host) {
            hosts[a.course.index()] += 1;
        }
        let spread = hosts.iter().max().unwrap() - hosts.iter().min().unwrap();
        prop_assert!(spread <= 1, "host counts {:?}", hosts);
        prop_assert!((0.0..=1.0).contains(&roles.satisfaction));
    }

    #[test]
    fn pairing_respects_capacity_meetings_and_blocks(
        registrations in prop::collection::vec(arb_registration(), 3..20),
        raw_blocks in prop::collection::vec((0usize..20, 0usize..20), 0..4),
    ) {
        let couples = couples_from(&registrations);
        let blocked = blocked_from(&raw_blocks, couples.len());
        let roles = RoleAssignmentEngine::default().assign(1, &couples, &[]);
        let outcome = PairingEngine::default().pair(&PairingInput {
            couples: &couples,
            assignments: &roles.assignments,
            blocked: &blocked,
            frozen_courses: &BTreeSet::new(),
            frozen: &[],
        });

        let persons: HashMap<CoupleId, u32> = couples.iter().map(|c| (c.id, c.persons)).collect();

        // Every guest seat is filled; each course has a host here.
        let guest_seats = roles.assignments.iter().filter(|a| !a.is_host).count();
        prop_assert_eq!(outcome.pairings.len(), guest_seats);
        prop_assert!(outcome.unplaced.is_empty());

        // Capacity: over-full hosts carry a capacity warning.
        let mut seated: HashMap<(CoupleId, Course), u32> = HashMap::new();
        for p in &outcome.pairings {
            *seated.entry((p.host_couple_id, p.course)).or_default() += persons[&p.guest_couple_id];
        }
        for a in roles.assignments.iter().filter(|a| a.is_host) {
            let load = seated.get(&(a.couple_id, a.course)).copied().unwrap_or(0);
            if load > a.max_guests {
                let has_capacity_warning = outcome.warnings.iter().any(|w| {
                    w.kind == WarningKind::Capacity
                        && w.course == Some(a.course)
                        && w.couple_ids.contains(&a.couple_id)
                });
                prop_assert!(has_capacity_warning);
            }
        }

        // Unique meeting: a (host, guest) pair repeats only with a warning.
        let mut meetings: HashMap<(CoupleId, CoupleId), usize> = HashMap::new();
        for p in &outcome.pairings {
            *meetings.entry((p.host_couple_id, p.guest_couple_id)).or_default() += 1;
        }
        for ((host, guest), count) in meetings {
            if count > 1 {
                prop_assert!(outcome
                    .warnings
                    .iter()
                    .any(|w| w.kind == WarningKind::UniqueMeeting && w.concerns(host, guest)));
            }
        }

        // Blocked pairs are only ever seated forced and flagged.
        for p in &outcome.pairings {
            if blocked.iter().any(|b| b.involves(p.host_couple_id, p.guest_couple_id)) {
                prop_assert!(p.forced);
                prop_assert!(outcome
                    .warnings
                    .iter()
                    .any(|w| w.kind == WarningKind::Block && w.concerns(p.host_couple_id, p.guest_couple_id)));
            }
        }
    }

    #[test]
    fn reveal_schedule_is_always_ordered(
        teasing in offset(),
        clue_1 in offset(),
        clue_2 in offset(),
        street in offset(),
        number in offset(),
        override_street in prop::option::of(offset()),
        travel in prop::option::of(0.0f64..180.0),
        enabled in any::<bool>(),
        lead in prop_oneof![0.0f64..3.0, 0.0f64..1e12],
        cap in prop_oneof![-10i64..120, any::<i64>()],
    ) {
        let mut timing = EventTiming {
            offsets: StageOffsets { teasing, clue_1, clue_2, street, number },
            distance_adjustment_enabled: enabled,
            lead_per_travel_minute: lead,
            max_adjustment_minutes: cap,
            ..EventTiming::default()
        };
        timing.course_overrides.insert(
            Course::Main,
            OffsetOverride { street: override_street, ..OffsetOverride::default() },
        );
        let calc = EnvelopeTimingCalculator::new(timing);
        let start = Utc.with_ymd_and_hms(2030, 3, 1, 19, 0, 0).unwrap();
        let leg = travel.map(|minutes| TravelLeg {
            distance_km: minutes / 4.0,
            duration_minutes: minutes,
            estimated: true,
        });

        for course in [Course::Starter, Course::Main, Course::Dessert, Course::Afterparty] {
            let schedule = calc.schedule(course, start, leg.as_ref());
            prop_assert!(schedule.is_ordered(), "{:?}", schedule);
            prop_assert_eq!(schedule.opened_at, start);
            prop_assert!(schedule.teasing_at >= start - Duration::minutes(MAX_OFFSET_MINUTES));
        }
    }
}

#[test]
fn three_couples_meet_everyone_once() {
    let registrations: Vec<Registration> = (0..3)
        .map(|i| Registration {
            persons: 2,
            preference: None,
            max_guests: None,
            flex: false,
            emergency: false,
            lat_offset: i,
        })
        .collect();
    let couples = couples_from(&registrations);
    let roles = RoleAssignmentEngine::default().assign(1, &couples, &[]);
    let outcome = PairingEngine::default().pair(&PairingInput {
        couples: &couples,
        assignments: &roles.assignments,
        blocked: &[],
        frozen_courses: &BTreeSet::new(),
        frozen: &[],
    });

    for course in Course::HOSTED {
        let hosts: Vec<_> = roles
            .assignments
            .iter()
            .filter(|a| a.is_host && a.course == course)
            .collect();
        assert_eq!(hosts.len(), 1);
        let guests: BTreeSet<CoupleId> = outcome
            .pairings
            .iter()
            .filter(|p| p.course == course)
            .inspect(|p| assert_eq!(p.host_couple_id, hosts[0].couple_id))
            .map(|p| p.guest_couple_id)
            .collect();
        assert_eq!(guests.len(), 2);
        assert!(!guests.contains(&hosts[0].couple_id));
    }
    assert!(outcome.warnings.is_empty());
}
