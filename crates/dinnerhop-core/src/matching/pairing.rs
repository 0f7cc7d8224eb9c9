//! Step B: seat guests at hosts, one course at a time.
//!
//! Courses are paired in serving order so that earlier tables feed the
//! meeting history of later ones. Within a course, guests are seated
//! largest party first. For each guest the [`RELAXATION_LADDER`] is walked
//! until some step admits a host; [`best_candidate`] picks among the
//! admitted hosts. Every relaxation leaves a [`MatchWarning`].

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{
    Assignment, BlockedPair, Couple, CoupleId, Course, MatchWarning, NewPairing, WarningKind,
};

use super::constraints::{best_candidate, Candidate, HostLoad, RelaxationStep, RELAXATION_LADDER};
use super::MatchingConfig;

/// Everything Step B reads.
#[derive(Debug, Clone, Copy)]
pub struct PairingInput<'a> {
    pub couples: &'a [Couple],
    pub assignments: &'a [Assignment],
    pub blocked: &'a [BlockedPair],
    /// Courses whose pairings are carried over instead of recomputed
    pub frozen_courses: &'a BTreeSet<Course>,
    /// Carried-over pairings for the frozen courses
    pub frozen: &'a [NewPairing],
}

/// Result of Step B.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairingOutcome {
    pub pairings: Vec<NewPairing>,
    pub warnings: Vec<MatchWarning>,
    /// Guests left without a host, per course
    pub unplaced: Vec<(CoupleId, Course)>,
}

impl PairingOutcome {
    pub fn forced_count(&self) -> usize {
        self.pairings.iter().filter(|p| p.forced).count()
    }

    pub fn host_of(&self, guest: CoupleId, course: Course) -> Option<CoupleId> {
        self.pairings
            .iter()
            .find(|p| p.guest_couple_id == guest && p.course == course)
            .map(|p| p.host_couple_id)
    }
}

/// Who sat with whom in the courses paired so far.
#[derive(Debug, Default)]
struct MeetingHistory {
    /// (host, guest) visits
    visits: HashSet<(CoupleId, CoupleId)>,
    /// Unordered pair -> number of shared tables
    shared: HashMap<(CoupleId, CoupleId), u32>,
}

impl MeetingHistory {
    fn visited(&self, host: CoupleId, guest: CoupleId) -> bool {
        self.visits.contains(&(host, guest))
    }

    fn shared_tables(&self, a: CoupleId, b: CoupleId) -> u32 {
        self.shared.get(&(a.min(b), a.max(b))).copied().unwrap_or(0)
    }

    fn record_table(&mut self, host: CoupleId, guests: &[CoupleId]) {
        for &guest in guests {
            self.visits.insert((host, guest));
        }
        let members: Vec<CoupleId> = std::iter::once(host).chain(guests.iter().copied()).collect();
        for (i, &a) in members.iter().enumerate() {
            for &b in &members[i + 1..] {
                *self.shared.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
    }
}

/// Seats guest couples at hosts.
#[derive(Debug, Clone, Default)]
pub struct PairingEngine {
    config: MatchingConfig,
}

impl PairingEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn pair(&self, input: &PairingInput<'_>) -> PairingOutcome {
        let active: HashMap<CoupleId, &Couple> = input
            .couples
            .iter()
            .filter(|c| !c.cancelled)
            .map(|c| (c.id, c))
            .collect();

        let mut history = MeetingHistory::default();
        let mut outcome = PairingOutcome::default();

        for course in Course::HOSTED {
            let tables = if input.frozen_courses.contains(&course) {
                Self::carry_frozen(course, input, &active, &mut outcome)
            } else {
                self.pair_course(course, input, &active, &history, &mut outcome)
            };
            for (host, guests) in &tables {
                history.record_table(*host, guests);
            }
        }

        outcome
    }

    fn guests_of(course: Course, input: &PairingInput<'_>, active: &HashMap<CoupleId, &Couple>) -> Vec<CoupleId> {
        input
            .assignments
            .iter()
            .filter(|a| a.course == course && !a.is_host && active.contains_key(&a.couple_id))
            .map(|a| a.couple_id)
            .collect()
    }

    fn carry_frozen(
        course: Course,
        input: &PairingInput<'_>,
        active: &HashMap<CoupleId, &Couple>,
        outcome: &mut PairingOutcome,
    ) -> HashMap<CoupleId, Vec<CoupleId>> {
        let mut tables: HashMap<CoupleId, Vec<CoupleId>> = HashMap::new();
        for p in input.frozen.iter().filter(|p| {
            p.course == course
                && active.contains_key(&p.host_couple_id)
                && active.contains_key(&p.guest_couple_id)
        }) {
            tables.entry(p.host_couple_id).or_default().push(p.guest_couple_id);
            outcome.pairings.push(*p);
        }

        let seated: HashSet<CoupleId> = tables.values().flatten().copied().collect();
        let missing: Vec<CoupleId> = Self::guests_of(course, input, active)
            .into_iter()
            .filter(|g| !seated.contains(g))
            .collect();
        if !missing.is_empty() {
            outcome.warnings.push(MatchWarning::new(
                WarningKind::Unplaced,
                Some(course),
                missing.clone(),
                format!("{} guest couple(s) have no pairing in frozen course {course}", missing.len()),
            ));
            outcome.unplaced.extend(missing.into_iter().map(|g| (g, course)));
        }
        tables
    }

    fn pair_course(
        &self,
        course: Course,
        input: &PairingInput<'_>,
        active: &HashMap<CoupleId, &Couple>,
        history: &MeetingHistory,
        outcome: &mut PairingOutcome,
    ) -> HashMap<CoupleId, Vec<CoupleId>> {
        let mut hosts: Vec<HostLoad> = input
            .assignments
            .iter()
            .filter(|a| a.course == course && a.seats_guests() && active.contains_key(&a.couple_id))
            .map(HostLoad::from_assignment)
            .collect();
        hosts.sort_by_key(|h| h.couple_id);

        let mut guests: Vec<&Couple> = Self::guests_of(course, input, active)
            .into_iter()
            .filter_map(|id| active.get(&id).copied())
            .collect();
        guests.sort_by(|a, b| b.persons.cmp(&a.persons).then(a.id.cmp(&b.id)));

        let mut tables: HashMap<CoupleId, Vec<CoupleId>> =
            hosts.iter().map(|h| (h.couple_id, Vec::new())).collect();

        if hosts.is_empty() {
            if !guests.is_empty() {
                let ids: Vec<CoupleId> = guests.iter().map(|g| g.id).collect();
                tracing::warn!(course = %course, guests = ids.len(), "course has no hosts");
                outcome.warnings.push(MatchWarning::new(
                    WarningKind::Unplaced,
                    Some(course),
                    ids.clone(),
                    format!("no host for {course}"),
                ));
                outcome.unplaced.extend(ids.into_iter().map(|g| (g, course)));
            }
            return tables;
        }

        for guest in guests {
            let candidates: Vec<Candidate> = hosts
                .iter()
                .map(|h| Candidate {
                    host: h.couple_id,
                    repeat_meeting: history.visited(h.couple_id, guest.id),
                    blocked: input.blocked.iter().any(|b| b.involves(h.couple_id, guest.id)),
                    base_remaining: h.base_remaining(),
                    score: self.score(guest, h.couple_id, &tables, active, history),
                })
                .collect();

            let Some((chosen, step)) = self.choose(guest, &candidates, &hosts) else {
                continue;
            };

            if let Some(load) = hosts.iter_mut().find(|h| h.couple_id == chosen.host) {
                load.seated += guest.persons;
            }
            tables.entry(chosen.host).or_default().push(guest.id);

            if chosen.repeat_meeting {
                outcome.warnings.push(MatchWarning::new(
                    WarningKind::UniqueMeeting,
                    Some(course),
                    vec![chosen.host, guest.id],
                    format!("couple {} visits host {} again", guest.id, chosen.host),
                ));
            }
            if chosen.blocked {
                tracing::warn!(course = %course, host = chosen.host, guest = guest.id, "forced blocked pairing");
                outcome.warnings.push(MatchWarning::new(
                    WarningKind::Block,
                    Some(course),
                    vec![chosen.host, guest.id],
                    format!("blocked pair {} / {} seated together (forced)", chosen.host, guest.id),
                ));
            }
            tracing::trace!(course = %course, host = chosen.host, guest = guest.id, step = step.label, "seated");

            outcome.pairings.push(NewPairing {
                course,
                host_couple_id: chosen.host,
                guest_couple_id: guest.id,
                forced: chosen.blocked,
            });
        }

        for h in hosts.iter().filter(|h| h.over_base()) {
            outcome.warnings.push(MatchWarning::new(
                WarningKind::Capacity,
                Some(course),
                vec![h.couple_id],
                format!(
                    "host {} seats {} guest persons, capacity {}",
                    h.couple_id, h.seated, h.max_guests
                ),
            ));
        }

        tables
    }

    /// First ladder step that admits a host, and the best host it admits.
    fn choose(
        &self,
        guest: &Couple,
        candidates: &[Candidate],
        hosts: &[HostLoad],
    ) -> Option<(Candidate, RelaxationStep)> {
        for (rung, step) in RELAXATION_LADDER.iter().enumerate() {
            let admitted: Vec<Candidate> = candidates
                .iter()
                .zip(hosts)
                .filter(|(c, h)| step.admits(c, h, guest.persons, &self.config))
                .map(|(c, _)| *c)
                .collect();
            if let Some(best) = best_candidate(&admitted) {
                if rung > 0 {
                    tracing::debug!(guest = guest.id, host = best.host, step = step.label, "relaxed pairing constraints");
                }
                return Some((*best, *step));
            }
        }
        None
    }

    /// Distance to the host plus a penalty per earlier shared table with
    /// anyone already at it.
    fn score(
        &self,
        guest: &Couple,
        host: CoupleId,
        tables: &HashMap<CoupleId, Vec<CoupleId>>,
        active: &HashMap<CoupleId, &Couple>,
        history: &MeetingHistory,
    ) -> f64 {
        let distance = active
            .get(&host)
            .and_then(|h| h.coordinates)
            .zip(guest.coordinates)
            .map_or(0.0, |(h, g)| g.haversine_km(&h));

        let table = tables.get(&host).map(Vec::as_slice).unwrap_or_default();
        let repeats: u32 = std::iter::once(&host)
            .chain(table)
            .map(|&m| history.shared_tables(guest.id, m))
            .sum();

        self.config.distance_weight * distance + self.config.co_attendance_weight * f64::from(repeats)
    }
}
