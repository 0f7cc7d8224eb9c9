//! Step A: host-course assignment.
//!
//! Host counts are balanced across the three courses (`n / 3` each, the
//! remainder going to the most wished-for courses). Couples with a
//! preference get their course while it still has open host slots; the
//! rest fill whichever course is furthest below its target, then
//! whichever has the largest gap between guest demand and seats.
//!
//! Existing assignments are kept untouched. Only couples that have none
//! yet are placed, on top of the existing host counts.

use std::collections::{HashMap, HashSet};

use crate::model::{Assignment, Couple, CoupleId, Course, EventId, MatchWarning, WarningKind};

use super::MatchingConfig;

/// Outcome of Step A.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    /// Every assignment of the event's active couples, reused and new
    pub assignments: Vec<Assignment>,
    /// The subset created by this run
    pub created: Vec<Assignment>,
    /// Fraction of couples with a preference that host that course
    pub satisfaction: f64,
    pub warnings: Vec<MatchWarning>,
}

impl RoleAssignment {
    /// Courses `couple_id` hosts.
    pub fn host_courses(&self, couple_id: CoupleId) -> Vec<Course> {
        self.assignments
            .iter()
            .filter(|a| a.couple_id == couple_id && a.is_host)
            .map(|a| a.course)
            .collect()
    }
}

/// Running per-course tallies.
#[derive(Debug, Default, Clone, Copy)]
struct CourseTally {
    target: usize,
    hosts: usize,
    seats: u32,
    host_persons: u32,
}

impl CourseTally {
    fn free(&self) -> usize {
        self.target.saturating_sub(self.hosts)
    }

    /// Guest persons this course must seat minus the seats it has.
    fn gap(&self, total_persons: u32) -> i64 {
        i64::from(total_persons) - i64::from(self.host_persons) - i64::from(self.seats)
    }
}

/// Assigns host courses to couples.
#[derive(Debug, Clone, Default)]
pub struct RoleAssignmentEngine {
    config: MatchingConfig,
}

impl RoleAssignmentEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn assign(&self, event_id: EventId, couples: &[Couple], existing: &[Assignment]) -> RoleAssignment {
        let mut active: Vec<&Couple> = couples
            .iter()
            .filter(|c| !c.cancelled && c.event_id == event_id)
            .collect();
        active.sort_by_key(|c| c.id);

        let persons: HashMap<CoupleId, u32> = active.iter().map(|c| (c.id, c.persons)).collect();
        let total_persons: u32 = persons.values().sum();

        let kept: Vec<Assignment> = existing
            .iter()
            .filter(|a| persons.contains_key(&a.couple_id) && a.course.is_hosted())
            .cloned()
            .collect();
        let placed: HashSet<CoupleId> = kept.iter().map(|a| a.couple_id).collect();

        let mut tally = [CourseTally::default(); 3];
        for (course, target) in self.targets(&active) {
            tally[course.index()].target = target;
        }
        for a in kept.iter().filter(|a| a.is_host) {
            let t = &mut tally[a.course.index()];
            t.host_persons += persons.get(&a.couple_id).copied().unwrap_or(0);
            // Not a table: needs no seat and offers none.
            if a.self_serving {
                continue;
            }
            t.hosts += 1;
            t.seats += a.max_guests;
        }

        let newcomers: Vec<&Couple> = active
            .iter()
            .copied()
            .filter(|c| !placed.contains(&c.id))
            .collect();

        let mut chosen: HashMap<CoupleId, Course> = HashMap::new();

        // Preferences first, while the preferred course has open slots.
        for couple in &newcomers {
            if let Some(pref) = couple.course_preference.filter(|c| c.is_hosted()) {
                if tally[pref.index()].free() > 0 {
                    self.take(&mut tally, couple, pref);
                    chosen.insert(couple.id, pref);
                }
            }
        }

        for couple in &newcomers {
            if chosen.contains_key(&couple.id) {
                continue;
            }
            let course = Self::neediest_course(&tally, total_persons, couple.course_preference);
            self.take(&mut tally, couple, course);
            chosen.insert(couple.id, course);
        }

        let mut created = Vec::with_capacity(newcomers.len() * 3);
        for couple in &newcomers {
            let Some(host_course) = chosen.get(&couple.id).copied() else {
                continue;
            };
            for course in Course::HOSTED {
                if course == host_course {
                    created.push(Assignment {
                        event_id,
                        couple_id: couple.id,
                        course,
                        is_host: true,
                        max_guests: self.capacity_of(couple),
                        flex_host: couple.flex_host,
                        emergency_host: couple.emergency_host,
                        self_serving: false,
                    });
                } else {
                    created.push(Assignment::guest(event_id, couple.id, course));
                }
            }
        }

        let mut assignments: Vec<Assignment> = kept.into_iter().chain(created.iter().cloned()).collect();
        assignments.sort_by_key(|a| (a.couple_id, a.course));

        let (satisfaction, warnings) = Self::preference_report(&active, &assignments);

        RoleAssignment {
            assignments,
            created,
            satisfaction,
            warnings,
        }
    }

    fn take(&self, tally: &mut [CourseTally; 3], couple: &Couple, course: Course) {
        let t = &mut tally[course.index()];
        t.hosts += 1;
        t.seats += self.capacity_of(couple);
        t.host_persons += couple.persons;
    }

    fn capacity_of(&self, couple: &Couple) -> u32 {
        couple.max_guests.unwrap_or(self.config.default_max_guests)
    }

    /// Balanced host targets; the remainder goes to the most preferred courses.
    fn targets(&self, active: &[&Couple]) -> Vec<(Course, usize)> {
        let n = active.len();
        let mut demand = [0usize; 3];
        for c in active {
            if let Some(p) = c.course_preference.filter(|c| c.is_hosted()) {
                demand[p.index()] += 1;
            }
        }

        let mut by_demand = Course::HOSTED;
        by_demand.sort_by(|a, b| demand[b.index()].cmp(&demand[a.index()]).then(a.cmp(b)));

        Course::HOSTED
            .iter()
            .map(|course| {
                let bonus = by_demand
                    .iter()
                    .position(|c| c == course)
                    .map_or(0, |rank| usize::from(rank < n % 3));
                (*course, n / 3 + bonus)
            })
            .collect()
    }

    /// Course furthest below target, then with the largest capacity gap.
    fn neediest_course(tally: &[CourseTally; 3], total_persons: u32, preference: Option<Course>) -> Course {
        Course::HOSTED
            .iter()
            .copied()
            .max_by(|a, b| {
                let (ta, tb) = (&tally[a.index()], &tally[b.index()]);
                ta.free()
                    .cmp(&tb.free())
                    .then(ta.gap(total_persons).cmp(&tb.gap(total_persons)))
                    .then((preference == Some(*a)).cmp(&(preference == Some(*b))))
                    .then(b.cmp(a))
            })
            .unwrap_or(Course::Main)
    }

    fn preference_report(active: &[&Couple], assignments: &[Assignment]) -> (f64, Vec<MatchWarning>) {
        let mut wanted = 0usize;
        let mut granted = 0usize;
        let mut warnings = Vec::new();

        for couple in active {
            let Some(pref) = couple.course_preference.filter(|c| c.is_hosted()) else {
                continue;
            };
            wanted += 1;
            let hosts_pref = assignments
                .iter()
                .any(|a| a.couple_id == couple.id && a.is_host && a.course == pref);
            if hosts_pref {
                granted += 1;
            } else {
                warnings.push(MatchWarning::new(
                    WarningKind::Preference,
                    Some(pref),
                    vec![couple.id],
                    format!("{} wanted to host {pref}", couple.name),
                ));
            }
        }

        let satisfaction = if wanted == 0 {
            1.0
        } else {
            granted as f64 / wanted as f64
        };
        (satisfaction, warnings)
    }
}
