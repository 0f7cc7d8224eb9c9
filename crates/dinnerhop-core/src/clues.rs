//! "Guess who's coming" clues and street reveal fragments.
//!
//! A host's clue pool is its distinct fun facts followed by one age clue
//! per known birth year. Each course the host serves gets
//! `clues_per_course` slots. Facts are dealt out without repeats while the
//! pool lasts; a smaller pool is reused round-robin.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{Couple, CoupleId, Course, PlanId};

/// Clue allocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClueConfig {
    #[serde(default = "default_clues_per_course")]
    pub clues_per_course: usize,
}

fn default_clues_per_course() -> usize {
    2
}

impl Default for ClueConfig {
    fn default() -> Self {
        Self {
            clues_per_course: default_clues_per_course(),
        }
    }
}

/// One revealable fact about a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClueItem {
    FunFact(String),
    BirthYear(i32),
}

/// Clue indices allocated to one host for one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseClues {
    pub plan_id: PlanId,
    pub host_couple_id: CoupleId,
    pub course: Course,
    /// Indices into the host's [`clue_pool`]
    pub indices: Vec<usize>,
}

/// Address fragments revealed at the street and number stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetInfo {
    pub plan_id: PlanId,
    pub host_couple_id: CoupleId,
    pub course: Course,
    pub street: String,
    pub house_number: Option<String>,
    /// Remainder after the first comma (postcode, city)
    pub locality: Option<String>,
}

/// Distinct clue items for a couple, in a stable order.
pub fn clue_pool(couple: &Couple) -> Vec<ClueItem> {
    let mut seen = HashSet::new();
    let mut pool: Vec<ClueItem> = couple
        .fun_facts
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty() && seen.insert(f.to_lowercase()))
        .map(|f| ClueItem::FunFact(f.to_string()))
        .collect();
    pool.extend(couple.birth_years.iter().map(|y| ClueItem::BirthYear(*y)));
    pool
}

/// Spreads a host's clue pool over the courses it serves.
#[derive(Debug, Clone, Default)]
pub struct ClueAllocator {
    config: ClueConfig,
}

impl ClueAllocator {
    pub fn new(config: ClueConfig) -> Self {
        Self { config }
    }

    /// Index sets per course, for a pool of `pool_len` items.
    ///
    /// Courses are processed in serving order. With `pool_len` at least the
    /// number of slots, every index appears at most once overall; otherwise
    /// indices cycle, and no course repeats an index unless the pool is
    /// smaller than one course's slots.
    pub fn allocate(&self, pool_len: usize, courses: &[Course]) -> Vec<(Course, Vec<usize>)> {
        let mut courses: Vec<Course> = courses.iter().copied().filter(|c| c.is_hosted()).collect();
        courses.sort();
        courses.dedup();

        let slots = self.config.clues_per_course;
        courses
            .iter()
            .enumerate()
            .map(|(i, course)| {
                let indices = if pool_len == 0 {
                    Vec::new()
                } else {
                    let take = slots.min(pool_len);
                    (0..take).map(|j| (i * slots + j) % pool_len).collect()
                };
                (*course, indices)
            })
            .collect()
    }

    /// Allocation records for one host in one plan.
    pub fn for_host(&self, plan_id: PlanId, host: &Couple, courses: &[Course]) -> Vec<CourseClues> {
        let pool_len = clue_pool(host).len();
        self.allocate(pool_len, courses)
            .into_iter()
            .map(|(course, indices)| CourseClues {
                plan_id,
                host_couple_id: host.id,
                course,
                indices,
            })
            .collect()
    }
}

/// Split "Street 12, 12345 City" or "12 Street, City" into fragments.
pub fn split_address(address: &str) -> (String, Option<String>, Option<String>) {
    let (head, locality) = match address.split_once(',') {
        Some((head, rest)) => {
            let rest = rest.trim();
            (head.trim(), (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (address.trim(), None),
    };

    let tokens: Vec<&str> = head.split_whitespace().collect();
    let is_number = |t: &str| t.chars().next().is_some_and(|c| c.is_ascii_digit());

    match tokens.as_slice() {
        [] => (String::new(), None, locality),
        [only] => (only.to_string(), None, locality),
        [rest @ .., last] if is_number(*last) => (rest.join(" "), Some(last.to_string()), locality),
        [first, rest @ ..] if is_number(*first) => (rest.join(" "), Some(first.to_string()), locality),
        _ => (tokens.join(" "), None, locality),
    }
}

/// Street reveal fragments for one host and course.
pub fn street_info(plan_id: PlanId, host: &Couple, course: Course) -> StreetInfo {
    let (street, house_number, locality) = split_address(&host.address);
    StreetInfo {
        plan_id,
        host_couple_id: host.id,
        course,
        street,
        house_number,
        locality,
    }
}
