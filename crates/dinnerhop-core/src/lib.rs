//! # Dinnerhop Core Library
//!
//! This library provides the matching and repair logic for a progressive
//! dinner ("running dinner"): couples host one course at home and visit two
//! other couples for the remaining courses. It follows a CLI-first
//! philosophy where every operation is available through the standalone
//! `dinnerhop` binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Matching**: Step A assigns host courses, Step B seats guests at hosts
//!   with a declared constraint relaxation ladder
//! - **Timing**: pure envelope reveal schedules, fed by travel legs resolved
//!   beforehand
//! - **Cascade repair**: transactional, idempotent mutations of the active
//!   match plan (dropouts, address changes, host transfers)
//! - **Storage**: SQLite persistence behind the [`MatchStore`] trait and
//!   TOML-based configuration
//!
//! ## Key Components
//!
//! - [`RoleAssignmentEngine`]: balanced host-course assignment
//! - [`PairingEngine`]: guest-to-host pairing
//! - [`MatchRunner`]: validation, envelope drafting and plan commit
//! - [`EnvelopeTimingCalculator`]: progressive disclosure timestamps
//! - [`ClueAllocator`]: host fact distribution across courses
//! - [`CascadeRepair`]: the mutation state machine
//! - [`DinnerDb`]: SQLite implementation of [`MatchStore`]

pub mod audit;
pub mod cascade;
pub mod clues;
pub mod error;
pub mod matching;
pub mod model;
pub mod storage;
pub mod timing;

pub use audit::{AuditEntry, AuditSink, TracingSink};
pub use cascade::{issue_envelope, unplaced_guests, CascadeRepair, Mutation, RepairOutcome};
pub use clues::{ClueAllocator, ClueConfig, CourseClues, StreetInfo};
pub use error::{ConfigError, CoreError, DatabaseError, RepairError, Result, ValidationError};
pub use matching::{
    refresh_envelope_states, MatchReport, MatchRequest, MatchRunner, MatchingConfig, PairingEngine,
    RoleAssignmentEngine,
};
pub use model::{
    Afterparty, Assignment, BlockedPair, Coordinates, Couple, CoupleId, Course, CoursePairing, DinnerEvent,
    Envelope, EnvelopeState, EventId, MatchPlan, MatchStats, MatchWarning, NewCouple, PlanId, PlanStatus,
    RevealSchedule, WarningKind,
};
pub use storage::{Config, DinnerDb, MatchStore};
pub use timing::{DistanceConfig, EnvelopeTimingCalculator, EventTiming, NoRoutes, RouteProvider, TravelLeg};
