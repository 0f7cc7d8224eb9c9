//! Core error types for dinnerhop-core.
//!
//! Errors are grouped by the stage that rejects the request:
//! validation before any engine runs, storage failures, configuration
//! problems, and consistency-repair failures raised by cascade mutations.
//! Constraint relaxations during matching are *not* errors; they are
//! reported as [`crate::model::MatchWarning`] values.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{CoupleId, Course, EventId, PlanId};

/// Core error type for dinnerhop-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input rejected before any engine ran
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Cascade mutation refused; nothing was written
    #[error("Repair error: {0}")]
    Repair(#[from] RepairError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored value could not be decoded
    #[error("Corrupt value in column '{column}': {message}")]
    Corrupt { column: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors: the request is malformed and was never applied.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Not enough active couples to run a matching
    #[error("Event {event_id} has {found} active couple(s); at least {min} are required")]
    TooFewCouples {
        event_id: EventId,
        found: usize,
        min: usize,
    },

    /// Event does not exist
    #[error("Event {0} not found")]
    EventNotFound(EventId),

    /// Couple does not exist
    #[error("Couple {0} not found")]
    CoupleNotFound(CoupleId),

    /// Unknown course name
    #[error("Unknown course '{0}' (expected starter, main, dessert or afterparty)")]
    UnknownCourse(String),

    /// Course has no hosting role
    #[error("Course '{0}' cannot be hosted")]
    NotHostable(Course),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Consistency-repair failures: the whole cascade call was rolled back.
#[derive(Error, Debug)]
pub enum RepairError {
    /// No plan with that id
    #[error("Match plan {0} not found")]
    PlanNotFound(PlanId),

    /// Plan exists but is not the event's active plan
    #[error("Match plan {0} is not active")]
    PlanNotActive(PlanId),

    /// Couple referenced by the mutation does not exist
    #[error("Couple {0} not found")]
    CoupleNotFound(CoupleId),

    /// Couple belongs to a different event than the plan
    #[error("Couple {couple_id} does not belong to event {event_id}")]
    WrongEvent { couple_id: CoupleId, event_id: EventId },

    /// Couple is cancelled and cannot take a new role
    #[error("Couple {0} is cancelled")]
    CoupleCancelled(CoupleId),

    /// Target couple does not host the course
    #[error("Couple {couple_id} is not a host for {course}")]
    NotAHost { couple_id: CoupleId, course: Course },

    /// A mutation would pair two couples that must never meet
    #[error("Couples {0} and {1} are a blocked pair")]
    BlockedPair(CoupleId, CoupleId),

    /// Source and target of a mutation are the same couple
    #[error("Couple {0} cannot be both source and target")]
    SameCouple(CoupleId),

    /// Course has no hosting role
    #[error("Course '{0}' cannot be hosted")]
    NotHostable(Course),

    /// Couple already hosts the course it would be seated in as a guest
    #[error("Couple {couple_id} already hosts {course}")]
    AlreadyHosting { couple_id: CoupleId, course: Course },

    /// No host to issue an envelope towards
    #[error("Couple {couple_id} has no host for {course}")]
    NoHost { couple_id: CoupleId, course: Course },

    /// Split target already holds pairings
    #[error("Couple {0} already has pairings and cannot be a split target")]
    AlreadyPlaced(CoupleId),

    /// Optimistic revision check failed
    #[error("Match plan {plan_id} changed concurrently (expected revision {expected})")]
    Conflict { plan_id: PlanId, expected: i64 },

    /// The active plan moved on between preparing and committing a matching
    #[error("Event {event_id} changed since the matching was prepared")]
    StaleDraft { event_id: EventId },

    /// Storage failure during the mutation
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<rusqlite::Error> for RepairError {
    fn from(err: rusqlite::Error) -> Self {
        RepairError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
