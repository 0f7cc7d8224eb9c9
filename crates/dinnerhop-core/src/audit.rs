//! Append-only log of matching runs and cascade mutations.
//!
//! Writing an entry is a side effect the engines never read back. A sink
//! failure is logged and otherwise ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::model::{CoupleId, EventId, MatchWarning, PlanId};

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub event_id: EventId,
    pub plan_id: Option<PlanId>,
    /// e.g. `run_matching`, `host_dropout`
    pub action: String,
    pub couple_ids: Vec<CoupleId>,
    pub warnings: Vec<MatchWarning>,
    /// Action-specific payload (counts, mutation input)
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(event_id: EventId, plan_id: Option<PlanId>, action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_id,
            plan_id,
            action: action.into(),
            couple_ids: Vec::new(),
            warnings: Vec::new(),
            details: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_couples(mut self, mut couple_ids: Vec<CoupleId>) -> Self {
        couple_ids.sort_unstable();
        couple_ids.dedup();
        self.couple_ids = couple_ids;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<MatchWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Destination for audit entries.
pub trait AuditSink {
    fn append(&self, entry: &AuditEntry) -> Result<(), DatabaseError>;
}

/// Sink that only emits log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn append(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        tracing::info!(
            event_id = entry.event_id,
            plan_id = ?entry.plan_id,
            action = %entry.action,
            couples = ?entry.couple_ids,
            warnings = entry.warnings.len(),
            "audit"
        );
        Ok(())
    }
}

/// Append `entry`, logging instead of failing when the sink errors.
pub fn record<S: AuditSink + ?Sized>(sink: &S, entry: &AuditEntry) {
    if let Err(e) = sink.append(entry) {
        tracing::warn!(action = %entry.action, error = %e, "failed to append audit entry");
    }
}
