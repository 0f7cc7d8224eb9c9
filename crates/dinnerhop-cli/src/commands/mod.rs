pub mod audit;
pub mod block;
pub mod cascade;
pub mod config;
pub mod couple;
pub mod envelope;
pub mod event;
pub mod matching;
pub mod timing;

use chrono::{DateTime, Utc};
use dinnerhop_core::{DinnerDb, EventId, MatchStore, PlanId};
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Parse an RFC 3339 timestamp such as `2030-05-17T19:00:00+02:00`.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid time '{s}': {e}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `plan` when given, otherwise the event's active plan.
pub fn resolve_plan(db: &DinnerDb, event_id: EventId, plan: Option<PlanId>) -> Result<PlanId, Box<dyn std::error::Error>> {
    if let Some(plan_id) = plan {
        return Ok(plan_id);
    }
    let event = db.event(event_id)?.ok_or_else(|| format!("event {event_id} not found"))?;
    event
        .active_plan_id
        .ok_or_else(|| format!("event {event_id} has no active plan; run `dinnerhop match run` first").into())
}
