use std::path::PathBuf;

use clap::Subcommand;
use dinnerhop_core::{Config, DinnerDb, EventId, EventTiming, MatchStore};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum TimingAction {
    /// Show the reveal timing an event uses
    Show {
        #[arg(long)]
        event: EventId,
    },
    /// Store per-event timing from a JSON file
    Set {
        #[arg(long)]
        event: EventId,
        /// JSON document with offsets, overrides and distance settings
        file: PathBuf,
    },
    /// Drop per-event timing and fall back to the configured default
    Clear {
        #[arg(long)]
        event: EventId,
    },
}

pub fn run(action: TimingAction) -> CmdResult {
    let db = DinnerDb::open()?;

    match action {
        TimingAction::Show { event } => {
            let (source, timing) = match db.event_timing(event)? {
                Some(timing) => ("event", timing),
                None => ("config", Config::load()?.timing),
            };
            print_json(&serde_json::json!({ "source": source, "timing": timing }))?;
        }
        TimingAction::Set { event, file } => {
            if db.event(event)?.is_none() {
                return Err(format!("event {event} not found").into());
            }
            let content = std::fs::read_to_string(&file)?;
            let timing: EventTiming = serde_json::from_str(&content)?;
            db.set_event_timing(event, &timing)?;
            println!("Timing stored for event {event}");
        }
        TimingAction::Clear { event } => {
            db.clear_event_timing(event)?;
            println!("Timing cleared for event {event}");
        }
    }
    Ok(())
}
