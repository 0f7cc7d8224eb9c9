use clap::Subcommand;
use dinnerhop_core::{Afterparty, DinnerDb, EventId, MatchStore};

use super::{parse_time, print_json, CmdResult};

#[derive(Subcommand)]
pub enum EventAction {
    /// Create a new event
    Create {
        /// Event name
        name: String,
        /// Starter start time (RFC 3339)
        #[arg(long)]
        starter: String,
        /// Main course start time (RFC 3339)
        #[arg(long)]
        main: String,
        /// Dessert start time (RFC 3339)
        #[arg(long)]
        dessert: String,
        /// Afterparty start time (RFC 3339)
        #[arg(long, requires = "afterparty_address")]
        afterparty_at: Option<String>,
        /// Afterparty address
        #[arg(long, requires = "afterparty_at")]
        afterparty_address: Option<String>,
        /// Directions for the afterparty location
        #[arg(long)]
        afterparty_notes: Option<String>,
    },
    /// List all events
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show an event with its plan history
    Show {
        /// Event ID
        id: EventId,
    },
}

pub fn run(action: EventAction) -> CmdResult {
    let db = DinnerDb::open()?;

    match action {
        EventAction::Create {
            name,
            starter,
            main,
            dessert,
            afterparty_at,
            afterparty_address,
            afterparty_notes,
        } => {
            let afterparty = match (afterparty_at, afterparty_address) {
                (Some(at), Some(address)) => Some(Afterparty {
                    starts_at: parse_time(&at)?,
                    address,
                    notes: afterparty_notes,
                }),
                _ => None,
            };
            let id = db.create_event(
                &name,
                parse_time(&starter)?,
                parse_time(&main)?,
                parse_time(&dessert)?,
                afterparty.as_ref(),
            )?;
            println!("Event created: {id}");
        }
        EventAction::List { json } => {
            let events = db.list_events()?;
            if json {
                print_json(&events)?;
            } else if events.is_empty() {
                println!("No events");
            } else {
                for e in events {
                    let plan = e.active_plan_id.map_or_else(|| "-".to_string(), |p| p.to_string());
                    println!("{}\t{}\t{}\tplan {}", e.id, e.name, e.starter_at.to_rfc3339(), plan);
                }
            }
        }
        EventAction::Show { id } => {
            let event = db.event(id)?.ok_or_else(|| format!("event {id} not found"))?;
            let plans = db.plans_for_event(id)?;
            print_json(&serde_json::json!({ "event": event, "plans": plans }))?;
        }
    }
    Ok(())
}
