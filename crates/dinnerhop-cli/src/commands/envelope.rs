use chrono::Utc;
use clap::Subcommand;
use dinnerhop_core::clues::clue_pool;
use dinnerhop_core::{refresh_envelope_states, CoupleId, DinnerDb, Envelope, EnvelopeState, EventId, MatchStore, PlanId};

use super::{parse_time, print_json, resolve_plan, CmdResult};

#[derive(Subcommand)]
pub enum EnvelopeAction {
    /// List envelopes of a plan
    List {
        #[arg(long)]
        event: EventId,
        /// Plan ID (defaults to the active plan)
        #[arg(long)]
        plan: Option<PlanId>,
        /// Only envelopes addressed to this couple
        #[arg(long)]
        couple: Option<CoupleId>,
        /// Include cancelled envelopes
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what an envelope reveals at a given time
    Show {
        /// Access token
        token: String,
        /// Evaluate at this time (RFC 3339) instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Recompute the stored reveal state of every live envelope
    RefreshStates {
        #[arg(long)]
        event: EventId,
        #[arg(long)]
        plan: Option<PlanId>,
    },
}

pub fn run(action: EnvelopeAction) -> CmdResult {
    let mut db = DinnerDb::open()?;

    match action {
        EnvelopeAction::List {
            event,
            plan,
            couple,
            all,
            json,
        } => {
            let plan_id = resolve_plan(&db, event, plan)?;
            let envelopes: Vec<Envelope> = match couple {
                Some(couple_id) => db.envelopes_for_couple(plan_id, couple_id)?,
                None => db.envelopes_for_plan(plan_id)?,
            }
            .into_iter()
            .filter(|e| all || !e.cancelled)
            .collect();

            if json {
                print_json(&envelopes)?;
            } else if envelopes.is_empty() {
                println!("No envelopes");
            } else {
                for e in envelopes {
                    let host = e.host_couple_id.map_or_else(|| "-".to_string(), |h| h.to_string());
                    let cancelled = if e.cancelled { " (cancelled)" } else { "" };
                    println!(
                        "{}\tcouple {}\t{}\thost {}\t{}\t{}{}",
                        e.id, e.couple_id, e.course, host, e.current_state.as_str(), e.destination_address, cancelled
                    );
                }
            }
        }
        EnvelopeAction::Show { token, at } => {
            let envelope = db
                .envelope_by_token(&token)?
                .ok_or("no envelope with this token")?;
            let now = match at {
                Some(at) => parse_time(&at)?,
                None => Utc::now(),
            };
            print_json(&reveal(&db, &envelope, envelope.schedule.state_at(now))?)?;
        }
        EnvelopeAction::RefreshStates { event, plan } => {
            let plan_id = resolve_plan(&db, event, plan)?;
            let changed = refresh_envelope_states(&mut db, plan_id, Utc::now())?;
            println!("{changed} envelope(s) changed state");
        }
    }
    Ok(())
}

/// The parts of an envelope visible in `state`.
fn reveal(db: &DinnerDb, envelope: &Envelope, state: EnvelopeState) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut view = serde_json::json!({
        "course": envelope.course,
        "state": state,
        "cancelled": envelope.cancelled,
        "schedule": envelope.schedule,
    });

    let Some(host_id) = envelope.host_couple_id else {
        // Afterparty: one shared address, shown once open.
        if state >= EnvelopeState::Open {
            view["address"] = envelope.destination_address.clone().into();
            view["notes"] = serde_json::json!(envelope.destination_notes);
        }
        return Ok(view);
    };

    if state >= EnvelopeState::Clue1 {
        let host = db.couple(host_id)?.ok_or_else(|| format!("couple {host_id} not found"))?;
        let pool = clue_pool(&host);
        let shown = if state >= EnvelopeState::Clue2 { usize::MAX } else { 1 };
        let clues: Vec<_> = db
            .course_clues(envelope.plan_id, host_id)?
            .into_iter()
            .filter(|c| c.course == envelope.course)
            .flat_map(|c| c.indices)
            .take(shown)
            .filter_map(|i| pool.get(i).cloned())
            .collect();
        view["clues"] = serde_json::to_value(clues)?;
    }

    if state >= EnvelopeState::Street {
        let info = db
            .street_info(envelope.plan_id, host_id)?
            .into_iter()
            .find(|s| s.course == envelope.course);
        if let Some(info) = info {
            view["street"] = info.street.into();
            view["locality"] = serde_json::json!(info.locality);
            if state >= EnvelopeState::Number {
                view["house_number"] = serde_json::json!(info.house_number);
            }
        }
    }

    if state >= EnvelopeState::Number {
        view["address"] = envelope.destination_address.clone().into();
        view["notes"] = serde_json::json!(envelope.destination_notes);
        view["cycling_distance_km"] = serde_json::json!(envelope.cycling_distance_km);
    }
    Ok(view)
}
