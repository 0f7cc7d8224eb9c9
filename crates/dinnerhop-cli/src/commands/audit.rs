use clap::Subcommand;
use dinnerhop_core::{DinnerDb, EventId};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum AuditAction {
    /// Show the audit log of an event, oldest first
    List {
        #[arg(long)]
        event: EventId,
        /// Only entries with this action (e.g. run_matching, host_dropout)
        #[arg(long)]
        action: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: AuditAction) -> CmdResult {
    let db = DinnerDb::open()?;

    match action {
        AuditAction::List { event, action, json } => {
            let entries: Vec<_> = db
                .audit_entries(event)?
                .into_iter()
                .filter(|e| action.as_deref().map_or(true, |a| e.action == a))
                .collect();

            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No audit entries");
            } else {
                for e in entries {
                    let plan = e.plan_id.map_or_else(|| "-".to_string(), |p| p.to_string());
                    let couples: Vec<String> = e.couple_ids.iter().map(ToString::to_string).collect();
                    println!(
                        "{}\t{}\tplan {}\tcouples [{}]\t{} warning(s)",
                        e.recorded_at.to_rfc3339(),
                        e.action,
                        plan,
                        couples.join(","),
                        e.warnings.len()
                    );
                }
            }
        }
    }
    Ok(())
}
