use clap::Subcommand;
use dinnerhop_core::{Config, Course, DinnerDb, EventId, MatchRequest, MatchRunner, MatchStore, PlanId};

use super::{print_json, resolve_plan, CmdResult};

#[derive(Subcommand)]
pub enum MatchAction {
    /// Compute and commit a new plan version
    Run {
        #[arg(long)]
        event: EventId,
        /// Keep the active plan's pairings for a course (repeatable)
        #[arg(long = "freeze")]
        frozen: Vec<Course>,
        /// Compute and print the draft without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show a plan with its statistics and pairings
    Show {
        #[arg(long)]
        event: EventId,
        /// Plan ID (defaults to the active plan)
        #[arg(long)]
        plan: Option<PlanId>,
    },
}

pub fn run(action: MatchAction) -> CmdResult {
    let mut db = DinnerDb::open()?;

    match action {
        MatchAction::Run { event, frozen, dry_run } => {
            let runner = MatchRunner::new(&Config::load()?);
            let request = frozen
                .into_iter()
                .fold(MatchRequest::new(event), |req, course| req.freeze(course));

            if dry_run {
                let draft = runner.prepare(&db, &request)?;
                print_json(&serde_json::json!({
                    "stats": draft.stats(),
                    "assignments": draft.assignments(),
                    "pairings": draft.pairings(),
                    "unplaced": draft.unplaced(),
                }))?;
                return Ok(());
            }

            let report = runner.run(&mut db, &request)?;
            print_json(&report)?;
            for w in &report.plan.stats.warnings {
                eprintln!("warning: {}", w.message);
            }
        }
        MatchAction::Show { event, plan } => {
            let plan_id = resolve_plan(&db, event, plan)?;
            let plan = db.plan(plan_id)?.ok_or_else(|| format!("plan {plan_id} not found"))?;
            let pairings = db.pairings_for_plan(plan_id)?;
            print_json(&serde_json::json!({ "plan": plan, "pairings": pairings }))?;
        }
    }
    Ok(())
}
