use clap::Subcommand;
use dinnerhop_core::{CoupleId, DinnerDb, EventId, MatchStore};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum BlockAction {
    /// Forbid two couples from meeting
    Add {
        #[arg(long)]
        event: EventId,
        a: CoupleId,
        b: CoupleId,
    },
    /// Lift a block
    Remove {
        #[arg(long)]
        event: EventId,
        a: CoupleId,
        b: CoupleId,
    },
    /// List blocked pairs
    List {
        #[arg(long)]
        event: EventId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: BlockAction) -> CmdResult {
    let db = DinnerDb::open()?;

    match action {
        BlockAction::Add { event, a, b } => {
            if a == b {
                return Err("a couple cannot be blocked from itself".into());
            }
            db.add_blocked_pair(event, a, b)?;
            println!("Blocked {a} <-> {b}");
        }
        BlockAction::Remove { event, a, b } => {
            if db.remove_blocked_pair(event, a, b)? {
                println!("Unblocked {a} <-> {b}");
            } else {
                return Err(format!("no block between {a} and {b}").into());
            }
        }
        BlockAction::List { event, json } => {
            let pairs = db.blocked_pairs(event)?;
            if json {
                print_json(&pairs)?;
            } else if pairs.is_empty() {
                println!("No blocked pairs");
            } else {
                for p in pairs {
                    println!("{} <-> {}", p.couple_a, p.couple_b);
                }
            }
        }
    }
    Ok(())
}
