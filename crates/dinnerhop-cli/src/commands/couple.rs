use clap::Subcommand;
use dinnerhop_core::{Course, CoupleId, DinnerDb, EventId, MatchStore, NewCouple};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum CoupleAction {
    /// Register a couple for an event
    Add {
        /// Event ID
        #[arg(long)]
        event: EventId,
        /// Display name
        name: String,
        /// Home address where the couple would host
        #[arg(long)]
        address: String,
        /// Directions (floor, bell name)
        #[arg(long)]
        notes: Option<String>,
        /// Number of persons (1 or 2)
        #[arg(long, default_value_t = 2)]
        persons: u32,
        /// Preferred course to host (starter, main, dessert)
        #[arg(long)]
        prefer: Option<Course>,
        /// Latitude of the home address
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude of the home address
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Fun fact used for host clues (repeatable)
        #[arg(long = "fact")]
        facts: Vec<String>,
        /// Birth year of a member (repeatable)
        #[arg(long = "birth-year")]
        birth_years: Vec<i32>,
        /// Allergy or dietary restriction (repeatable)
        #[arg(long = "allergy")]
        allergies: Vec<String>,
        /// Seats the couple can offer when hosting
        #[arg(long)]
        max_guests: Option<u32>,
        /// Willing to host whichever course is short of hosts
        #[arg(long)]
        flex: bool,
        /// Available as a last-minute replacement host
        #[arg(long)]
        emergency: bool,
    },
    /// List couples of an event
    List {
        /// Event ID
        #[arg(long)]
        event: EventId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one couple with its course roles
    Show {
        /// Couple ID
        id: CoupleId,
    },
}

pub fn run(action: CoupleAction) -> CmdResult {
    let db = DinnerDb::open()?;

    match action {
        CoupleAction::Add {
            event,
            name,
            address,
            notes,
            persons,
            prefer,
            lat,
            lon,
            facts,
            birth_years,
            allergies,
            max_guests,
            flex,
            emergency,
        } => {
            if db.event(event)?.is_none() {
                return Err(format!("event {event} not found").into());
            }
            let mut couple = NewCouple::new(event, name, address).with_persons(persons);
            if let Some(course) = prefer {
                couple = couple.with_preference(course);
            }
            if let (Some(lat), Some(lon)) = (lat, lon) {
                couple = couple.with_coordinates(lat, lon);
            }
            if let Some(notes) = notes {
                couple = couple.with_notes(notes);
            }
            for fact in facts {
                couple = couple.with_fun_fact(fact);
            }
            for year in birth_years {
                couple = couple.with_birth_year(year);
            }
            if let Some(max) = max_guests {
                couple = couple.with_max_guests(max);
            }
            if flex {
                couple = couple.flex();
            }
            if emergency {
                couple = couple.emergency();
            }
            couple.allergies = allergies;

            let id = db.add_couple(&couple)?;
            println!("Couple registered: {id}");
        }
        CoupleAction::List { event, json } => {
            let couples = db.couples_for_event(event)?;
            if json {
                print_json(&couples)?;
            } else if couples.is_empty() {
                println!("No couples");
            } else {
                for c in couples {
                    let status = if c.cancelled { " (cancelled)" } else { "" };
                    println!("{}\t{}\t{} persons\t{}{}", c.id, c.name, c.persons, c.address, status);
                }
            }
        }
        CoupleAction::Show { id } => {
            let couple = db.couple(id)?.ok_or_else(|| format!("couple {id} not found"))?;
            let roles = db.assignments_for_couple(couple.event_id, id)?;
            print_json(&serde_json::json!({ "couple": couple, "assignments": roles }))?;
        }
    }
    Ok(())
}
