use clap::{Args, Subcommand};
use dinnerhop_core::{
    unplaced_guests, CascadeRepair, Config, Coordinates, CoupleId, Course, DinnerDb, EventId, Mutation, PlanId,
};

use super::{print_json, resolve_plan, CmdResult};

/// Which plan a mutation applies to.
#[derive(Args)]
pub struct Target {
    /// Event ID
    #[arg(long)]
    event: EventId,
    /// Plan ID (defaults to the active plan)
    #[arg(long)]
    plan: Option<PlanId>,
    /// Fail unless the plan is still at this revision
    #[arg(long)]
    revision: Option<i64>,
}

#[derive(Subcommand)]
pub enum CascadeAction {
    /// A couple cancels entirely
    GuestDropout {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
    },
    /// A host can no longer host; its guests become unplaced
    HostDropout {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
    },
    /// A couple moves; envelopes pointing at its home follow
    AddressChange {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
        #[arg(long)]
        address: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Seat a guest at a different host for one course
    Reassign {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
        #[arg(long)]
        course: Course,
        /// Couple that hosts the course
        #[arg(long)]
        host: CoupleId,
    },
    /// Give up hosting; the couple becomes a guest for those courses
    ResignHost {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
        /// Course to resign (repeatable, default all hosted courses)
        #[arg(long = "course")]
        courses: Vec<Course>,
    },
    /// Register a separated member as a new couple with guest roles
    Split {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
        /// The already registered couple for the departing member
        #[arg(long)]
        new_couple: CoupleId,
    },
    /// Hand hosting of courses over to another couple
    TransferHost {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
        #[arg(long)]
        to: CoupleId,
        /// Course to transfer (repeatable, default all hosted courses)
        #[arg(long = "course")]
        courses: Vec<Course>,
    },
    /// Let a guest serve a course to itself
    PromoteHost {
        #[command(flatten)]
        target: Target,
        couple: CoupleId,
        #[arg(long)]
        course: Course,
    },
    /// Apply a mutation given as JSON (e.g. '{"type":"guest_dropout","couple_id":3}')
    Apply {
        #[command(flatten)]
        target: Target,
        mutation: String,
    },
    /// List guest seats without a host
    Unplaced {
        #[arg(long)]
        event: EventId,
        #[arg(long)]
        plan: Option<PlanId>,
    },
    /// Write fresh envelopes for seats, given as COUPLE:COURSE
    IssueEnvelopes {
        #[arg(long)]
        event: EventId,
        #[arg(long)]
        plan: Option<PlanId>,
        #[arg(required = true, value_parser = parse_seat)]
        seats: Vec<(CoupleId, Course)>,
    },
}

fn parse_seat(s: &str) -> Result<(CoupleId, Course), String> {
    let (couple, course) = s
        .split_once(':')
        .ok_or_else(|| format!("expected COUPLE:COURSE, got '{s}'"))?;
    let couple = couple.trim().parse::<CoupleId>().map_err(|e| format!("invalid couple '{couple}': {e}"))?;
    let course = course.parse::<Course>().map_err(|e| e.to_string())?;
    Ok((couple, course))
}

pub fn run(action: CascadeAction) -> CmdResult {
    let mut db = DinnerDb::open()?;
    let repair = CascadeRepair::new(&Config::load()?);

    let (target, mutation) = match action {
        CascadeAction::GuestDropout { target, couple } => (target, Mutation::GuestDropout { couple_id: couple }),
        CascadeAction::HostDropout { target, couple } => (target, Mutation::HostDropout { couple_id: couple }),
        CascadeAction::AddressChange {
            target,
            couple,
            address,
            notes,
            lat,
            lon,
        } => {
            let coordinates = lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon));
            (
                target,
                Mutation::AddressChange {
                    couple_id: couple,
                    address,
                    notes,
                    coordinates,
                },
            )
        }
        CascadeAction::Reassign {
            target,
            couple,
            course,
            host,
        } => (
            target,
            Mutation::Reassign {
                couple_id: couple,
                course,
                new_host_couple_id: host,
            },
        ),
        CascadeAction::ResignHost { target, couple, courses } => {
            (target, Mutation::ResignHost { couple_id: couple, courses })
        }
        CascadeAction::Split {
            target,
            couple,
            new_couple,
        } => (
            target,
            Mutation::Split {
                couple_id: couple,
                new_couple_id: new_couple,
            },
        ),
        CascadeAction::TransferHost {
            target,
            couple,
            to,
            courses,
        } => (
            target,
            Mutation::TransferHost {
                couple_id: couple,
                to_couple_id: to,
                courses,
            },
        ),
        CascadeAction::PromoteHost { target, couple, course } => {
            (target, Mutation::PromoteHost { couple_id: couple, course })
        }
        CascadeAction::Apply { target, mutation } => (target, serde_json::from_str::<Mutation>(&mutation)?),
        CascadeAction::Unplaced { event, plan } => {
            let plan_id = resolve_plan(&db, event, plan)?;
            return print_json(&unplaced_guests(&db, plan_id)?);
        }
        CascadeAction::IssueEnvelopes { event, plan, seats } => {
            let plan_id = resolve_plan(&db, event, plan)?;
            let ids = repair.issue_envelopes(&mut db, plan_id, &seats)?;
            return print_json(&ids);
        }
    };

    let plan_id = resolve_plan(&db, target.event, target.plan)?;
    let outcome = repair.apply_at(&mut db, plan_id, target.revision, &mutation)?;
    print_json(&outcome)?;
    if !outcome.unplaced.is_empty() {
        eprintln!(
            "{} guest seat(s) need a new host; see `dinnerhop cascade unplaced --event {}`",
            outcome.unplaced.len(),
            target.event
        );
    }
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning.message);
    }
    Ok(())
}
