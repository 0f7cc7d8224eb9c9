//! Cascade mutation payloads.

use serde::{Deserialize, Serialize};

use crate::model::{Coordinates, CoupleId, Course};

/// One change to an active match plan, tagged by `type`.
///
/// ```json
/// {"type": "reassign", "couple_id": 7, "course": "main", "new_host_couple_id": 3}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Couple no longer attends: its guest envelopes and pairings go away.
    GuestDropout { couple_id: CoupleId },

    /// Couple no longer hosts anything: its guests become unplaced.
    HostDropout { couple_id: CoupleId },

    /// Couple moved; envelopes pointing at it get the new destination.
    AddressChange {
        couple_id: CoupleId,
        address: String,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        coordinates: Option<Coordinates>,
    },

    /// Seat a guest at a different host for one course.
    Reassign {
        couple_id: CoupleId,
        course: Course,
        new_host_couple_id: CoupleId,
    },

    /// Host gives up hosting, staying on as a guest. All hosted courses
    /// when `courses` is empty.
    ResignHost {
        couple_id: CoupleId,
        #[serde(default)]
        courses: Vec<Course>,
    },

    /// `new_couple_id` was split off `couple_id` and needs placing.
    Split {
        couple_id: CoupleId,
        new_couple_id: CoupleId,
    },

    /// Hand hosting of `courses` from `couple_id` over to `to_couple_id`.
    TransferHost {
        couple_id: CoupleId,
        to_couple_id: CoupleId,
        courses: Vec<Course>,
    },

    /// Guest stops needing a host for `course` and serves itself.
    PromoteHost { couple_id: CoupleId, course: Course },
}

impl Mutation {
    /// Couple the mutation is about.
    pub fn couple_id(&self) -> CoupleId {
        match self {
            Mutation::GuestDropout { couple_id }
            | Mutation::HostDropout { couple_id }
            | Mutation::AddressChange { couple_id, .. }
            | Mutation::Reassign { couple_id, .. }
            | Mutation::ResignHost { couple_id, .. }
            | Mutation::Split { couple_id, .. }
            | Mutation::TransferHost { couple_id, .. }
            | Mutation::PromoteHost { couple_id, .. } => *couple_id,
        }
    }

    /// Every couple named in the payload.
    pub fn couples(&self) -> Vec<CoupleId> {
        match self {
            Mutation::Reassign {
                couple_id,
                new_host_couple_id,
                ..
            } => vec![*couple_id, *new_host_couple_id],
            Mutation::Split {
                couple_id,
                new_couple_id,
            } => vec![*couple_id, *new_couple_id],
            Mutation::TransferHost {
                couple_id,
                to_couple_id,
                ..
            } => vec![*couple_id, *to_couple_id],
            other => vec![other.couple_id()],
        }
    }

    /// Audit action name, equal to the serialized `type`.
    pub fn action(&self) -> &'static str {
        match self {
            Mutation::GuestDropout { .. } => "guest_dropout",
            Mutation::HostDropout { .. } => "host_dropout",
            Mutation::AddressChange { .. } => "address_change",
            Mutation::Reassign { .. } => "reassign",
            Mutation::ResignHost { .. } => "resign_host",
            Mutation::Split { .. } => "split",
            Mutation::TransferHost { .. } => "transfer_host",
            Mutation::PromoteHost { .. } => "promote_host",
        }
    }
}
