use thiserror::Error;
use ulid::Ulid;

use crate::model::{BookingStatus, TimeInterval};
use crate::repository::RepoError;

/// Every way a booking operation can be refused. Failed operations leave state unchanged.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("trainer {trainer_id} has no available slot covering {}–{}", interval.start, interval.end)]
    TrainerUnavailable {
        trainer_id: Ulid,
        interval: TimeInterval,
    },
    #[error("trainer {trainer_id} is already booked by {conflicting}")]
    TrainerBusy { trainer_id: Ulid, conflicting: Ulid },
    #[error("room {room_id} is already booked by {conflicting}")]
    RoomBusy { room_id: Ulid, conflicting: Ulid },
    #[error("room {0} is closed for bookings")]
    RoomClosed(Ulid),
    #[error("class {class_id} is full (capacity {capacity})")]
    Capacity { class_id: Ulid, capacity: u32 },
    #[error("member {member_id} is already enrolled in class {class_id}")]
    Duplicate { class_id: Ulid, member_id: Ulid },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("slot overlaps existing availability {existing} for trainer {trainer_id}")]
    Overlap { trainer_id: Ulid, existing: Ulid },
    #[error("booking {id} is already {status}")]
    InvalidTransition { id: Ulid, status: BookingStatus },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl BookingError {
    /// Short stable label, used for metrics and shell output.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation",
            BookingError::TrainerUnavailable { .. } => "trainer_unavailable",
            BookingError::TrainerBusy { .. } => "trainer_busy",
            BookingError::RoomBusy { .. } => "room_busy",
            BookingError::RoomClosed(_) => "room_closed",
            BookingError::Capacity { .. } => "capacity",
            BookingError::Duplicate { .. } => "duplicate",
            BookingError::NotFound(_) => "not_found",
            BookingError::Overlap { .. } => "overlap",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::Repository(_) => "repository",
        }
    }
}
