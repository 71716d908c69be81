use crate::limits::*;
use crate::model::*;

use super::{BookingError, ResourceScheduler};

pub(crate) fn validate_interval(interval: &TimeInterval) -> Result<(), BookingError> {
    if interval.end <= interval.start {
        return Err(BookingError::Validation(format!(
            "interval end {} must be after start {}",
            interval.end, interval.start
        )));
    }
    if interval.duration().num_minutes() > MAX_INTERVAL_MINUTES {
        return Err(BookingError::LimitExceeded("interval too long"));
    }
    Ok(())
}

pub(crate) fn validate_name(value: &str, field: &str) -> Result<(), BookingError> {
    if value.trim().is_empty() {
        return Err(BookingError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(BookingError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_capacity(capacity: u32) -> Result<(), BookingError> {
    if capacity == 0 {
        return Err(BookingError::Validation("capacity must be at least 1".into()));
    }
    if capacity > MAX_CLASS_CAPACITY {
        return Err(BookingError::LimitExceeded("class capacity too large"));
    }
    Ok(())
}

pub(crate) fn validate_range(range: &DateRange) -> Result<(), BookingError> {
    if range.to < range.from {
        return Err(BookingError::Validation(format!(
            "date range ends ({}) before it starts ({})",
            range.to, range.from
        )));
    }
    if range.days() > MAX_QUERY_DAYS {
        return Err(BookingError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

/// Trainer is checked before room, so a request clashing on both reports `TrainerBusy`.
pub(crate) fn check_resources_free(
    scheduler: &ResourceScheduler,
    occ: &Occupancy,
    exclude: Option<BookingId>,
) -> Result<(), BookingError> {
    if let Some(conflicting) =
        scheduler.find_conflict(ResourceKind::Trainer, occ.trainer_id, &occ.interval, exclude)
    {
        return Err(BookingError::TrainerBusy {
            trainer_id: occ.trainer_id,
            conflicting,
        });
    }
    if let Some(conflicting) =
        scheduler.find_conflict(ResourceKind::Room, occ.room_id, &occ.interval, exclude)
    {
        return Err(BookingError::RoomBusy {
            room_id: occ.room_id,
            conflicting,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use ulid::Ulid;

    use super::*;

    const D: &str = "2024-01-10";

    #[test]
    fn interval_limits() {
        assert!(validate_interval(&span(D, "09:00", "10:00")).is_ok());
        let reversed = TimeInterval {
            start: at(D, "10:00"),
            end: at(D, "09:00"),
        };
        assert!(matches!(validate_interval(&reversed), Err(BookingError::Validation(_))));
        let start = at(D, "09:00");
        let too_long = TimeInterval::new(start, start + Duration::minutes(MAX_INTERVAL_MINUTES + 1));
        assert!(matches!(validate_interval(&too_long), Err(BookingError::LimitExceeded(_))));
    }

    #[test]
    fn names_and_capacities() {
        assert!(validate_name("Yoga", "name").is_ok());
        assert!(matches!(validate_name("   ", "name"), Err(BookingError::Validation(_))));
        assert!(matches!(
            validate_name(&"x".repeat(MAX_NAME_LEN + 1), "name"),
            Err(BookingError::LimitExceeded(_))
        ));
        assert!(validate_capacity(0).is_err());
        assert!(validate_capacity(MAX_CLASS_CAPACITY).is_ok());
        assert!(validate_capacity(MAX_CLASS_CAPACITY + 1).is_err());
    }

    #[test]
    fn query_window_is_bounded() {
        let year = DateRange { from: day("2024-01-01"), to: day("2024-12-31") };
        assert!(validate_range(&year).is_ok());
        let wide = DateRange { from: day("2024-01-01"), to: day("2025-06-01") };
        assert!(matches!(validate_range(&wide), Err(BookingError::LimitExceeded(_))));
    }

    #[test]
    fn trainer_conflict_reported_before_room() {
        let scheduler = ResourceScheduler::new();
        let (trainer, room) = (Ulid::new(), Ulid::new());
        let existing = Session {
            id: Ulid::new(),
            trainer_id: trainer,
            room_id: room,
            member_id: Ulid::new(),
            interval: span(D, "10:00", "11:00"),
            status: BookingStatus::Scheduled,
        };
        scheduler.register(Booking::Session(existing.clone()));

        let both = Occupancy { trainer_id: trainer, room_id: room, interval: span(D, "10:30", "11:30") };
        assert!(matches!(
            check_resources_free(&scheduler, &both, None),
            Err(BookingError::TrainerBusy { conflicting, .. }) if conflicting == existing.id
        ));

        let room_only = Occupancy { trainer_id: Ulid::new(), ..both };
        assert!(matches!(
            check_resources_free(&scheduler, &room_only, None),
            Err(BookingError::RoomBusy { .. })
        ));

        assert!(check_resources_free(&scheduler, &both, Some(existing.id)).is_ok());
    }
}
