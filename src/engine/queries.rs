use chrono::{Duration, NaiveDateTime};

use crate::model::*;
use crate::observability::OpTimer;

use super::availability::{AvailableSlots, merge_overlapping, subtract_intervals};
use super::conflict::validate_range;
use super::{BookingError, BookingService, observed};

impl BookingService {
    pub fn get_booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.scheduler.get(&id).ok_or(BookingError::NotFound(id))
    }

    pub fn get_trainer(&self, id: TrainerId) -> Result<Trainer, BookingError> {
        self.trainers
            .get(&id)
            .map(|t| t.value().clone())
            .ok_or(BookingError::NotFound(id))
    }

    pub fn get_room(&self, id: RoomId) -> Result<Room, BookingError> {
        self.rooms
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(BookingError::NotFound(id))
    }

    pub fn get_member(&self, id: MemberId) -> Result<Member, BookingError> {
        self.members
            .get(&id)
            .map(|m| m.value().clone())
            .ok_or(BookingError::NotFound(id))
    }

    pub fn list_trainers(&self) -> Vec<Trainer> {
        let mut trainers: Vec<Trainer> = self.trainers.iter().map(|t| t.value().clone()).collect();
        trainers.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        trainers
    }

    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    /// Members whose first name, last name or email contains `text`, ignoring case.
    /// Blank text matches everyone.
    pub fn search_members(&self, text: &str) -> Vec<Member> {
        let needle = text.trim().to_lowercase();
        let mut found: Vec<Member> = self
            .members
            .iter()
            .filter(|m| {
                [&m.first_name, &m.last_name, &m.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .map(|m| m.value().clone())
            .collect();
        found.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        found
    }

    /// Scheduled sessions starting at or after `after`, earliest first.
    pub fn list_upcoming_sessions(
        &self,
        party: Party,
        after: NaiveDateTime,
    ) -> Result<Vec<Session>, BookingError> {
        let timer = OpTimer::start("list_upcoming_sessions");
        let result = self.upcoming_sessions(party, after);
        timer.finish(&result);
        result
    }

    fn upcoming_sessions(&self, party: Party, after: NaiveDateTime) -> Result<Vec<Session>, BookingError> {
        let sessions = match party {
            Party::Member(member_id) => {
                self.require_member(member_id)?;
                self.scheduler.sessions_for_member(&member_id)
            }
            Party::Trainer(trainer_id) => {
                self.require_trainer(trainer_id)?;
                self.scheduler
                    .active_on(ResourceKey::trainer(trainer_id))
                    .into_iter()
                    .filter_map(|b| match b {
                        Booking::Session(s) => Some(s),
                        Booking::Class(_) => None,
                    })
                    .collect()
            }
        };
        let mut upcoming: Vec<Session> = sessions
            .into_iter()
            .filter(|s| s.status == BookingStatus::Scheduled && s.interval.start >= after)
            .collect();
        upcoming.sort_by_key(|s| (s.interval.start, s.id));
        Ok(upcoming)
    }

    /// Lazy view of a trainer's Available slots in `range`. Iterating it twice
    /// yields the same slots.
    pub fn list_available_slots(
        &self,
        trainer_id: TrainerId,
        range: DateRange,
    ) -> Result<AvailableSlots, BookingError> {
        validate_range(&range)?;
        self.require_trainer(trainer_id)?;
        Ok(self.availability.list_available(trainer_id, range))
    }

    /// Bookable gaps: each Available slot minus the trainer's active bookings,
    /// keeping only gaps of at least `min_duration`.
    pub fn free_windows(
        &self,
        trainer_id: TrainerId,
        range: DateRange,
        min_duration: Duration,
    ) -> Result<Vec<FreeWindow>, BookingError> {
        let timer = OpTimer::start("free_windows");
        let result = self.list_available_slots(trainer_id, range).map(|slots| {
            let key = ResourceKey::trainer(trainer_id);
            let mut windows = Vec::new();
            for slot in &slots {
                let busy = merge_overlapping(&self.scheduler.busy_within(key, &slot.interval));
                for interval in subtract_intervals(&[slot.interval], &busy) {
                    if interval.duration() >= min_duration {
                        windows.push(FreeWindow {
                            trainer_id,
                            date: slot.date,
                            interval,
                        });
                    }
                }
            }
            windows
        });
        timer.finish(&result);
        result
    }

    pub fn list_classes(&self, filter: &ClassFilter) -> Result<Vec<ClassInfo>, BookingError> {
        if let Some(range) = &filter.dates {
            validate_range(range)?;
        }
        let mut classes: Vec<ClassInfo> = self
            .scheduler
            .all()
            .into_iter()
            .filter_map(|b| match b {
                Booking::Class(c) => Some(c),
                Booking::Session(_) => None,
            })
            .filter(|c| filter.include_cancelled || c.status != BookingStatus::Cancelled)
            .filter(|c| filter.trainer_id.is_none_or(|t| c.trainer_id == t))
            .filter(|c| filter.room_id.is_none_or(|r| c.room_id == r))
            .filter(|c| filter.dates.is_none_or(|d| d.contains(c.interval.date())))
            .map(|class| ClassInfo {
                enrolled: self.capacity.enrolled_count(&class.id).unwrap_or(0),
                class,
            })
            .filter(|info| {
                !filter.open_only
                    || (info.class.status == BookingStatus::Scheduled && info.seats_left() > 0)
            })
            .collect();
        classes.sort_by_key(|info| (info.class.interval.start, info.class.id));
        Ok(classes)
    }

    /// Enrolled members of a class, in id order.
    pub fn class_roster(&self, class_id: BookingId) -> Result<Vec<Member>, BookingError> {
        self.class(class_id)?;
        Ok(self
            .capacity
            .members(&class_id)
            .into_iter()
            .filter_map(|id| self.members.get(&id).map(|m| m.value().clone()))
            .collect())
    }

    /// Sessions and classes a trainer is on, as the repository sees them.
    pub async fn trainer_schedule(&self, trainer_id: TrainerId) -> Result<Vec<Booking>, BookingError> {
        observed("trainer_schedule", async {
            self.require_trainer(trainer_id)?;
            Ok(self
                .repo
                .query_active_by_resource(ResourceKind::Trainer, trainer_id)
                .await?)
        })
        .await
    }

    pub async fn room_bookings(&self, room_id: RoomId) -> Result<Vec<Booking>, BookingError> {
        observed("room_bookings", async {
            self.get_room(room_id)?;
            Ok(self
                .repo
                .query_active_by_resource(ResourceKind::Room, room_id)
                .await?)
        })
        .await
    }
}
