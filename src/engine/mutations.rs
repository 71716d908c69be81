use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::conflict::{check_resources_free, validate_capacity, validate_interval, validate_name};
use super::{BookingError, BookingService, LockKey, observed};

impl BookingService {
    // ── Directory ────────────────────────────────────────────

    pub async fn register_trainer(
        &self,
        first_name: &str,
        last_name: &str,
        speciality: &str,
    ) -> Result<Trainer, BookingError> {
        observed("register_trainer", async {
            validate_name(first_name, "first name")?;
            validate_name(last_name, "last name")?;
            validate_name(speciality, "speciality")?;
            let trainer = Trainer {
                id: Ulid::new(),
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
                speciality: speciality.to_owned(),
            };
            let event = Event::TrainerRegistered(trainer.clone());
            self.persist(&event).await?;
            self.trainers.insert(trainer.id, trainer.clone());
            self.publish(&event, &[]);
            info!(trainer_id = %trainer.id, "trainer registered");
            Ok(trainer)
        })
        .await
    }

    pub async fn register_room(&self, name: &str, capacity: u32) -> Result<Room, BookingError> {
        observed("register_room", async {
            validate_name(name, "room name")?;
            validate_capacity(capacity)?;
            let room = Room {
                id: Ulid::new(),
                name: name.to_owned(),
                capacity,
                available: true,
            };
            let event = Event::RoomRegistered(room.clone());
            self.persist(&event).await?;
            self.rooms.insert(room.id, room.clone());
            self.publish(&event, &[]);
            info!(room_id = %room.id, "room registered");
            Ok(room)
        })
        .await
    }

    /// Open or close a room. Existing bookings are untouched either way.
    pub async fn set_room_available(&self, room_id: RoomId, available: bool) -> Result<Room, BookingError> {
        observed("set_room_available", async {
            self.get_room(room_id)?;
            let _locks = self.locks.acquire([LockKey::Room(room_id)]).await;
            let mut room = self
                .rooms
                .get(&room_id)
                .map(|r| r.value().clone())
                .ok_or(BookingError::NotFound(room_id))?;
            room.available = available;
            let event = Event::RoomUpdated(room.clone());
            self.persist(&event).await?;
            self.rooms.insert(room_id, room.clone());
            self.publish(&event, &[]);
            info!(%room_id, available, "room availability changed");
            Ok(room)
        })
        .await
    }

    pub async fn register_member(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> Result<Member, BookingError> {
        observed("register_member", async {
            validate_name(first_name, "first name")?;
            validate_name(last_name, "last name")?;
            validate_name(email, "email")?;
            if !email.contains('@') {
                return Err(BookingError::Validation(format!("invalid email address: {email}")));
            }
            let member = Member {
                id: Ulid::new(),
                first_name: first_name.to_owned(),
                last_name: last_name.to_owned(),
                email: email.to_owned(),
            };
            let event = Event::MemberRegistered(member.clone());
            self.persist(&event).await?;
            self.members.insert(member.id, member.clone());
            self.publish(&event, &[]);
            info!(member_id = %member.id, "member registered");
            Ok(member)
        })
        .await
    }

    // ── Availability ─────────────────────────────────────────

    /// Declare one stretch of a trainer's day as available or unavailable.
    pub async fn set_availability(
        &self,
        trainer_id: TrainerId,
        date: NaiveDate,
        interval: TimeInterval,
        status: SlotStatus,
    ) -> Result<AvailabilitySlot, BookingError> {
        observed("set_availability", async {
            validate_interval(&interval)?;
            self.require_trainer(trainer_id)?;
            let _locks = self.locks.acquire([LockKey::Trainer(trainer_id)]).await;
            self.availability.check_slot(trainer_id, date, &interval)?;

            let slot = AvailabilitySlot {
                id: Ulid::new(),
                trainer_id,
                date,
                interval,
                status,
            };
            let event = Event::SlotAdded(slot.clone());
            self.persist(&event).await?;
            self.availability.insert(slot.clone());
            self.publish(&event, &[]);
            info!(slot_id = %slot.id, %trainer_id, %date, ?status, "availability set");
            Ok(slot)
        })
        .await
    }

    /// Withdraw a slot. Refused while a session it covers still holds the trainer.
    pub async fn remove_slot(&self, slot_id: SlotId) -> Result<AvailabilitySlot, BookingError> {
        observed("remove_slot", async {
            let trainer_id = self
                .availability
                .get(&slot_id)
                .ok_or(BookingError::NotFound(slot_id))?
                .trainer_id;
            let _locks = self.locks.acquire([LockKey::Trainer(trainer_id)]).await;
            let slot = self
                .availability
                .get(&slot_id)
                .ok_or(BookingError::NotFound(slot_id))?;

            if slot.status == SlotStatus::Available {
                let covered = self
                    .scheduler
                    .active_on(ResourceKey::trainer(trainer_id))
                    .into_iter()
                    .find(|b| matches!(b, Booking::Session(_)) && slot.interval.contains(&b.interval()));
                if let Some(session) = covered {
                    return Err(BookingError::TrainerBusy {
                        trainer_id,
                        conflicting: session.id(),
                    });
                }
            }

            let event = Event::SlotRemoved { id: slot.id, trainer_id };
            self.persist(&event).await?;
            self.availability.remove(&slot_id);
            self.publish(&event, &[]);
            info!(%slot_id, %trainer_id, "availability slot removed");
            Ok(slot)
        })
        .await
    }

    // ── Sessions ─────────────────────────────────────────────

    /// Book a one-to-one session. Checks, in order: trainer availability,
    /// trainer conflicts, room conflicts.
    pub async fn book_session(
        &self,
        trainer_id: TrainerId,
        room_id: RoomId,
        member_id: MemberId,
        interval: TimeInterval,
    ) -> Result<Session, BookingError> {
        observed("book_session", async {
            validate_interval(&interval)?;
            self.require_trainer(trainer_id)?;
            self.require_member(member_id)?;
            self.get_room(room_id)?;
            let _locks = self
                .locks
                .acquire([LockKey::Trainer(trainer_id), LockKey::Room(room_id)])
                .await;
            self.require_open_room(room_id)?;

            if !self.availability.is_covered(trainer_id, interval.date(), &interval) {
                return Err(BookingError::TrainerUnavailable { trainer_id, interval });
            }
            let session = Session {
                id: Ulid::new(),
                trainer_id,
                room_id,
                member_id,
                interval,
                status: BookingStatus::Scheduled,
            };
            check_resources_free(&self.scheduler, &session.occupancy(), None)?;

            let event = Event::SessionBooked(session.clone());
            self.persist(&event).await?;
            self.scheduler.register(Booking::Session(session.clone()));
            metrics::gauge!(observability::ACTIVE_BOOKINGS).increment(1.0);
            self.publish(&event, &[]);
            info!(session_id = %session.id, %trainer_id, %room_id, %member_id, "session booked");
            Ok(session)
        })
        .await
    }

    /// Move a session to another trainer, room or time. A session may be
    /// rescheduled onto its own current interval.
    pub async fn reschedule_session(
        &self,
        session_id: BookingId,
        change: SessionChange,
    ) -> Result<Session, BookingError> {
        observed("reschedule_session", async {
            if let Some(interval) = &change.interval {
                validate_interval(interval)?;
            }
            if let Some(trainer_id) = change.trainer_id {
                self.require_trainer(trainer_id)?;
            }
            if let Some(room_id) = change.room_id {
                self.get_room(room_id)?;
            }
            self.session(session_id)?;

            let mut extra = Vec::new();
            extra.extend(change.trainer_id.map(LockKey::Trainer));
            extra.extend(change.room_id.map(LockKey::Room));
            let (current, _locks) = self.lock_booking(session_id, &extra).await?;
            let Booking::Session(previous) = current else {
                return Err(BookingError::NotFound(session_id));
            };
            if previous.status.is_terminal() {
                return Err(BookingError::InvalidTransition {
                    id: session_id,
                    status: previous.status,
                });
            }

            let updated = Session {
                trainer_id: change.trainer_id.unwrap_or(previous.trainer_id),
                room_id: change.room_id.unwrap_or(previous.room_id),
                interval: change.interval.unwrap_or(previous.interval),
                ..previous.clone()
            };
            self.require_open_room(updated.room_id)?;
            if !self
                .availability
                .is_covered(updated.trainer_id, updated.interval.date(), &updated.interval)
            {
                return Err(BookingError::TrainerUnavailable {
                    trainer_id: updated.trainer_id,
                    interval: updated.interval,
                });
            }
            check_resources_free(&self.scheduler, &updated.occupancy(), Some(session_id))?;

            let event = Event::SessionUpdated(updated.clone());
            self.persist(&event).await?;
            self.scheduler.replace(Booking::Session(updated.clone()));
            self.publish(&event, &[previous.trainer_id, previous.room_id]);
            info!(%session_id, "session rescheduled");
            Ok(updated)
        })
        .await
    }

    pub async fn cancel_session(&self, session_id: BookingId) -> Result<Session, BookingError> {
        observed("cancel_session", async {
            self.session(session_id)?;
            match self.transition(session_id, BookingStatus::Cancelled).await? {
                Booking::Session(s) => Ok(s),
                Booking::Class(_) => Err(BookingError::NotFound(session_id)),
            }
        })
        .await
    }

    pub async fn complete_session(&self, session_id: BookingId) -> Result<Session, BookingError> {
        observed("complete_session", async {
            self.session(session_id)?;
            match self.transition(session_id, BookingStatus::Completed).await? {
                Booking::Session(s) => Ok(s),
                Booking::Class(_) => Err(BookingError::NotFound(session_id)),
            }
        })
        .await
    }

    // ── Classes ──────────────────────────────────────────────

    /// Create a group class. Classes are checked for trainer and room
    /// conflicts only, not against the trainer's declared availability.
    pub async fn create_class(
        &self,
        trainer_id: TrainerId,
        room_id: RoomId,
        interval: TimeInterval,
        capacity: u32,
        name: &str,
    ) -> Result<ClassSession, BookingError> {
        observed("create_class", async {
            validate_interval(&interval)?;
            validate_name(name, "class name")?;
            validate_capacity(capacity)?;
            self.require_trainer(trainer_id)?;
            self.get_room(room_id)?;
            let _locks = self
                .locks
                .acquire([LockKey::Trainer(trainer_id), LockKey::Room(room_id)])
                .await;
            let seats = self.require_open_room(room_id)?;
            if capacity > seats {
                return Err(BookingError::Validation(format!(
                    "class capacity {capacity} exceeds room capacity {seats}"
                )));
            }

            let class = ClassSession {
                id: Ulid::new(),
                trainer_id,
                room_id,
                name: name.to_owned(),
                capacity,
                interval,
                status: BookingStatus::Scheduled,
            };
            check_resources_free(&self.scheduler, &class.occupancy(), None)?;

            let event = Event::ClassCreated(class.clone());
            self.persist(&event).await?;
            self.capacity.open_class(class.id, capacity);
            self.scheduler.register(Booking::Class(class.clone()));
            metrics::gauge!(observability::ACTIVE_BOOKINGS).increment(1.0);
            self.publish(&event, &[]);
            info!(class_id = %class.id, %trainer_id, %room_id, capacity, "class created");
            Ok(class)
        })
        .await
    }

    /// Edit a scheduled class. Moves are conflict-checked against everything
    /// but the class itself; capacity may not drop below the current roster.
    pub async fn update_class(
        &self,
        class_id: BookingId,
        change: ClassChange,
    ) -> Result<ClassSession, BookingError> {
        observed("update_class", async {
            if let Some(interval) = &change.interval {
                validate_interval(interval)?;
            }
            if let Some(name) = &change.name {
                validate_name(name, "class name")?;
            }
            if let Some(capacity) = change.capacity {
                validate_capacity(capacity)?;
            }
            if let Some(trainer_id) = change.trainer_id {
                self.require_trainer(trainer_id)?;
            }
            if let Some(room_id) = change.room_id {
                self.get_room(room_id)?;
            }
            self.class(class_id)?;

            let mut extra = Vec::new();
            extra.extend(change.trainer_id.map(LockKey::Trainer));
            extra.extend(change.room_id.map(LockKey::Room));
            let (current, _locks) = self.lock_booking(class_id, &extra).await?;
            let Booking::Class(previous) = current else {
                return Err(BookingError::NotFound(class_id));
            };
            if previous.status.is_terminal() {
                return Err(BookingError::InvalidTransition {
                    id: class_id,
                    status: previous.status,
                });
            }

            let updated = ClassSession {
                trainer_id: change.trainer_id.unwrap_or(previous.trainer_id),
                room_id: change.room_id.unwrap_or(previous.room_id),
                interval: change.interval.unwrap_or(previous.interval),
                capacity: change.capacity.unwrap_or(previous.capacity),
                name: change.name.clone().unwrap_or_else(|| previous.name.clone()),
                ..previous.clone()
            };
            let seats = self.require_open_room(updated.room_id)?;
            if updated.capacity > seats {
                return Err(BookingError::Validation(format!(
                    "class capacity {} exceeds room capacity {seats}",
                    updated.capacity
                )));
            }
            self.capacity.check_capacity(class_id, updated.capacity)?;
            check_resources_free(&self.scheduler, &updated.occupancy(), Some(class_id))?;

            let event = Event::ClassUpdated(updated.clone());
            self.persist(&event).await?;
            self.capacity.set_capacity(class_id, updated.capacity)?;
            self.scheduler.replace(Booking::Class(updated.clone()));
            self.publish(&event, &[previous.trainer_id, previous.room_id]);
            info!(%class_id, "class updated");
            Ok(updated)
        })
        .await
    }

    /// Cancelling frees the class's trainer and room immediately and closes
    /// it to new enrollments. The roster is kept.
    pub async fn cancel_class(&self, class_id: BookingId) -> Result<ClassSession, BookingError> {
        observed("cancel_class", async {
            self.class(class_id)?;
            match self.transition(class_id, BookingStatus::Cancelled).await? {
                Booking::Class(c) => Ok(c),
                Booking::Session(_) => Err(BookingError::NotFound(class_id)),
            }
        })
        .await
    }

    pub async fn complete_class(&self, class_id: BookingId) -> Result<ClassSession, BookingError> {
        observed("complete_class", async {
            self.class(class_id)?;
            match self.transition(class_id, BookingStatus::Completed).await? {
                Booking::Class(c) => Ok(c),
                Booking::Session(_) => Err(BookingError::NotFound(class_id)),
            }
        })
        .await
    }

    pub async fn register_for_class(
        &self,
        class_id: BookingId,
        member_id: MemberId,
    ) -> Result<Enrollment, BookingError> {
        observed("register_for_class", async {
            self.require_member(member_id)?;
            self.class(class_id)?;
            let _locks = self.locks.acquire([LockKey::Class(class_id)]).await;
            let class = self.class(class_id)?;
            if class.status != BookingStatus::Scheduled {
                return Err(BookingError::InvalidTransition {
                    id: class_id,
                    status: class.status,
                });
            }

            let enrollment = self.capacity.try_enroll(class_id, member_id)?;
            let event = Event::Enrolled(enrollment);
            if let Err(e) = self.persist(&event).await {
                self.capacity.unenroll(&class_id, &member_id);
                return Err(e);
            }
            self.publish(&event, &[]);
            info!(%class_id, %member_id, "member enrolled");
            Ok(enrollment)
        })
        .await
    }

    /// Returns whether the member was enrolled. Calling it again is a no-op.
    pub async fn unenroll(&self, class_id: BookingId, member_id: MemberId) -> Result<bool, BookingError> {
        observed("unenroll", async {
            self.class(class_id)?;
            let _locks = self.locks.acquire([LockKey::Class(class_id)]).await;
            let class = self.class(class_id)?;
            if !self.capacity.is_enrolled(&class_id, &member_id) {
                return Ok(false);
            }
            if class.status.is_terminal() {
                return Err(BookingError::InvalidTransition {
                    id: class_id,
                    status: class.status,
                });
            }

            let enrollment = Enrollment { class_id, member_id };
            let event = Event::Unenrolled(enrollment);
            self.persist(&event).await?;
            self.capacity.unenroll(&class_id, &member_id);
            self.publish(&event, &[]);
            info!(%class_id, %member_id, "member unenrolled");
            Ok(true)
        })
        .await
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Move a scheduled booking to a terminal status.
    async fn transition(&self, id: BookingId, to: BookingStatus) -> Result<Booking, BookingError> {
        let (current, _locks) = self.lock_booking(id, &[]).await?;
        if current.status().is_terminal() {
            return Err(BookingError::InvalidTransition {
                id,
                status: current.status(),
            });
        }

        let (updated, event) = match current {
            Booking::Session(s) => {
                let s = Session { status: to, ..s };
                (Booking::Session(s.clone()), Event::SessionUpdated(s))
            }
            Booking::Class(c) => {
                let c = ClassSession { status: to, ..c };
                (Booking::Class(c.clone()), Event::ClassUpdated(c))
            }
        };
        self.persist(&event).await?;
        self.scheduler.replace(updated.clone());
        if to == BookingStatus::Cancelled {
            metrics::gauge!(observability::ACTIVE_BOOKINGS).decrement(1.0);
        }
        self.publish(&event, &[]);
        info!(booking_id = %id, status = %to, "booking status changed");
        Ok(updated)
    }

    /// Permanently delete cancelled bookings, and the rosters of cancelled
    /// classes. Returns how many bookings were removed.
    pub async fn purge_cancelled(&self) -> Result<usize, BookingError> {
        observed("purge_cancelled", async {
            let candidates: Vec<BookingId> = self
                .scheduler
                .all()
                .into_iter()
                .filter(|b| b.status() == BookingStatus::Cancelled)
                .map(|b| b.id())
                .collect();

            let mut purged = 0;
            for id in candidates {
                let (current, _locks) = match self.lock_booking(id, &[]).await {
                    Ok(locked) => locked,
                    Err(BookingError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                };
                if current.status() != BookingStatus::Cancelled {
                    continue;
                }
                let occ = current.occupancy();
                let event = match current {
                    Booking::Session(_) => Event::SessionDeleted { id },
                    Booking::Class(_) => Event::ClassDeleted { id },
                };
                self.persist(&event).await?;
                self.scheduler.remove(&id);
                if matches!(event, Event::ClassDeleted { .. }) {
                    self.capacity.close_class(&id);
                }
                self.publish(&event, &[occ.trainer_id, occ.room_id]);
                self.notify.remove(&id);
                purged += 1;
            }
            if purged > 0 {
                info!(purged, "cancelled bookings purged");
            }
            Ok(purged)
        })
        .await
    }
}
