mod availability;
mod capacity;
mod conflict;
mod error;
mod locks;
mod mutations;
mod queries;
mod scheduler;

pub use availability::{AvailabilityIndex, AvailableIter, AvailableSlots, merge_overlapping, subtract_intervals};
pub use capacity::CapacityTracker;
pub use error::BookingError;
pub use locks::{LockKey, LockSet, LockTable};
pub use scheduler::ResourceScheduler;

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{self, OpTimer};
use crate::repository::Repository;

/// Facade over the indices. Every mutation runs check-and-commit under the
/// keyed locks of the resources it touches, persists through the repository,
/// and only then updates the in-memory indices.
pub struct BookingService {
    repo: Arc<dyn Repository>,
    availability: AvailabilityIndex,
    scheduler: ResourceScheduler,
    capacity: CapacityTracker,
    locks: LockTable,
    trainers: DashMap<TrainerId, Trainer>,
    rooms: DashMap<RoomId, Room>,
    members: DashMap<MemberId, Member>,
    pub notify: Arc<NotifyHub>,
}

/// Topics a committed event is published on.
fn event_topics(event: &Event) -> Vec<Ulid> {
    match event {
        Event::TrainerRegistered(t) => vec![t.id],
        Event::RoomRegistered(r) | Event::RoomUpdated(r) => vec![r.id],
        Event::MemberRegistered(m) => vec![m.id],
        Event::SlotAdded(s) => vec![s.trainer_id],
        Event::SlotRemoved { trainer_id, .. } => vec![*trainer_id],
        Event::SessionBooked(s) | Event::SessionUpdated(s) => {
            vec![s.trainer_id, s.room_id, s.member_id, s.id]
        }
        Event::ClassCreated(c) | Event::ClassUpdated(c) => vec![c.trainer_id, c.room_id, c.id],
        Event::SessionDeleted { id } | Event::ClassDeleted { id } => vec![*id],
        Event::Enrolled(e) | Event::Unenrolled(e) => vec![e.class_id, e.member_id],
    }
}

/// Lock set a booking's check-and-commit needs: its trainer and room, plus the
/// roster for classes.
fn booking_lock_keys(booking: &Booking) -> Vec<LockKey> {
    let occ = booking.occupancy();
    let mut keys = vec![LockKey::Trainer(occ.trainer_id), LockKey::Room(occ.room_id)];
    if let Booking::Class(c) = booking {
        keys.push(LockKey::Class(c.id));
    }
    keys
}

/// Run one service operation, recording its outcome and latency.
async fn observed<T>(
    operation: &'static str,
    op: impl Future<Output = Result<T, BookingError>>,
) -> Result<T, BookingError> {
    let timer = OpTimer::start(operation);
    let result = op.await;
    timer.finish(&result);
    if let Err(e) = &result {
        debug!(operation, kind = e.kind(), "rejected: {e}");
    }
    result
}

impl BookingService {
    /// Rebuild every index from the repository's snapshot.
    pub async fn open(repo: Arc<dyn Repository>, notify: Arc<NotifyHub>) -> Result<Self, BookingError> {
        let snapshot = repo.load().await?;
        let service = Self {
            repo,
            availability: AvailabilityIndex::new(),
            scheduler: ResourceScheduler::new(),
            capacity: CapacityTracker::new(),
            locks: LockTable::new(),
            trainers: DashMap::new(),
            rooms: DashMap::new(),
            members: DashMap::new(),
            notify,
        };

        for trainer in snapshot.trainers {
            service.trainers.insert(trainer.id, trainer);
        }
        for room in snapshot.rooms {
            service.rooms.insert(room.id, room);
        }
        for member in snapshot.members {
            service.members.insert(member.id, member);
        }
        for slot in snapshot.slots {
            service.availability.insert(slot);
        }
        for session in snapshot.sessions {
            service.scheduler.register(Booking::Session(session));
        }
        for class in snapshot.classes {
            service.capacity.open_class(class.id, class.capacity);
            service.scheduler.register(Booking::Class(class));
        }
        for e in snapshot.enrollments {
            if let Err(err) = service.capacity.try_enroll(e.class_id, e.member_id) {
                warn!(class_id = %e.class_id, member_id = %e.member_id, "skipping stored enrollment: {err}");
            }
        }

        let active = service.scheduler.active_count();
        metrics::gauge!(observability::ACTIVE_BOOKINGS).set(active as f64);
        info!(
            trainers = service.trainers.len(),
            rooms = service.rooms.len(),
            members = service.members.len(),
            active_bookings = active,
            "booking service loaded"
        );
        Ok(service)
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Persist one event. Nothing in memory changes if this fails.
    async fn persist(&self, event: &Event) -> Result<(), BookingError> {
        self.repo.record(event.clone()).await?;
        Ok(())
    }

    /// Publish a committed event on its own topics plus any `also` topics.
    fn publish(&self, event: &Event, also: &[Ulid]) {
        let mut topics = event_topics(event);
        topics.extend_from_slice(also);
        self.notify.publish(&topics, event);
    }

    fn require_trainer(&self, id: TrainerId) -> Result<(), BookingError> {
        if self.trainers.contains_key(&id) {
            Ok(())
        } else {
            Err(BookingError::NotFound(id))
        }
    }

    fn require_member(&self, id: MemberId) -> Result<(), BookingError> {
        if self.members.contains_key(&id) {
            Ok(())
        } else {
            Err(BookingError::NotFound(id))
        }
    }

    /// Returns the room's seat count. Closed rooms take no new bookings.
    fn require_open_room(&self, id: RoomId) -> Result<u32, BookingError> {
        let room = self.rooms.get(&id).ok_or(BookingError::NotFound(id))?;
        if !room.available {
            return Err(BookingError::RoomClosed(id));
        }
        Ok(room.capacity)
    }

    fn session(&self, id: BookingId) -> Result<Session, BookingError> {
        match self.scheduler.get(&id) {
            Some(Booking::Session(s)) => Ok(s),
            _ => Err(BookingError::NotFound(id)),
        }
    }

    fn class(&self, id: BookingId) -> Result<ClassSession, BookingError> {
        match self.scheduler.get(&id) {
            Some(Booking::Class(c)) => Ok(c),
            _ => Err(BookingError::NotFound(id)),
        }
    }

    /// Lock a booking's resources (plus `extra`) and return its current version.
    ///
    /// A concurrent reschedule can move the booking between the read and the
    /// lock; in that case the locks are released and taken again.
    async fn lock_booking(
        &self,
        id: BookingId,
        extra: &[LockKey],
    ) -> Result<(Booking, LockSet<'_>), BookingError> {
        loop {
            let seen = self.scheduler.get(&id).ok_or(BookingError::NotFound(id))?;
            let mut keys = booking_lock_keys(&seen);
            keys.extend_from_slice(extra);
            let locks = self.locks.acquire(keys).await;
            let current = self.scheduler.get(&id).ok_or(BookingError::NotFound(id))?;
            if current.occupancy() == seen.occupancy() {
                return Ok((current, locks));
            }
        }
    }
}
