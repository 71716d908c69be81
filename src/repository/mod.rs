//! Persistence collaborator for the booking engine.
//!
//! Every write is an [`Event`]; implementations only need to know how to
//! record one, hand back a [`Snapshot`] at startup, and answer the per-resource
//! query used by schedule views.

mod durable;
mod memory;

pub use durable::WalRepository;
pub use memory::MemoryRepository;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("WAL error: {0}")]
    Wal(#[from] std::io::Error),
    #[error("WAL writer shut down")]
    WriterClosed,
}

/// Everything a repository holds, enough to rebuild the engine's indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub trainers: Vec<Trainer>,
    pub rooms: Vec<Room>,
    pub members: Vec<Member>,
    pub slots: Vec<AvailabilitySlot>,
    pub sessions: Vec<Session>,
    pub classes: Vec<ClassSession>,
    pub enrollments: Vec<Enrollment>,
}

impl Snapshot {
    /// Minimal event sequence that recreates this snapshot, parents before children.
    pub fn into_events(self) -> Vec<Event> {
        let mut events = Vec::new();
        events.extend(self.trainers.into_iter().map(Event::TrainerRegistered));
        events.extend(self.rooms.into_iter().map(Event::RoomRegistered));
        events.extend(self.members.into_iter().map(Event::MemberRegistered));
        events.extend(self.slots.into_iter().map(Event::SlotAdded));
        events.extend(self.sessions.into_iter().map(Event::SessionBooked));
        events.extend(self.classes.into_iter().map(Event::ClassCreated));
        events.extend(self.enrollments.into_iter().map(Event::Enrolled));
        events
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Durably record one write. Must not return `Ok` before the write is persisted.
    async fn record(&self, event: Event) -> Result<(), RepoError>;

    async fn load(&self) -> Result<Snapshot, RepoError>;

    /// Non-cancelled sessions and classes holding the resource, in start order.
    async fn query_active_by_resource(
        &self,
        kind: ResourceKind,
        resource_id: Ulid,
    ) -> Result<Vec<Booking>, RepoError>;

    async fn insert_trainer(&self, trainer: &Trainer) -> Result<(), RepoError> {
        self.record(Event::TrainerRegistered(trainer.clone())).await
    }

    async fn insert_room(&self, room: &Room) -> Result<(), RepoError> {
        self.record(Event::RoomRegistered(room.clone())).await
    }

    async fn update_room(&self, room: &Room) -> Result<(), RepoError> {
        self.record(Event::RoomUpdated(room.clone())).await
    }

    async fn insert_member(&self, member: &Member) -> Result<(), RepoError> {
        self.record(Event::MemberRegistered(member.clone())).await
    }

    async fn insert_slot(&self, slot: &AvailabilitySlot) -> Result<(), RepoError> {
        self.record(Event::SlotAdded(slot.clone())).await
    }

    async fn delete_slot(&self, slot: &AvailabilitySlot) -> Result<(), RepoError> {
        self.record(Event::SlotRemoved {
            id: slot.id,
            trainer_id: slot.trainer_id,
        })
        .await
    }

    async fn insert_session(&self, session: &Session) -> Result<(), RepoError> {
        self.record(Event::SessionBooked(session.clone())).await
    }

    async fn update_session(&self, session: &Session) -> Result<(), RepoError> {
        self.record(Event::SessionUpdated(session.clone())).await
    }

    async fn delete_session(&self, id: BookingId) -> Result<(), RepoError> {
        self.record(Event::SessionDeleted { id }).await
    }

    async fn insert_class(&self, class: &ClassSession) -> Result<(), RepoError> {
        self.record(Event::ClassCreated(class.clone())).await
    }

    async fn update_class(&self, class: &ClassSession) -> Result<(), RepoError> {
        self.record(Event::ClassUpdated(class.clone())).await
    }

    /// Also drops the class's enrollments.
    async fn delete_class(&self, id: BookingId) -> Result<(), RepoError> {
        self.record(Event::ClassDeleted { id }).await
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<(), RepoError> {
        self.record(Event::Enrolled(*enrollment)).await
    }

    async fn delete_enrollment(&self, enrollment: &Enrollment) -> Result<(), RepoError> {
        self.record(Event::Unenrolled(*enrollment)).await
    }
}
