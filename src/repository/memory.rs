use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ulid::Ulid;

use crate::model::*;

use super::{RepoError, Repository, Snapshot};

/// Table-per-entity store. Also the materialized view behind [`super::WalRepository`].
pub struct MemoryRepository {
    trainers: DashMap<TrainerId, Trainer>,
    rooms: DashMap<RoomId, Room>,
    members: DashMap<MemberId, Member>,
    slots: DashMap<SlotId, AvailabilitySlot>,
    sessions: DashMap<BookingId, Session>,
    classes: DashMap<BookingId, ClassSession>,
    enrollments: DashSet<Enrollment>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            trainers: DashMap::new(),
            rooms: DashMap::new(),
            members: DashMap::new(),
            slots: DashMap::new(),
            sessions: DashMap::new(),
            classes: DashMap::new(),
            enrollments: DashSet::new(),
        }
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let repo = Self::new();
        for event in events {
            repo.apply(event);
        }
        repo
    }

    // ── Event application ────────────────────────────────────

    pub fn apply(&self, event: &Event) {
        match event {
            Event::TrainerRegistered(t) => {
                self.trainers.insert(t.id, t.clone());
            }
            Event::RoomRegistered(r) | Event::RoomUpdated(r) => {
                self.rooms.insert(r.id, r.clone());
            }
            Event::MemberRegistered(m) => {
                self.members.insert(m.id, m.clone());
            }
            Event::SlotAdded(s) => {
                self.slots.insert(s.id, s.clone());
            }
            Event::SlotRemoved { id, .. } => {
                self.slots.remove(id);
            }
            Event::SessionBooked(s) | Event::SessionUpdated(s) => {
                self.sessions.insert(s.id, s.clone());
            }
            Event::SessionDeleted { id } => {
                self.sessions.remove(id);
            }
            Event::ClassCreated(c) | Event::ClassUpdated(c) => {
                self.classes.insert(c.id, c.clone());
            }
            Event::ClassDeleted { id } => {
                self.classes.remove(id);
                self.enrollments.retain(|e| e.class_id != *id);
            }
            Event::Enrolled(e) => {
                self.enrollments.insert(*e);
            }
            Event::Unenrolled(e) => {
                self.enrollments.remove(e);
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        fn collect<K, V>(map: &DashMap<K, V>) -> Vec<V>
        where
            K: Eq + std::hash::Hash + Ord + Copy,
            V: Clone,
        {
            let mut rows: Vec<(K, V)> = map.iter().map(|e| (*e.key(), e.value().clone())).collect();
            rows.sort_by_key(|(k, _)| *k);
            rows.into_iter().map(|(_, v)| v).collect()
        }

        let mut enrollments: Vec<Enrollment> = self.enrollments.iter().map(|e| *e).collect();
        enrollments.sort_by_key(|e| (e.class_id, e.member_id));

        Snapshot {
            trainers: collect(&self.trainers),
            rooms: collect(&self.rooms),
            members: collect(&self.members),
            slots: collect(&self.slots),
            sessions: collect(&self.sessions),
            classes: collect(&self.classes),
            enrollments,
        }
    }

    pub(super) fn active_by_resource(&self, kind: ResourceKind, resource_id: Ulid) -> Vec<Booking> {
        let key = ResourceKey { kind, id: resource_id };
        let mut bookings: Vec<Booking> = self
            .sessions
            .iter()
            .map(|e| Booking::Session(e.value().clone()))
            .chain(self.classes.iter().map(|e| Booking::Class(e.value().clone())))
            .filter(|b| b.is_active() && b.holds(key))
            .collect();
        bookings.sort_by_key(|b| (b.interval().start, b.id()));
        bookings
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn record(&self, event: Event) -> Result<(), RepoError> {
        self.apply(&event);
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, RepoError> {
        Ok(self.snapshot())
    }

    async fn query_active_by_resource(
        &self,
        kind: ResourceKind,
        resource_id: Ulid,
    ) -> Result<Vec<Booking>, RepoError> {
        Ok(self.active_by_resource(kind, resource_id))
    }
}
