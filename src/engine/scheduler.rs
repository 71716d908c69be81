use dashmap::DashMap;

use crate::model::*;

/// Active bookings on one resource, sorted by `interval.start`.
#[derive(Debug, Default)]
struct Timeline {
    entries: Vec<(TimeInterval, BookingId)>,
}

impl Timeline {
    /// Insert maintaining sort order by start.
    fn insert(&mut self, interval: TimeInterval, id: BookingId) {
        let pos = self
            .entries
            .binary_search_by_key(&interval.start, |(i, _)| i.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, (interval, id));
    }

    fn remove(&mut self, id: BookingId) -> bool {
        if let Some(pos) = self.entries.iter().position(|(_, b)| *b == id) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Entries whose interval overlaps the query. Binary search skips
    /// everything starting at or after `query.end`.
    fn overlapping(&self, query: &TimeInterval) -> impl Iterator<Item = &(TimeInterval, BookingId)> {
        let right_bound = self.entries.partition_point(|(i, _)| i.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |(i, _)| i.end > query.start)
    }
}

/// Conflict detector over every Session and ClassSession.
///
/// Bookings live in a flat arena keyed by id. Secondary indices (per-resource
/// timelines, member → sessions) only ever hold ids, and a timeline only ever
/// holds *active* bookings, so cancelled ones are invisible to conflict scans.
pub struct ResourceScheduler {
    bookings: DashMap<BookingId, Booking>,
    timelines: DashMap<ResourceKey, Timeline>,
    by_member: DashMap<MemberId, Vec<BookingId>>,
}

impl Default for ResourceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceScheduler {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            timelines: DashMap::new(),
            by_member: DashMap::new(),
        }
    }

    /// Id of an active booking on the resource overlapping `interval`, other than `exclude`.
    pub fn find_conflict(
        &self,
        kind: ResourceKind,
        resource_id: ulid::Ulid,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
    ) -> Option<BookingId> {
        let key = ResourceKey { kind, id: resource_id };
        let timeline = self.timelines.get(&key)?;
        timeline
            .overlapping(interval)
            .map(|(_, id)| *id)
            .find(|id| Some(*id) != exclude)
    }

    pub fn has_conflict(
        &self,
        kind: ResourceKind,
        resource_id: ulid::Ulid,
        interval: &TimeInterval,
        exclude: Option<BookingId>,
    ) -> bool {
        self.find_conflict(kind, resource_id, interval, exclude).is_some()
    }

    /// Add a booking to the arena and, if active, to its trainer and room timelines.
    pub fn register(&self, booking: Booking) {
        let id = booking.id();
        if booking.is_active() {
            let occ = booking.occupancy();
            for key in [ResourceKey::trainer(occ.trainer_id), ResourceKey::room(occ.room_id)] {
                self.timelines.entry(key).or_default().insert(occ.interval, id);
            }
        }
        if let Booking::Session(session) = &booking {
            let mut ids = self.by_member.entry(session.member_id).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.bookings.insert(id, booking);
    }

    /// Swap in a new version of a booking, re-indexing its timelines.
    pub fn replace(&self, booking: Booking) -> Option<Booking> {
        let previous = self.unindex(&booking.id());
        self.register(booking);
        previous
    }

    /// Drop a booking from the arena and every index.
    pub fn remove(&self, id: &BookingId) -> Option<Booking> {
        self.unindex(id)?;
        self.bookings.remove(id).map(|(_, b)| b)
    }

    fn unindex(&self, id: &BookingId) -> Option<Booking> {
        let previous = self.bookings.get(id).map(|e| e.value().clone())?;
        let occ = previous.occupancy();
        for key in [ResourceKey::trainer(occ.trainer_id), ResourceKey::room(occ.room_id)] {
            if let Some(mut timeline) = self.timelines.get_mut(&key) {
                timeline.remove(*id);
            }
        }
        if let Booking::Session(session) = &previous
            && let Some(mut ids) = self.by_member.get_mut(&session.member_id)
        {
            ids.retain(|b| b != id);
        }
        Some(previous)
    }

    pub fn get(&self, id: &BookingId) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// Active bookings holding the resource, in start order.
    pub fn active_on(&self, key: ResourceKey) -> Vec<Booking> {
        let ids: Vec<BookingId> = match self.timelines.get(&key) {
            Some(timeline) => timeline.entries.iter().map(|(_, id)| *id).collect(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Intervals the resource is busy within `window`, sorted and merged-ready.
    pub fn busy_within(&self, key: ResourceKey, window: &TimeInterval) -> Vec<TimeInterval> {
        match self.timelines.get(&key) {
            Some(timeline) => timeline.overlapping(window).map(|(i, _)| *i).collect(),
            None => Vec::new(),
        }
    }

    pub fn sessions_for_member(&self, member_id: &MemberId) -> Vec<Session> {
        let ids = match self.by_member.get(member_id) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| match self.get(id) {
                Some(Booking::Session(s)) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn all(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }

    pub fn active_count(&self) -> usize {
        self.bookings.iter().filter(|e| e.value().is_active()).count()
    }
}
