use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::BookingError;

pub type TrainerId = Ulid;
pub type RoomId = Ulid;
pub type MemberId = Ulid;
pub type BookingId = Ulid;
pub type SlotId = Ulid;

/// Half-open interval `[start, end)` of naive local date-times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeInterval {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "TimeInterval start must be before end");
        Self { start, end }
    }

    /// Validating constructor for caller-supplied bounds.
    pub fn try_new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::Validation(format!(
                "interval end {end} must be after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The calendar day the interval starts on.
    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the interval starts on `date` and ends no later than the following midnight.
    pub fn lies_on(&self, date: NaiveDate) -> bool {
        let Some(next_day) = date.succ_opt() else {
            return false;
        };
        self.start.date() == date && self.end <= next_day.and_time(chrono::NaiveTime::MIN)
    }
}

/// Inclusive range of calendar days used by listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, BookingError> {
        if to < from {
            return Err(BookingError::Validation(format!(
                "date range ends ({to}) before it starts ({from})"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

// ── Availability ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Unavailable,
}

/// A trainer's declaration about one stretch of one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: SlotId,
    pub trainer_id: TrainerId,
    pub date: NaiveDate,
    pub interval: TimeInterval,
    pub status: SlotStatus,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Scheduled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingStatus::Scheduled => write!(f, "scheduled"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One-to-one training session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: BookingId,
    pub trainer_id: TrainerId,
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub interval: TimeInterval,
    pub status: BookingStatus,
}

/// Group class. Enrollments live in the capacity tracker, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: BookingId,
    pub trainer_id: TrainerId,
    pub room_id: RoomId,
    pub name: String,
    pub capacity: u32,
    pub interval: TimeInterval,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enrollment {
    pub class_id: BookingId,
    pub member_id: MemberId,
}

/// What a booking holds on the two shared timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub trainer_id: TrainerId,
    pub room_id: RoomId,
    pub interval: TimeInterval,
}

/// Anything that occupies a trainer timeline and a room timeline.
pub trait Occupies {
    fn occupancy(&self) -> Occupancy;
}

impl Occupies for Session {
    fn occupancy(&self) -> Occupancy {
        Occupancy {
            trainer_id: self.trainer_id,
            room_id: self.room_id,
            interval: self.interval,
        }
    }
}

impl Occupies for ClassSession {
    fn occupancy(&self) -> Occupancy {
        Occupancy {
            trainer_id: self.trainer_id,
            room_id: self.room_id,
            interval: self.interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Booking {
    Session(Session),
    Class(ClassSession),
}

impl Booking {
    pub fn id(&self) -> BookingId {
        match self {
            Booking::Session(s) => s.id,
            Booking::Class(c) => c.id,
        }
    }

    pub fn status(&self) -> BookingStatus {
        match self {
            Booking::Session(s) => s.status,
            Booking::Class(c) => c.status,
        }
    }

    pub fn interval(&self) -> TimeInterval {
        self.occupancy().interval
    }

    /// Cancelled bookings no longer hold their timelines.
    pub fn is_active(&self) -> bool {
        self.status() != BookingStatus::Cancelled
    }

    pub fn holds(&self, key: ResourceKey) -> bool {
        let occ = self.occupancy();
        match key.kind {
            ResourceKind::Trainer => occ.trainer_id == key.id,
            ResourceKind::Room => occ.room_id == key.id,
        }
    }
}

impl Occupies for Booking {
    fn occupancy(&self) -> Occupancy {
        match self {
            Booking::Session(s) => s.occupancy(),
            Booking::Class(c) => c.occupancy(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Trainer,
    Room,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: Ulid,
}

impl ResourceKey {
    pub fn trainer(id: TrainerId) -> Self {
        Self { kind: ResourceKind::Trainer, id }
    }

    pub fn room(id: RoomId) -> Self {
        Self { kind: ResourceKind::Room, id }
    }
}

// ── Directory ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trainer {
    pub id: TrainerId,
    pub first_name: String,
    pub last_name: String,
    pub speciality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
    /// Closed rooms accept no new bookings.
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// The repository record format, flat with one variant per write. Also the WAL entry payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TrainerRegistered(Trainer),
    RoomRegistered(Room),
    RoomUpdated(Room),
    MemberRegistered(Member),
    SlotAdded(AvailabilitySlot),
    SlotRemoved { id: SlotId, trainer_id: TrainerId },
    SessionBooked(Session),
    SessionUpdated(Session),
    SessionDeleted { id: BookingId },
    ClassCreated(ClassSession),
    ClassUpdated(ClassSession),
    ClassDeleted { id: BookingId },
    Enrolled(Enrollment),
    Unenrolled(Enrollment),
}

// ── Query types ──────────────────────────────────────────────────

/// Whose schedule a query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Member(MemberId),
    Trainer(TrainerId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassFilter {
    pub trainer_id: Option<TrainerId>,
    pub room_id: Option<RoomId>,
    pub dates: Option<DateRange>,
    /// Only classes that still have free seats.
    pub open_only: bool,
    pub include_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    #[serde(flatten)]
    pub class: ClassSession,
    pub enrolled: u32,
}

impl ClassInfo {
    pub fn seats_left(&self) -> u32 {
        self.class.capacity.saturating_sub(self.enrolled)
    }
}

/// A bookable gap: part of an Available slot not taken by any active booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeWindow {
    pub trainer_id: TrainerId,
    pub date: NaiveDate,
    pub interval: TimeInterval,
}

/// Partial update for a session; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionChange {
    pub trainer_id: Option<TrainerId>,
    pub room_id: Option<RoomId>,
    pub interval: Option<TimeInterval>,
}

/// Partial update for a class; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassChange {
    pub trainer_id: Option<TrainerId>,
    pub room_id: Option<RoomId>,
    pub interval: Option<TimeInterval>,
    pub capacity: Option<u32>,
    pub name: Option<String>,
}

#[cfg(test)]
pub(crate) fn at(date: &str, hm: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{date}T{hm}"), "%Y-%m-%dT%H:%M").unwrap()
}

#[cfg(test)]
pub(crate) fn day(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
}

#[cfg(test)]
pub(crate) fn span(date: &str, from: &str, to: &str) -> TimeInterval {
    TimeInterval::new(at(date, from), at(date, to))
}
