/// Longest trainer, room, member or class name accepted.
pub const MAX_NAME_LEN: usize = 128;

/// Largest seat count a class may declare.
pub const MAX_CLASS_CAPACITY: u32 = 500;

/// Longest single booking or availability slot, in minutes.
pub const MAX_INTERVAL_MINUTES: i64 = 24 * 60;

/// Widest date range a listing query may cover, in days.
pub const MAX_QUERY_DAYS: i64 = 366;

/// Availability slots a single trainer may hold.
pub const MAX_SLOTS_PER_TRAINER: usize = 10_000;
