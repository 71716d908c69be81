use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::BookingError;

/// Calendar order: date, then start time, then id for uniqueness.
type SlotKey = (NaiveDate, NaiveDateTime, SlotId);
type Calendar = BTreeMap<SlotKey, AvailabilitySlot>;

fn slot_key(slot: &AvailabilitySlot) -> SlotKey {
    (slot.date, slot.interval.start, slot.id)
}

fn day_start_key(date: NaiveDate) -> SlotKey {
    (date, NaiveDateTime::MIN, Ulid::nil())
}

/// Per-trainer calendar of declared availability.
///
/// Each trainer's calendar is copy-on-write: readers take a cheap `Arc` snapshot,
/// writers clone only when a snapshot is still alive.
pub struct AvailabilityIndex {
    calendars: DashMap<TrainerId, Arc<Calendar>>,
    slot_to_trainer: DashMap<SlotId, TrainerId>,
}

impl Default for AvailabilityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            slot_to_trainer: DashMap::new(),
        }
    }

    /// Validate a prospective slot without recording it.
    ///
    /// Any existing slot on the same trainer/date that overlaps is rejected,
    /// whatever its status: a trainer cannot say two things about one moment.
    pub fn check_slot(
        &self,
        trainer_id: TrainerId,
        date: NaiveDate,
        interval: &TimeInterval,
    ) -> Result<(), BookingError> {
        if !interval.lies_on(date) {
            return Err(BookingError::Validation(format!(
                "slot {}–{} does not fall on {date}",
                interval.start, interval.end
            )));
        }
        let Some(calendar) = self.snapshot(&trainer_id) else {
            return Ok(());
        };
        if calendar.len() >= MAX_SLOTS_PER_TRAINER {
            return Err(BookingError::LimitExceeded("too many availability slots for trainer"));
        }
        let clash = calendar
            .range(day_start_key(date)..)
            .take_while(|(k, _)| k.0 == date)
            .find(|(_, slot)| slot.interval.overlaps(interval));
        match clash {
            Some((_, existing)) => Err(BookingError::Overlap {
                trainer_id,
                existing: existing.id,
            }),
            None => Ok(()),
        }
    }

    /// Record a slot that has already passed `check_slot`.
    pub fn insert(&self, slot: AvailabilitySlot) {
        self.slot_to_trainer.insert(slot.id, slot.trainer_id);
        let mut calendar = self.calendars.entry(slot.trainer_id).or_default();
        Arc::make_mut(&mut calendar).insert(slot_key(&slot), slot);
    }

    /// Check and record in one step.
    pub fn add_slot(
        &self,
        trainer_id: TrainerId,
        date: NaiveDate,
        interval: TimeInterval,
        status: SlotStatus,
    ) -> Result<AvailabilitySlot, BookingError> {
        self.check_slot(trainer_id, date, &interval)?;
        let slot = AvailabilitySlot {
            id: Ulid::new(),
            trainer_id,
            date,
            interval,
            status,
        };
        self.insert(slot.clone());
        Ok(slot)
    }

    pub fn get(&self, slot_id: &SlotId) -> Option<AvailabilitySlot> {
        let trainer_id = *self.slot_to_trainer.get(slot_id)?.value();
        self.snapshot(&trainer_id)?
            .values()
            .find(|s| s.id == *slot_id)
            .cloned()
    }

    pub fn remove(&self, slot_id: &SlotId) -> Option<AvailabilitySlot> {
        let (_, trainer_id) = self.slot_to_trainer.remove(slot_id)?;
        let mut calendar = self.calendars.get_mut(&trainer_id)?;
        let key = calendar
            .iter()
            .find(|(_, s)| s.id == *slot_id)
            .map(|(k, _)| *k)?;
        Arc::make_mut(&mut calendar).remove(&key)
    }

    /// True iff one single Available slot contains the whole interval.
    /// Two adjacent Available slots do not jointly cover a span crossing their boundary.
    pub fn is_covered(&self, trainer_id: TrainerId, date: NaiveDate, interval: &TimeInterval) -> bool {
        let Some(calendar) = self.snapshot(&trainer_id) else {
            return false;
        };
        calendar
            .range(day_start_key(date)..)
            .take_while(|(k, _)| k.0 == date)
            .any(|(_, slot)| slot.status == SlotStatus::Available && slot.interval.contains(interval))
    }

    /// Available slots for a trainer within `range`, ordered by date then start time.
    pub fn list_available(&self, trainer_id: TrainerId, range: DateRange) -> AvailableSlots {
        AvailableSlots {
            calendar: self.snapshot(&trainer_id).unwrap_or_default(),
            range,
        }
    }

    pub fn slot_count(&self, trainer_id: &TrainerId) -> usize {
        self.calendars.get(trainer_id).map_or(0, |c| c.len())
    }

    pub fn all_slots(&self) -> Vec<AvailabilitySlot> {
        self.calendars
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect()
    }

    fn snapshot(&self, trainer_id: &TrainerId) -> Option<Arc<Calendar>> {
        self.calendars.get(trainer_id).map(|e| e.value().clone())
    }
}

/// Restartable view over a snapshot of one trainer's calendar.
/// Later writes to the index are not visible through an existing view.
pub struct AvailableSlots {
    calendar: Arc<Calendar>,
    range: DateRange,
}

impl AvailableSlots {
    pub fn iter(&self) -> AvailableIter<'_> {
        AvailableIter {
            inner: self.calendar.range(day_start_key(self.range.from)..),
            to: self.range.to,
        }
    }
}

impl<'a> IntoIterator for &'a AvailableSlots {
    type Item = &'a AvailabilitySlot;
    type IntoIter = AvailableIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct AvailableIter<'a> {
    inner: btree_map::Range<'a, SlotKey, AvailabilitySlot>,
    to: NaiveDate,
}

impl<'a> Iterator for AvailableIter<'a> {
    type Item = &'a AvailabilitySlot;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, slot) = self.inner.next()?;
            if key.0 > self.to {
                return None;
            }
            if slot.status == SlotStatus::Available {
                return Some(slot);
            }
        }
    }
}

// ── Interval arithmetic ───────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[TimeInterval]) -> Vec<TimeInterval> {
    let mut merged: Vec<TimeInterval> = Vec::new();
    for &interval in sorted {
        if let Some(last) = merged.last_mut()
            && interval.start <= last.end
        {
            last.end = last.end.max(interval.end);
            continue;
        }
        merged.push(interval);
    }
    merged
}

/// Remove `to_remove` (sorted, disjoint) from `base` (sorted, disjoint).
pub fn subtract_intervals(base: &[TimeInterval], to_remove: &[TimeInterval]) -> Vec<TimeInterval> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeInterval::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeInterval::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: &str = "2024-01-10";

    fn index_with(trainer: TrainerId, slots: &[(&str, &str, &str, SlotStatus)]) -> AvailabilityIndex {
        let index = AvailabilityIndex::new();
        for (date, from, to, status) in slots {
            index
                .add_slot(trainer, day(date), span(date, from, to), *status)
                .unwrap();
        }
        index
    }

    #[test]
    fn covered_inside_single_slot() {
        let t = Ulid::new();
        let index = index_with(t, &[(D, "09:00", "17:00", SlotStatus::Available)]);
        assert!(index.is_covered(t, day(D), &span(D, "10:00", "11:00")));
        assert!(index.is_covered(t, day(D), &span(D, "09:00", "17:00")));
        assert!(!index.is_covered(t, day(D), &span(D, "08:00", "09:00")));
        assert!(!index.is_covered(t, day(D), &span(D, "16:30", "17:30")));
    }

    #[test]
    fn adjacent_slots_do_not_jointly_cover() {
        let t = Ulid::new();
        let index = index_with(
            t,
            &[
                (D, "09:00", "12:00", SlotStatus::Available),
                (D, "12:00", "15:00", SlotStatus::Available),
            ],
        );
        assert!(index.is_covered(t, day(D), &span(D, "11:00", "12:00")));
        assert!(!index.is_covered(t, day(D), &span(D, "11:30", "12:30")));
    }

    #[test]
    fn unavailable_slot_never_covers() {
        let t = Ulid::new();
        let index = index_with(t, &[(D, "09:00", "17:00", SlotStatus::Unavailable)]);
        assert!(!index.is_covered(t, day(D), &span(D, "10:00", "11:00")));
    }

    #[test]
    fn unknown_trainer_is_not_covered() {
        let index = AvailabilityIndex::new();
        assert!(!index.is_covered(Ulid::new(), day(D), &span(D, "10:00", "11:00")));
    }

    #[test]
    fn overlap_rejected_regardless_of_status() {
        let t = Ulid::new();
        let index = index_with(t, &[(D, "09:00", "12:00", SlotStatus::Unavailable)]);
        let result = index.add_slot(t, day(D), span(D, "11:00", "13:00"), SlotStatus::Available);
        assert!(matches!(result, Err(BookingError::Overlap { .. })));
        assert_eq!(index.slot_count(&t), 1);
    }

    #[test]
    fn touching_slots_allowed() {
        let t = Ulid::new();
        let index = index_with(t, &[(D, "09:00", "12:00", SlotStatus::Available)]);
        assert!(index
            .add_slot(t, day(D), span(D, "12:00", "13:00"), SlotStatus::Unavailable)
            .is_ok());
    }

    #[test]
    fn other_trainer_or_date_does_not_clash() {
        let t = Ulid::new();
        let index = index_with(t, &[(D, "09:00", "12:00", SlotStatus::Available)]);
        assert!(index
            .add_slot(Ulid::new(), day(D), span(D, "09:00", "12:00"), SlotStatus::Available)
            .is_ok());
        assert!(index
            .add_slot(t, day("2024-01-11"), span("2024-01-11", "09:00", "12:00"), SlotStatus::Available)
            .is_ok());
    }

    #[test]
    fn slot_must_lie_on_its_date() {
        let index = AvailabilityIndex::new();
        let result = index.add_slot(
            Ulid::new(),
            day("2024-01-11"),
            span(D, "09:00", "12:00"),
            SlotStatus::Available,
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn list_available_orders_and_filters() {
        let t = Ulid::new();
        let index = index_with(
            t,
            &[
                ("2024-01-12", "09:00", "10:00", SlotStatus::Available),
                (D, "14:00", "15:00", SlotStatus::Available),
                (D, "09:00", "10:00", SlotStatus::Available),
                (D, "11:00", "12:00", SlotStatus::Unavailable),
                ("2024-01-13", "09:00", "10:00", SlotStatus::Available),
            ],
        );
        let range = DateRange::new(day(D), day("2024-01-12")).unwrap();
        let listed = index.list_available(t, range);
        let starts: Vec<_> = listed.iter().map(|s| s.interval.start).collect();
        assert_eq!(
            starts,
            vec![at(D, "09:00"), at(D, "14:00"), at("2024-01-12", "09:00")]
        );
        // Restartable: a second pass yields the same sequence.
        assert_eq!(listed.iter().count(), 3);
        assert_eq!((&listed).into_iter().count(), 3);
    }

    #[test]
    fn listing_is_a_snapshot() {
        let t = Ulid::new();
        let index = index_with(t, &[(D, "09:00", "10:00", SlotStatus::Available)]);
        let range = DateRange::new(day(D), day(D)).unwrap();
        let listed = index.list_available(t, range);
        index
            .add_slot(t, day(D), span(D, "10:00", "11:00"), SlotStatus::Available)
            .unwrap();
        assert_eq!(listed.iter().count(), 1);
        assert_eq!(index.list_available(t, range).iter().count(), 2);
    }

    #[test]
    fn remove_slot_frees_the_time() {
        let t = Ulid::new();
        let index = AvailabilityIndex::new();
        let slot = index
            .add_slot(t, day(D), span(D, "09:00", "12:00"), SlotStatus::Available)
            .unwrap();
        assert_eq!(index.get(&slot.id), Some(slot.clone()));
        assert_eq!(index.remove(&slot.id), Some(slot.clone()));
        assert!(index.get(&slot.id).is_none());
        assert!(index.remove(&slot.id).is_none());
        assert!(index
            .add_slot(t, day(D), span(D, "10:00", "11:00"), SlotStatus::Available)
            .is_ok());
    }

    #[test]
    fn merge_and_subtract() {
        let merged = merge_overlapping(&[
            span(D, "09:00", "10:00"),
            span(D, "09:30", "11:00"),
            span(D, "11:00", "12:00"),
            span(D, "13:00", "14:00"),
        ]);
        assert_eq!(merged, vec![span(D, "09:00", "12:00"), span(D, "13:00", "14:00")]);

        let free = subtract_intervals(
            &[span(D, "09:00", "17:00")],
            &[span(D, "10:00", "11:00"), span(D, "16:00", "18:00")],
        );
        assert_eq!(free, vec![span(D, "09:00", "10:00"), span(D, "11:00", "16:00")]);
    }
}
