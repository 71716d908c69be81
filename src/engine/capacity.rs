use std::collections::HashSet;

use dashmap::DashMap;

use crate::model::*;

use super::BookingError;

#[derive(Debug, Clone)]
struct Roster {
    capacity: u32,
    members: HashSet<MemberId>,
}

/// Seat accounting for group classes.
///
/// Check and insert happen under the same roster entry guard, so two callers
/// can never both take the last seat.
pub struct CapacityTracker {
    rosters: DashMap<BookingId, Roster>,
}

impl Default for CapacityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityTracker {
    pub fn new() -> Self {
        Self {
            rosters: DashMap::new(),
        }
    }

    /// Start tracking a class with an empty roster. Re-opening keeps existing members.
    pub fn open_class(&self, class_id: BookingId, capacity: u32) {
        self.rosters
            .entry(class_id)
            .and_modify(|r| r.capacity = capacity)
            .or_insert_with(|| Roster {
                capacity,
                members: HashSet::new(),
            });
    }

    pub fn close_class(&self, class_id: &BookingId) -> Vec<MemberId> {
        self.rosters
            .remove(class_id)
            .map(|(_, r)| r.members.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn try_enroll(&self, class_id: BookingId, member_id: MemberId) -> Result<Enrollment, BookingError> {
        let mut roster = self
            .rosters
            .get_mut(&class_id)
            .ok_or(BookingError::NotFound(class_id))?;
        if roster.members.contains(&member_id) {
            return Err(BookingError::Duplicate { class_id, member_id });
        }
        if roster.members.len() as u32 >= roster.capacity {
            return Err(BookingError::Capacity {
                class_id,
                capacity: roster.capacity,
            });
        }
        roster.members.insert(member_id);
        Ok(Enrollment { class_id, member_id })
    }

    /// Idempotent: returns whether the member was actually enrolled.
    pub fn unenroll(&self, class_id: &BookingId, member_id: &MemberId) -> bool {
        self.rosters
            .get_mut(class_id)
            .is_some_and(|mut r| r.members.remove(member_id))
    }

    /// Change capacity; refuses to drop below the current head count.
    pub fn set_capacity(&self, class_id: BookingId, capacity: u32) -> Result<(), BookingError> {
        let mut roster = self
            .rosters
            .get_mut(&class_id)
            .ok_or(BookingError::NotFound(class_id))?;
        if (roster.members.len() as u32) > capacity {
            return Err(BookingError::Capacity { class_id, capacity });
        }
        roster.capacity = capacity;
        Ok(())
    }

    /// Capacity check without mutating anything.
    pub fn check_capacity(&self, class_id: BookingId, capacity: u32) -> Result<(), BookingError> {
        let count = self
            .enrolled_count(&class_id)
            .ok_or(BookingError::NotFound(class_id))?;
        if count > capacity {
            return Err(BookingError::Capacity { class_id, capacity });
        }
        Ok(())
    }

    pub fn enrolled_count(&self, class_id: &BookingId) -> Option<u32> {
        self.rosters.get(class_id).map(|r| r.members.len() as u32)
    }

    pub fn is_enrolled(&self, class_id: &BookingId, member_id: &MemberId) -> bool {
        self.rosters
            .get(class_id)
            .is_some_and(|r| r.members.contains(member_id))
    }

    pub fn members(&self, class_id: &BookingId) -> Vec<MemberId> {
        let mut members: Vec<MemberId> = self
            .rosters
            .get(class_id)
            .map(|r| r.members.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn classes_for_member(&self, member_id: &MemberId) -> Vec<BookingId> {
        self.rosters
            .iter()
            .filter(|e| e.value().members.contains(member_id))
            .map(|e| *e.key())
            .collect()
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.rosters
            .iter()
            .flat_map(|e| {
                let class_id = *e.key();
                e.value()
                    .members
                    .iter()
                    .map(move |m| Enrollment { class_id, member_id: *m })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ulid::Ulid;

    use super::*;

    #[test]
    fn enroll_until_full_then_duplicate() {
        let tracker = CapacityTracker::new();
        let class = Ulid::new();
        tracker.open_class(class, 2);
        let (a, b, c) = (Ulid::new(), Ulid::new(), Ulid::new());

        assert!(tracker.try_enroll(class, a).is_ok());
        assert_eq!(tracker.enrolled_count(&class), Some(1));
        assert!(tracker.try_enroll(class, b).is_ok());
        assert_eq!(tracker.enrolled_count(&class), Some(2));
        assert!(matches!(tracker.try_enroll(class, c), Err(BookingError::Capacity { capacity: 2, .. })));
        assert!(matches!(tracker.try_enroll(class, a), Err(BookingError::Duplicate { .. })));
        assert_eq!(tracker.enrolled_count(&class), Some(2));
    }

    #[test]
    fn unknown_class_is_not_found() {
        let tracker = CapacityTracker::new();
        assert!(matches!(
            tracker.try_enroll(Ulid::new(), Ulid::new()),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn unenroll_is_idempotent() {
        let tracker = CapacityTracker::new();
        let class = Ulid::new();
        let member = Ulid::new();
        tracker.open_class(class, 3);
        tracker.try_enroll(class, member).unwrap();
        tracker.try_enroll(class, Ulid::new()).unwrap();

        assert!(tracker.unenroll(&class, &member));
        assert_eq!(tracker.enrolled_count(&class), Some(1));
        assert!(!tracker.unenroll(&class, &member));
        assert_eq!(tracker.enrolled_count(&class), Some(1));
        assert!(!tracker.unenroll(&Ulid::new(), &member));
    }

    #[test]
    fn freed_seat_can_be_taken() {
        let tracker = CapacityTracker::new();
        let class = Ulid::new();
        let (a, b) = (Ulid::new(), Ulid::new());
        tracker.open_class(class, 1);
        tracker.try_enroll(class, a).unwrap();
        assert!(tracker.try_enroll(class, b).is_err());
        tracker.unenroll(&class, &a);
        assert!(tracker.try_enroll(class, b).is_ok());
    }

    #[test]
    fn capacity_cannot_drop_below_head_count() {
        let tracker = CapacityTracker::new();
        let class = Ulid::new();
        tracker.open_class(class, 3);
        tracker.try_enroll(class, Ulid::new()).unwrap();
        tracker.try_enroll(class, Ulid::new()).unwrap();

        assert!(matches!(tracker.set_capacity(class, 1), Err(BookingError::Capacity { .. })));
        assert!(tracker.check_capacity(class, 1).is_err());
        assert!(tracker.check_capacity(class, 2).is_ok());
        tracker.set_capacity(class, 2).unwrap();
        assert!(tracker.try_enroll(class, Ulid::new()).is_err());
    }

    #[test]
    fn concurrent_enrollment_never_exceeds_capacity() {
        let tracker = Arc::new(CapacityTracker::new());
        let class = Ulid::new();
        tracker.open_class(class, 5);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.try_enroll(class, Ulid::new()).is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 5);
        assert_eq!(tracker.enrolled_count(&class), Some(5));
    }

    #[test]
    fn member_lookups() {
        let tracker = CapacityTracker::new();
        let (c1, c2) = (Ulid::new(), Ulid::new());
        let m = Ulid::new();
        tracker.open_class(c1, 2);
        tracker.open_class(c2, 2);
        tracker.try_enroll(c1, m).unwrap();
        tracker.try_enroll(c2, m).unwrap();
        let mut classes = tracker.classes_for_member(&m);
        classes.sort();
        let mut expected = vec![c1, c2];
        expected.sort();
        assert_eq!(classes, expected);
        assert!(tracker.is_enrolled(&c1, &m));
        assert_eq!(tracker.enrollments().len(), 2);
        assert_eq!(tracker.close_class(&c1), vec![m]);
        assert_eq!(tracker.enrolled_count(&c1), None);
    }
}
