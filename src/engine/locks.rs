use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

/// What a transaction serializes on. Variant order is the acquisition order:
/// trainers first, then rooms, then classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Trainer(Ulid),
    Room(Ulid),
    Class(Ulid),
}

/// One async mutex per contended resource. Entries exist only while some
/// transaction holds or waits on them.
#[derive(Default)]
pub struct LockTable {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

/// Guards held for the duration of one check-and-commit sequence.
pub struct LockSet<'a> {
    table: &'a LockTable,
    keys: Vec<LockKey>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet<'_> {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            self.table.prune(key);
        }
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in sorted order to prevent deadlocks.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet<'_> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        // Built before the first await so a cancelled acquire still prunes.
        let mut set = LockSet {
            table: self,
            keys,
            guards: Vec::new(),
        };
        for i in 0..set.keys.len() {
            let mutex = self.locks.entry(set.keys[i]).or_default().value().clone();
            set.guards.push(mutex.lock_owned().await);
        }
        set
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop `key`'s mutex unless another holder or waiter still has a handle.
    /// The shard lock held by `remove_if` keeps new handles from appearing meanwhile.
    fn prune(&self, key: &LockKey) {
        self.locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn trainer_sorts_before_room_before_class() {
        let (a, b) = (Ulid::new(), Ulid::new());
        let mut keys = vec![LockKey::Class(a), LockKey::Room(a), LockKey::Trainer(b), LockKey::Room(b)];
        keys.sort();
        assert!(matches!(keys[0], LockKey::Trainer(_)));
        assert!(matches!(keys[1], LockKey::Room(_)));
        assert!(matches!(keys[2], LockKey::Room(_)));
        assert!(matches!(keys[3], LockKey::Class(_)));
    }

    #[tokio::test]
    async fn acquire_dedups_and_orders() {
        let table = LockTable::new();
        let (t, r) = (Ulid::new(), Ulid::new());
        let set = table
            .acquire([LockKey::Room(r), LockKey::Trainer(t), LockKey::Room(r)])
            .await;
        assert_eq!(set.keys(), &[LockKey::Trainer(t), LockKey::Room(r)]);
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let table = Arc::new(LockTable::new());
        let room = Ulid::new();
        let held = table.acquire([LockKey::Room(room)]).await;

        let t2 = table.clone();
        let waiter = tokio::spawn(async move {
            let _set = t2.acquire([LockKey::Room(room)]).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn disjoint_keys_do_not_block() {
        let table = LockTable::new();
        let _a = table.acquire([LockKey::Room(Ulid::new())]).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            table.acquire([LockKey::Room(Ulid::new())]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let table = LockTable::new();
        let set = table.acquire([LockKey::Room(Ulid::new()), LockKey::Class(Ulid::new())]).await;
        assert_eq!(table.len(), 2);
        drop(set);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn contended_key_survives_until_last_holder() {
        let table = Arc::new(LockTable::new());
        let room = Ulid::new();
        let held = table.acquire([LockKey::Room(room)]).await;

        let t2 = table.clone();
        let waiter = tokio::spawn(async move {
            let _set = t2.acquire([LockKey::Room(room)]).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert_eq!(table.len(), 1, "the waiter still needs the mutex");
        waiter.await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn opposite_request_orders_do_not_deadlock() {
        let table = Arc::new(LockTable::new());
        let (t, r) = (Ulid::new(), Ulid::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 {
                    [LockKey::Trainer(t), LockKey::Room(r)]
                } else {
                    [LockKey::Room(r), LockKey::Trainer(t)]
                };
                let _set = table.acquire(keys).await;
                tokio::task::yield_now().await;
            }));
        }
        let all = futures::future::join_all(handles);
        let results = tokio::time::timeout(Duration::from_secs(5), all).await.unwrap();
        assert!(results.into_iter().all(|r| r.is_ok()));
    }
}
