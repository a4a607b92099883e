use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{ResourceKey, RunId, TaskId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LockHolder {
    pub run: RunId,
    pub task: TaskId,
}

/// Non-blocking per-key mutual exclusion shared by every run that targets
/// the same physical windows. There is no queueing: a failed acquisition is
/// simply retried by the caller on its next round.
#[derive(Clone, Default)]
pub struct ResourceLockTable {
    held: Arc<Mutex<HashMap<ResourceKey, LockHolder>>>,
}

impl ResourceLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes `key` for `holder`. Succeeds when the key is free or already
    /// held by the same holder.
    pub fn try_acquire(&self, key: &ResourceKey, holder: LockHolder) -> bool {
        let mut held = self.lock_held();
        match held.get(key) {
            Some(current) => *current == holder,
            None => {
                held.insert(key.clone(), holder);
                true
            }
        }
    }

    /// Releases `key` if `holder` owns it. Returns whether anything was released.
    pub fn release(&self, key: &ResourceKey, holder: LockHolder) -> bool {
        let mut held = self.lock_held();
        if held.get(key) == Some(&holder) {
            held.remove(key);
            true
        } else {
            false
        }
    }

    /// Releases every key held by any task of `run`.
    pub fn release_run(&self, run: RunId) -> usize {
        let mut held = self.lock_held();
        let before = held.len();
        held.retain(|_, holder| holder.run != run);
        before - held.len()
    }

    pub fn holder(&self, key: &ResourceKey) -> Option<LockHolder> {
        self.lock_held().get(key).copied()
    }

    pub fn try_guard(&self, key: &ResourceKey, holder: LockHolder) -> Option<ResourceGuard> {
        self.try_acquire(key, holder).then(|| ResourceGuard {
            table: self.clone(),
            key: key.clone(),
            holder,
        })
    }

    // The map is never left half-updated, so a poisoned lock is still usable.
    fn lock_held(&self) -> MutexGuard<'_, HashMap<ResourceKey, LockHolder>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its key when dropped.
pub struct ResourceGuard {
    table: ResourceLockTable,
    key: ResourceKey,
    holder: LockHolder,
}

impl ResourceGuard {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.table.release(&self.key, self.holder);
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{ResourceKey, RunId, TaskId};

    use super::{LockHolder, ResourceLockTable};

    fn holder(run: u64, task: u64) -> LockHolder {
        LockHolder {
            run: RunId(run),
            task: TaskId(task),
        }
    }

    #[test]
    fn second_holder_is_refused_until_release() {
        let table = ResourceLockTable::new();
        let window = ResourceKey::window(4242);

        assert!(table.try_acquire(&window, holder(1, 0)));
        assert!(!table.try_acquire(&window, holder(2, 0)));
        assert!(!table.release(&window, holder(2, 0)));
        assert!(table.release(&window, holder(1, 0)));
        assert!(table.try_acquire(&window, holder(2, 0)));
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let table = ResourceLockTable::new();

        assert!(table.try_acquire(&ResourceKey::window(1), holder(1, 0)));
        assert!(table.try_acquire(&ResourceKey::window(2), holder(1, 1)));
    }

    #[test]
    fn guard_releases_on_drop() {
        let table = ResourceLockTable::new();
        let window = ResourceKey::window(7);

        {
            let guard = table.try_guard(&window, holder(1, 3)).unwrap();
            assert_eq!(guard.key(), &window);
            assert!(table.try_guard(&window, holder(2, 0)).is_none());
        }

        assert_eq!(table.holder(&window), None);
    }

    #[test]
    fn release_run_drops_only_that_runs_keys() {
        let table = ResourceLockTable::new();
        table.try_acquire(&ResourceKey::window(1), holder(1, 0));
        table.try_acquire(&ResourceKey::window(2), holder(1, 1));
        table.try_acquire(&ResourceKey::window(3), holder(2, 0));

        assert_eq!(table.release_run(RunId(1)), 2);
        assert_eq!(table.holder(&ResourceKey::window(3)), Some(holder(2, 0)));
    }

    #[test]
    fn clones_share_one_keyspace() {
        let table = ResourceLockTable::new();
        let other = table.clone();
        let window = ResourceKey::window(9);

        assert!(table.try_acquire(&window, holder(1, 0)));
        assert!(!other.try_acquire(&window, holder(2, 0)));
    }
}
