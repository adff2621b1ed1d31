//! The Schedule façade: atomic CRUD over a shared, persisted snapshot.
//!
//! Every mutation runs under the account's named lock:
//!
//! 1. decode the current snapshot from the shared cache
//! 2. apply the operation to a private copy
//! 3. encode, check it fits the cache
//! 4. rewrite the encrypted store file
//! 5. write the cache and bump its version
//!
//! A failure at any step before 4 leaves both representations untouched.
//! Readers poll with [`Schedule::get_tasks`] and a caller-owned
//! [`SnapshotCache`], which only re-decodes when the version moved.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use sched_core::{codec, Account, Error, Result, Task, TaskProperty, TaskPropertyMask};

use crate::config::ScheduleConfig;
use crate::lock::NamedLock;
use crate::shm::{CacheOrigin, SharedCache};
use crate::store::PersistentStore;

/// Handle on one account's schedule. Cheap to share between threads;
/// every process and thread may hold its own handle as well.
#[derive(Debug)]
pub struct Schedule {
    identifier: String,
    lock: NamedLock,
    cache: Mutex<SharedCache>,
    store: PersistentStore,
}

/// Caller-owned copy of the last snapshot seen, tagged with the segment
/// generation and version it was taken at.
///
/// Each poller (thread, task, UI view) keeps its own; a fresh one has
/// generation zero and is therefore updated on first use.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    generation: u64,
    version: u32,
    tasks: Vec<Task>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the shared cache this copy was taken at (0 = never).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Generation of the segment this copy was taken from (0 = never).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}

impl Schedule {
    /// Attach to the account's schedule, creating the shared cache from the
    /// store file if no process has it open yet.
    ///
    /// A missing store file seeds an empty schedule.
    pub fn acquire(account: &Account, config: &ScheduleConfig) -> Result<Self> {
        let (lock, store) = Self::open_parts(account, config)?;
        let cache = {
            let _guard = lock.acquire()?;
            Self::attach_cache(account, config, || match store.load() {
                Ok(tasks) => Ok(Some(codec::encode_list(&tasks))),
                Err(Error::UserNotFound) => Ok(None),
                Err(e) => Err(e),
            })?
        };
        Ok(Self::from_parts(account, lock, cache, store))
    }

    /// Create the account's empty store file, then attach.
    ///
    /// Fails with [`Error::UserAlreadyExists`] if the store file exists.
    pub fn register(account: &Account, config: &ScheduleConfig) -> Result<Self> {
        let (lock, store) = Self::open_parts(account, config)?;
        let cache = {
            let _guard = lock.acquire()?;
            store.create_empty()?;
            let empty = codec::encode_list(&[]);
            let mut cache = Self::attach_cache(account, config, || Ok(Some(empty.clone())))?;
            if cache.origin() == CacheOrigin::Opened {
                // Left over from an account with the same identifier.
                cache.store(&empty)?;
            }
            cache
        };
        info!(user = account.name(), "registered schedule");
        Ok(Self::from_parts(account, lock, cache, store))
    }

    /// Verify the account key against its store file, then attach.
    ///
    /// Fails with [`Error::UserNotFound`] if there is no store file and
    /// [`Error::WrongPassword`] if the key does not decrypt it.
    pub fn login(account: &Account, config: &ScheduleConfig) -> Result<Self> {
        let (lock, store) = Self::open_parts(account, config)?;
        let cache = {
            let _guard = lock.acquire()?;
            let tasks = store.load()?;
            Self::attach_cache(account, config, || Ok(Some(codec::encode_list(&tasks))))?
        };
        Ok(Self::from_parts(account, lock, cache, store))
    }

    fn open_parts(account: &Account, config: &ScheduleConfig) -> Result<(NamedLock, PersistentStore)> {
        let identifier = account.identifier();
        let lock = NamedLock::open(config.lock_path(identifier))?;
        let store = PersistentStore::new(config.store_path(identifier), account.key());
        Ok((lock, store))
    }

    fn attach_cache<F>(account: &Account, config: &ScheduleConfig, seed: F) -> Result<SharedCache>
    where
        F: FnOnce() -> Result<Option<Vec<u8>>>,
    {
        SharedCache::open_or_create(
            config.shm_path(account.identifier()),
            config.max_shared_memory,
            seed,
        )
    }

    fn from_parts(account: &Account, lock: NamedLock, cache: SharedCache, store: PersistentStore) -> Self {
        debug!(
            user = account.name(),
            origin = ?cache.origin(),
            segment = %cache.path().display(),
            "acquired schedule"
        );
        Self {
            identifier: account.identifier().to_string(),
            lock,
            cache: Mutex::new(cache),
            store,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    /// Insert a task, returning its new id.
    pub fn task_insert(&self, property: TaskProperty) -> Result<u32> {
        if !property.has_valid_name() {
            return Err(Error::InvalidTaskName);
        }
        self.mutate("insert", |tasks| insert_task(tasks, property))
    }

    pub fn task_erase(&self, id: u32) -> Result<()> {
        self.mutate("erase", |tasks| erase_task(tasks, id).map(drop))
    }

    /// Flip a task's done flag, returning the new value.
    pub fn task_toggle_done(&self, id: u32) -> Result<bool> {
        self.mutate("toggle_done", |tasks| toggle_done(tasks, id))
    }

    /// Overwrite the fields of task `id` selected by `mask` with those of `patch`.
    ///
    /// An empty mask succeeds without touching anything.
    pub fn task_edit(&self, id: u32, patch: &TaskProperty, mask: TaskPropertyMask) -> Result<()> {
        if mask.is_empty() {
            return Ok(());
        }
        if mask.contains(TaskPropertyMask::NAME) && !patch.has_valid_name() {
            return Err(Error::InvalidTaskName);
        }
        self.mutate("edit", |tasks| edit_task(tasks, id, patch, mask))
    }

    /// Tasks as of the latest version, refreshing `reader` only if the
    /// shared version moved or the segment was recreated since it was last
    /// filled.
    pub fn get_tasks<'c>(&self, reader: &'c mut SnapshotCache) -> Result<&'c [Task]> {
        Ok(self.get_tasks_updated(reader)?.0)
    }

    /// Like [`Schedule::get_tasks`], also reporting whether `reader` was refreshed.
    pub fn get_tasks_updated<'c>(&self, reader: &'c mut SnapshotCache) -> Result<(&'c [Task], bool)> {
        let fresh = {
            let _guard = self.lock.acquire()?;
            let cache = self.shared_cache();
            let view = cache.view()?;
            let (generation, version) = (view.generation(), view.version());
            if generation != reader.generation || version != reader.version {
                Some((generation, version, view.data()?.to_vec()))
            } else {
                None
            }
        };

        let updated = match fresh {
            Some((generation, version, bytes)) => {
                reader.tasks = decode_snapshot(&bytes)?;
                reader.generation = generation;
                reader.version = version;
                debug!(generation, version, tasks = reader.tasks.len(), "refreshed snapshot cache");
                true
            }
            None => false,
        };
        Ok((&reader.tasks, updated))
    }

    /// A freshly decoded copy of the current snapshot.
    pub fn snapshot(&self) -> Result<Vec<Task>> {
        let bytes = {
            let _guard = self.lock.acquire()?;
            self.shared_cache().load()?
        };
        decode_snapshot(&bytes)
    }

    /// Current version of the shared cache.
    pub fn version(&self) -> Result<u32> {
        let _guard = self.lock.acquire()?;
        self.shared_cache().version()
    }

    fn shared_cache(&self) -> MutexGuard<'_, SharedCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<T, F>(&self, op: &'static str, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Task>) -> Result<T>,
    {
        let _guard = self.lock.acquire()?;
        let mut cache = self.shared_cache();

        let mut tasks = decode_snapshot(&cache.load()?)?;
        let out = apply(&mut tasks)?;

        let encoded = codec::encode_list(&tasks);
        cache.check_fits(encoded.len())?;
        self.store.store_encoded(&encoded)?;
        let version = cache.store(&encoded)?;

        info!(op, version, tasks = tasks.len(), "schedule updated");
        Ok(out)
    }
}

/// An empty data region means the schedule has no store file yet.
fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Task>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    codec::decode_list(bytes)
}

/// Next id: one past the largest in the snapshot. Ids of erased tasks can
/// come back once no larger id remains.
fn next_id(tasks: &[Task]) -> Result<u32> {
    tasks
        .iter()
        .map(|t| t.id)
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| Error::WrongFormat("task id space exhausted".to_string()))
}

/// Insert at the sorted position for the task's key.
fn insert_sorted(tasks: &mut Vec<Task>, task: Task) -> Result<usize> {
    match tasks.binary_search_by(|probe| probe.key_cmp(&task)) {
        Ok(_) => Err(Error::TaskAlreadyExist {
            begin_time: task.property.begin_time,
            name: task.property.name,
        }),
        Err(pos) => {
            tasks.insert(pos, task);
            Ok(pos)
        }
    }
}

fn position_of(tasks: &[Task], id: u32) -> Result<usize> {
    tasks
        .iter()
        .position(|t| t.id == id)
        .ok_or(Error::TaskNotFound(id))
}

fn insert_task(tasks: &mut Vec<Task>, property: TaskProperty) -> Result<u32> {
    let id = next_id(tasks)?;
    insert_sorted(tasks, Task::new(id, property))?;
    Ok(id)
}

fn erase_task(tasks: &mut Vec<Task>, id: u32) -> Result<Task> {
    let pos = position_of(tasks, id)?;
    Ok(tasks.remove(pos))
}

fn toggle_done(tasks: &mut [Task], id: u32) -> Result<bool> {
    let pos = position_of(tasks, id)?;
    let done = &mut tasks[pos].property.done;
    *done = !*done;
    Ok(*done)
}

fn edit_task(tasks: &mut Vec<Task>, id: u32, patch: &TaskProperty, mask: TaskPropertyMask) -> Result<()> {
    let pos = position_of(tasks, id)?;
    let patched = tasks[pos].patched(patch, mask);

    if !mask.touches_key() {
        tasks[pos] = patched;
        return Ok(());
    }

    let original = tasks.remove(pos);
    if let Err(e) = insert_sorted(tasks, patched) {
        tasks.insert(pos, original);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sched_core::TaskPriority;

    fn prop(name: &str, begin_time: u32) -> TaskProperty {
        TaskProperty::new(name, begin_time)
    }

    fn keys(tasks: &[Task]) -> Vec<(u32, String)> {
        tasks
            .iter()
            .map(|t| (t.property.begin_time, t.property.name.clone()))
            .collect()
    }

    fn seeded() -> Vec<Task> {
        let mut tasks = Vec::new();
        insert_task(&mut tasks, prop("b", 20)).unwrap();
        insert_task(&mut tasks, prop("a", 10)).unwrap();
        insert_task(&mut tasks, prop("c", 10)).unwrap();
        tasks
    }

    #[test]
    fn test_insert_keeps_sorted_and_assigns_max_plus_one() {
        let tasks = seeded();
        assert_eq!(
            keys(&tasks),
            vec![(10, "a".into()), (10, "c".into()), (20, "b".into())]
        );
        let ids: Vec<u32> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_insert_duplicate_key_fails_without_change() {
        let mut tasks = seeded();
        let before = tasks.clone();
        let result = insert_task(&mut tasks, prop("a", 10));
        assert!(matches!(result, Err(Error::TaskAlreadyExist { begin_time: 10, .. })));
        assert_eq!(tasks, before);
    }

    #[test]
    fn test_erasing_max_id_allows_reuse() {
        let mut tasks = seeded();
        erase_task(&mut tasks, 3).unwrap();
        assert_eq!(insert_task(&mut tasks, prop("d", 30)).unwrap(), 3);
    }

    #[test]
    fn test_erase_and_toggle_not_found() {
        let mut tasks = seeded();
        assert!(matches!(erase_task(&mut tasks, 99), Err(Error::TaskNotFound(99))));
        assert!(matches!(toggle_done(&mut tasks, 99), Err(Error::TaskNotFound(99))));
        assert_eq!(tasks, seeded());
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut tasks = seeded();
        assert!(toggle_done(&mut tasks, 1).unwrap());
        assert!(!toggle_done(&mut tasks, 1).unwrap());
        assert_eq!(tasks, seeded());
    }

    #[test]
    fn test_edit_non_key_in_place() {
        let mut tasks = seeded();
        let patch = TaskProperty {
            priority: TaskPriority::Low,
            ..Default::default()
        };
        edit_task(&mut tasks, 2, &patch, TaskPropertyMask::PRIORITY).unwrap();
        assert_eq!(tasks[0].id, 2);
        assert_eq!(tasks[0].property.priority, TaskPriority::Low);
        assert_eq!(keys(&tasks), keys(&seeded()));
    }

    #[test]
    fn test_edit_key_moves_task() {
        let mut tasks = seeded();
        edit_task(&mut tasks, 2, &prop("", 50), TaskPropertyMask::BEGIN_TIME).unwrap();
        assert_eq!(
            keys(&tasks),
            vec![(10, "c".into()), (20, "b".into()), (50, "a".into())]
        );
        assert_eq!(tasks[2].id, 2);
    }

    #[test]
    fn test_edit_key_collision_rolls_back() {
        let mut tasks = seeded();
        let before = tasks.clone();
        let result = edit_task(&mut tasks, 2, &prop("c", 0), TaskPropertyMask::NAME);
        assert!(matches!(result, Err(Error::TaskAlreadyExist { .. })));
        assert_eq!(tasks, before);
    }

    #[test]
    fn test_edit_key_to_same_key_is_fine() {
        let mut tasks = seeded();
        edit_task(&mut tasks, 1, &prop("b", 20), TaskPropertyMask::KEY).unwrap();
        assert_eq!(tasks, seeded());
    }

    #[test]
    fn test_decode_empty_region_is_empty_snapshot() {
        assert!(decode_snapshot(&[]).unwrap().is_empty());
        assert!(matches!(decode_snapshot(b"junk"), Err(Error::WrongHeader)));
    }
}
