//! Schedule store shared between processes of one user.
//!
//! Several independent processes (a CLI, a GUI) can hold a [`Schedule`] for
//! the same account at once and see each other's changes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   Application Layer (CLI, GUI)              │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │   Schedule façade                           │
//! │  • insert / erase / toggle done / edit      │
//! │  • versioned reads via SnapshotCache        │
//! └───────┬─────────────────┬───────────────┬───┘
//!         │                 │               │
//! ┌───────▼──────┐ ┌────────▼───────┐ ┌─────▼──────────────┐
//! │ NamedLock    │ │ SharedCache    │ │ PersistentStore    │
//! │ (file lock)  │ │ size|version|  │ │ AES-256-CBC file   │
//! │              │ │ encoded list   │ │ schedule.d/<id>    │
//! └──────────────┘ └────────────────┘ └────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use sched_core::{Account, TaskPriority, TaskProperty};
//! use sched_store::{Schedule, ScheduleConfig, SnapshotCache};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScheduleConfig::default();
//! let account = Account::new("alice", "hunter2")?;
//! let schedule = Schedule::acquire(&account, &config)?;
//!
//! let id = schedule.task_insert(TaskProperty {
//!     priority: TaskPriority::High,
//!     ..TaskProperty::new("Buy milk", 1000)
//! })?;
//!
//! let mut reader = SnapshotCache::new();
//! let (tasks, updated) = schedule.get_tasks_updated(&mut reader)?;
//! assert!(updated);
//! assert!(tasks.iter().any(|t| t.id == id));
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod config;
pub mod lock;
pub mod schedule;
pub mod shm;
pub mod store;

// Re-export commonly used types
pub use cipher::{Aes256Cbc, Cipher};
pub use config::{ScheduleConfig, MAX_SHARED_SCHEDULE_MEMORY};
pub use lock::{NamedLock, NamedLockGuard};
pub use schedule::{Schedule, SnapshotCache};
pub use shm::{CacheOrigin, SharedCache};
pub use store::PersistentStore;
