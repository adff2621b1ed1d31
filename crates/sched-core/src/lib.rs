//! Core types and the binary task codec for the schedulite task store.
//!
//! This crate provides the data model shared by every process attached to
//! a schedule, and the byte format those processes exchange through the
//! shared cache and the encrypted store file.

pub mod account;
pub mod codec;
pub mod error;
pub mod time;
pub mod types;

pub use account::Account;
pub use error::{Error, Result};
pub use time::TimeInt;

// Re-export main types for convenience
pub use types::{
    Task, TaskFilter, TaskPriority, TaskProperty, TaskPropertyMask, TaskStatus, TaskType,
};
