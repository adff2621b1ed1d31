//! Core data structures for the schedulite task store.
//!
//! A [`Task`] is an id plus a [`TaskProperty`]. Tasks are ordered and
//! deduplicated by their key `(begin_time, name)`; the id only identifies a
//! task for id-based operations.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::time::TimeInt;

/// TaskPriority ranks how urgent a task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskPriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High];

    /// Decode the on-wire byte, `None` for unknown values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TaskPriority::Low),
            1 => Some(TaskPriority::Medium),
            2 => Some(TaskPriority::High),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse leniently by first letter, ignoring case.
    /// Empty or unrecognized text yields the default priority.
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('l') => TaskPriority::Low,
            Some('m') => TaskPriority::Medium,
            Some('h') => TaskPriority::High,
            _ => TaskPriority::default(),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "Low"),
            TaskPriority::Medium => write!(f, "Medium"),
            TaskPriority::High => write!(f, "High"),
        }
    }
}

/// TaskType categorizes what a task is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskType {
    #[default]
    None = 0,
    Study = 1,
    Play = 2,
    Life = 3,
    Work = 4,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::None,
        TaskType::Study,
        TaskType::Play,
        TaskType::Life,
        TaskType::Work,
    ];

    /// Decode the on-wire byte, `None` for unknown values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(TaskType::None),
            1 => Some(TaskType::Study),
            2 => Some(TaskType::Play),
            3 => Some(TaskType::Life),
            4 => Some(TaskType::Work),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse leniently by first letter, ignoring case.
    /// Empty or unrecognized text yields the default type.
    pub fn parse_lenient(text: &str) -> Self {
        match text.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('n') => TaskType::None,
            Some('s') => TaskType::Study,
            Some('p') => TaskType::Play,
            Some('l') => TaskType::Life,
            Some('w') => TaskType::Work,
            _ => TaskType::default(),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::None => write!(f, "None"),
            TaskType::Study => write!(f, "Study"),
            TaskType::Play => write!(f, "Play"),
            TaskType::Life => write!(f, "Life"),
            TaskType::Work => write!(f, "Work"),
        }
    }
}

/// TaskStatus is derived from a property and the current time; it is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Begun,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Pending, TaskStatus::Begun, TaskStatus::Done];

    /// Parse by first letter, ignoring case; `None` when unrecognized.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        match text.trim().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('p') => Some(TaskStatus::Pending),
            Some('b') => Some(TaskStatus::Begun),
            Some('d') => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::Begun => write!(f, "Begun"),
            TaskStatus::Done => write!(f, "Done"),
        }
    }
}

/// The user-editable part of a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskProperty {
    /// Task name, must not contain a NUL byte.
    pub name: String,
    /// Begin time in minutes since the Unix epoch.
    pub begin_time: TimeInt,
    /// Remind time in minutes since the Unix epoch.
    pub remind_time: TimeInt,
    pub priority: TaskPriority,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub done: bool,
}

impl TaskProperty {
    /// Create a property with the given key and default everything else.
    pub fn new(name: impl Into<String>, begin_time: TimeInt) -> Self {
        Self {
            name: name.into(),
            begin_time,
            ..Default::default()
        }
    }

    /// Returns the key `(begin_time, name)` that orders and deduplicates tasks.
    pub fn key(&self) -> (TimeInt, &str) {
        (self.begin_time, self.name.as_str())
    }

    pub fn key_cmp(&self, other: &TaskProperty) -> Ordering {
        self.key().cmp(&other.key())
    }

    /// Names are stored NUL-terminated, so a NUL inside one cannot round-trip.
    pub fn has_valid_name(&self) -> bool {
        !self.name.as_bytes().contains(&0)
    }

    /// Copy the fields selected by `mask` from `patch` onto a clone of `self`.
    pub fn patched(&self, patch: &TaskProperty, mask: TaskPropertyMask) -> TaskProperty {
        let mut out = self.clone();
        if mask.contains(TaskPropertyMask::NAME) {
            out.name = patch.name.clone();
        }
        if mask.contains(TaskPropertyMask::BEGIN_TIME) {
            out.begin_time = patch.begin_time;
        }
        if mask.contains(TaskPropertyMask::REMIND_TIME) {
            out.remind_time = patch.remind_time;
        }
        if mask.contains(TaskPropertyMask::PRIORITY) {
            out.priority = patch.priority;
        }
        if mask.contains(TaskPropertyMask::TYPE) {
            out.task_type = patch.task_type;
        }
        if mask.contains(TaskPropertyMask::DONE) {
            out.done = patch.done;
        }
        out
    }

    /// Status relative to `now`: done wins, then pending until the begin time passes.
    pub fn status(&self, now: TimeInt) -> TaskStatus {
        if self.done {
            TaskStatus::Done
        } else if self.begin_time > now {
            TaskStatus::Pending
        } else {
            TaskStatus::Begun
        }
    }

    /// Whether an undone task's reminder falls in the minutes `(after, upto]`.
    pub fn remind_due(&self, after: TimeInt, upto: TimeInt) -> bool {
        !self.done && self.remind_time > after && self.remind_time <= upto
    }
}

/// Selects tasks by status, priority and type (None = any).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.task_type.is_none()
    }

    /// Status is judged against `now`.
    pub fn matches(&self, task: &Task, now: TimeInt) -> bool {
        let property = &task.property;
        self.status.map_or(true, |s| property.status(now) == s)
            && self.priority.map_or(true, |p| property.priority == p)
            && self.task_type.map_or(true, |t| property.task_type == t)
    }
}

/// A task as stored in a schedule snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    #[serde(flatten)]
    pub property: TaskProperty,
}

impl Task {
    pub fn new(id: u32, property: TaskProperty) -> Self {
        Self { id, property }
    }

    pub fn key(&self) -> (TimeInt, &str) {
        self.property.key()
    }

    pub fn key_cmp(&self, other: &Task) -> Ordering {
        self.property.key_cmp(&other.property)
    }

    /// Patch the property, keeping the id.
    pub fn patched(&self, patch: &TaskProperty, mask: TaskPropertyMask) -> Task {
        Task {
            id: self.id,
            property: self.property.patched(patch, mask),
        }
    }
}

/// Bit-set selecting which [`TaskProperty`] fields an edit touches.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TaskPropertyMask(u8);

impl TaskPropertyMask {
    pub const NONE: Self = Self(0);
    pub const NAME: Self = Self(1 << 0);
    pub const BEGIN_TIME: Self = Self(1 << 1);
    pub const REMIND_TIME: Self = Self(1 << 2);
    pub const PRIORITY: Self = Self(1 << 3);
    pub const TYPE: Self = Self(1 << 4);
    pub const DONE: Self = Self(1 << 5);
    /// The fields that form a task's key.
    pub const KEY: Self = Self(Self::NAME.0 | Self::BEGIN_TIME.0);
    pub const ALL: Self = Self((1 << 6) - 1);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether applying this mask can change a task's key.
    pub fn touches_key(self) -> bool {
        self.intersects(Self::KEY)
    }
}

impl BitOr for TaskPropertyMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TaskPropertyMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TaskPropertyMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for TaskPropertyMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TaskPropertyMask, &str); 6] = [
            (TaskPropertyMask::NAME, "NAME"),
            (TaskPropertyMask::BEGIN_TIME, "BEGIN_TIME"),
            (TaskPropertyMask::REMIND_TIME, "REMIND_TIME"),
            (TaskPropertyMask::PRIORITY, "PRIORITY"),
            (TaskPropertyMask::TYPE, "TYPE"),
            (TaskPropertyMask::DONE, "DONE"),
        ];
        if self.is_empty() {
            return write!(f, "TaskPropertyMask(NONE)");
        }
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "TaskPropertyMask({})", set.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskProperty {
        TaskProperty {
            name: "Buy milk".to_string(),
            begin_time: 1000,
            remind_time: 900,
            priority: TaskPriority::High,
            task_type: TaskType::Life,
            done: false,
        }
    }

    #[test]
    fn test_patch_only_touches_masked_fields() {
        let origin = sample();
        let patch = TaskProperty {
            name: "Other".to_string(),
            begin_time: 5,
            remind_time: 6,
            priority: TaskPriority::Low,
            task_type: TaskType::Work,
            done: true,
        };

        let patched = origin.patched(&patch, TaskPropertyMask::PRIORITY);
        assert_eq!(patched.priority, TaskPriority::Low);
        assert_eq!(patched.name, origin.name);
        assert_eq!(patched.begin_time, origin.begin_time);
        assert_eq!(patched.task_type, origin.task_type);

        assert_eq!(origin.patched(&patch, TaskPropertyMask::ALL), patch);
        assert_eq!(origin.patched(&patch, TaskPropertyMask::NONE), origin);
    }

    #[test]
    fn test_key_order_is_begin_time_then_name() {
        let a = TaskProperty::new("b", 10);
        let b = TaskProperty::new("a", 20);
        let c = TaskProperty::new("c", 10);
        assert_eq!(a.key_cmp(&b), Ordering::Less);
        assert_eq!(a.key_cmp(&c), Ordering::Less);
        assert_eq!(a.key_cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_mask_key_bits() {
        assert!(TaskPropertyMask::KEY.contains(TaskPropertyMask::NAME));
        assert!(TaskPropertyMask::KEY.contains(TaskPropertyMask::BEGIN_TIME));
        assert!(!TaskPropertyMask::PRIORITY.touches_key());
        assert!((TaskPropertyMask::PRIORITY | TaskPropertyMask::NAME).touches_key());
        assert!(TaskPropertyMask::NONE.is_empty());
        assert_eq!(TaskPropertyMask::from_bits_truncate(0xff), TaskPropertyMask::ALL);
        assert_eq!(
            format!("{:?}", TaskPropertyMask::KEY),
            "TaskPropertyMask(NAME | BEGIN_TIME)"
        );
    }

    #[test]
    fn test_lenient_parsing() {
        assert_eq!(TaskPriority::parse_lenient("HIGH"), TaskPriority::High);
        assert_eq!(TaskPriority::parse_lenient("l"), TaskPriority::Low);
        assert_eq!(TaskPriority::parse_lenient(""), TaskPriority::Medium);
        assert_eq!(TaskPriority::parse_lenient("urgent"), TaskPriority::Medium);
        assert_eq!(TaskType::parse_lenient("work"), TaskType::Work);
        assert_eq!(TaskType::parse_lenient("Study"), TaskType::Study);
        assert_eq!(TaskType::parse_lenient("?"), TaskType::None);
    }

    #[test]
    fn test_byte_round_trip_of_enums() {
        for p in TaskPriority::ALL {
            assert_eq!(TaskPriority::from_byte(p.as_byte()), Some(p));
        }
        for t in TaskType::ALL {
            assert_eq!(TaskType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(TaskPriority::from_byte(3), None);
        assert_eq!(TaskType::from_byte(5), None);
    }

    #[test]
    fn test_status() {
        let mut p = sample();
        assert_eq!(p.status(999), TaskStatus::Pending);
        assert_eq!(p.status(1000), TaskStatus::Begun);
        p.done = true;
        assert_eq!(p.status(0), TaskStatus::Done);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(TaskStatus::parse_lenient("pending"), Some(TaskStatus::Pending));
        assert_eq!(TaskStatus::parse_lenient(" B"), Some(TaskStatus::Begun));
        assert_eq!(TaskStatus::parse_lenient("Done"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::parse_lenient("x"), None);
        assert_eq!(TaskStatus::parse_lenient(""), None);
    }

    #[test]
    fn test_remind_due_window() {
        let mut p = TaskProperty {
            remind_time: 100,
            ..sample()
        };
        assert!(p.remind_due(99, 100));
        assert!(p.remind_due(90, 105));
        assert!(!p.remind_due(100, 105));
        assert!(!p.remind_due(95, 99));

        p.done = true;
        assert!(!p.remind_due(99, 100));
    }

    #[test]
    fn test_filter_matches() {
        let task = Task::new(
            1,
            TaskProperty {
                begin_time: 50,
                priority: TaskPriority::High,
                task_type: TaskType::Work,
                ..sample()
            },
        );

        assert!(TaskFilter::default().is_empty());
        assert!(TaskFilter::default().matches(&task, 0));

        let high_work = TaskFilter {
            priority: Some(TaskPriority::High),
            task_type: Some(TaskType::Work),
            ..Default::default()
        };
        assert!(high_work.matches(&task, 0));

        let pending = TaskFilter {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        assert!(pending.matches(&task, 49));
        assert!(!pending.matches(&task, 50));

        let low = TaskFilter {
            priority: Some(TaskPriority::Low),
            ..Default::default()
        };
        assert!(!low.matches(&task, 0));
    }

    #[test]
    fn test_nul_name_is_invalid() {
        assert!(sample().has_valid_name());
        assert!(!TaskProperty::new("bad\0name", 1).has_valid_name());
    }

    #[test]
    fn test_task_serializes_flat() {
        let task = Task::new(7, sample());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Buy milk");
        assert_eq!(json["type"], "life");
        assert_eq!(json["priority"], "high");
    }
}
