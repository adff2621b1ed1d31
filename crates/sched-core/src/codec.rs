//! Binary codec for tasks and task lists.
//!
//! A task record is laid out as:
//!
//! ```text
//! id:u32le | begin_time:u32le | remind_time:u32le | priority:u8 | type:u8 | done:u8 | name.. | 0x00
//! ```
//!
//! A list is the literal header `Schedule` followed by the records in
//! snapshot order. The same bytes are kept in the shared cache and, once
//! encrypted, in the account's store file.

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Task, TaskPriority, TaskProperty, TaskType};

/// Literal prefix of every encoded task list.
pub const LIST_HEADER: &[u8] = b"Schedule";

/// Length of the fixed-size part of a record, before the name.
pub const TASK_FIXED_LEN: usize = 4 + 4 + 4 + 1 + 1 + 1;

/// Append the encoding of `task` to `out`.
///
/// The name is written raw; callers must have rejected names containing NUL.
pub fn encode_task_into(task: &Task, out: &mut Vec<u8>) {
    let p = &task.property;
    out.reserve(TASK_FIXED_LEN + p.name.len() + 1);
    out.extend_from_slice(&task.id.to_le_bytes());
    out.extend_from_slice(&p.begin_time.to_le_bytes());
    out.extend_from_slice(&p.remind_time.to_le_bytes());
    out.push(p.priority.as_byte());
    out.push(p.task_type.as_byte());
    out.push(u8::from(p.done));
    out.extend_from_slice(p.name.as_bytes());
    out.push(0);
}

pub fn encode_task(task: &Task) -> Vec<u8> {
    let mut out = Vec::new();
    encode_task_into(task, &mut out);
    out
}

/// Decode one record from the front of `bytes`.
///
/// Returns the task and the number of bytes consumed (through the NUL
/// terminator), or `None` if the buffer is too short, has no terminator, or
/// holds a value outside its field's range.
pub fn decode_task(bytes: &[u8]) -> Option<(Task, usize)> {
    if bytes.len() < TASK_FIXED_LEN {
        return None;
    }
    let id = read_u32(bytes, 0)?;
    let begin_time = read_u32(bytes, 4)?;
    let remind_time = read_u32(bytes, 8)?;
    let priority = TaskPriority::from_byte(bytes[12])?;
    let task_type = TaskType::from_byte(bytes[13])?;
    let done = match bytes[14] {
        0 => false,
        1 => true,
        _ => return None,
    };

    let rest = &bytes[TASK_FIXED_LEN..];
    let nul = rest.iter().position(|&b| b == 0)?;
    let name = std::str::from_utf8(&rest[..nul]).ok()?.to_owned();

    let task = Task {
        id,
        property: TaskProperty {
            name,
            begin_time,
            remind_time,
            priority,
            task_type,
            done,
        },
    };
    Some((task, TASK_FIXED_LEN + nul + 1))
}

/// Size in bytes of `encode_list(tasks)` without building it.
pub fn encoded_list_len(tasks: &[Task]) -> usize {
    LIST_HEADER.len()
        + tasks
            .iter()
            .map(|t| TASK_FIXED_LEN + t.property.name.len() + 1)
            .sum::<usize>()
}

pub fn encode_list(tasks: &[Task]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_list_len(tasks));
    out.extend_from_slice(LIST_HEADER);
    for task in tasks {
        encode_task_into(task, &mut out);
    }
    out
}

/// Decode a framed task list.
///
/// Fails with [`Error::WrongHeader`] if the header is missing and with
/// [`Error::WrongFormat`] if bytes remain that do not form a complete record.
pub fn decode_list(bytes: &[u8]) -> Result<Vec<Task>> {
    let mut rest = bytes.strip_prefix(LIST_HEADER).ok_or(Error::WrongHeader)?;

    let mut tasks = Vec::new();
    while !rest.is_empty() {
        match decode_task(rest) {
            Some((task, used)) => {
                tasks.push(task);
                rest = &rest[used..];
            }
            None => {
                debug!(
                    decoded = tasks.len(),
                    trailing = rest.len(),
                    "task list has an undecodable tail"
                );
                return Err(Error::WrongFormat(format!(
                    "{} undecodable bytes after {} tasks",
                    rest.len(),
                    tasks.len()
                )));
            }
        }
    }
    Ok(tasks)
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}
