//! Error types for the schedulite core library.

use std::path::PathBuf;

use thiserror::Error;

/// Error kinds surfaced by every schedule operation.
///
/// Lower-layer failures (file system, cipher, shared memory, named lock)
/// are mapped onto one of these at the point where they occur.
#[derive(Error, Debug)]
pub enum Error {
    #[error("File IO error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Wrong user password")]
    WrongPassword,

    #[error("Invalid username: {0:?}")]
    InvalidName(String),

    #[error("Wrong header: data does not start with the schedule header")]
    WrongHeader,

    #[error("Wrong format: {0}")]
    WrongFormat(String),

    #[error("Task not found: {0}")]
    TaskNotFound(u32),

    #[error("Task with the same name and begin time already exists: {name:?} at {begin_time}")]
    TaskAlreadyExist { begin_time: u32, name: String },

    #[error("Invalid task name: names must not contain NUL bytes")]
    InvalidTaskName,

    #[error("Failed to initialize shared memory: {0}")]
    ShmInitialization(String),

    #[error("Shared memory size exceed: {size} bytes > capacity {capacity}")]
    ShmSizeExceed { size: usize, capacity: usize },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using the schedulite Error type.
pub type Result<T> = std::result::Result<T, Error>;
