//! Encrypted on-disk store, one file per account.
//!
//! The file holds `cipher(encode_list(snapshot))` and is always rewritten
//! in full. Callers serialize access with the account's named lock.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use sched_core::account::KEY_LEN;
use sched_core::codec::{self, LIST_HEADER};
use sched_core::{Error, Result, Task};

use crate::cipher::{Aes256Cbc, Cipher};

pub struct PersistentStore {
    path: PathBuf,
    key: [u8; KEY_LEN],
    cipher: Arc<dyn Cipher>,
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PersistentStore {
    /// A store at `path` encrypted with AES-256-CBC under `key`.
    pub fn new(path: impl Into<PathBuf>, key: &[u8; KEY_LEN]) -> Self {
        Self::with_cipher(path, key, Arc::new(Aes256Cbc))
    }

    pub fn with_cipher(path: impl Into<PathBuf>, key: &[u8; KEY_LEN], cipher: Arc<dyn Cipher>) -> Self {
        Self {
            path: path.into(),
            key: *key,
            cipher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write an empty schedule, failing with [`Error::UserAlreadyExists`]
    /// if the file is already there.
    pub fn create_empty(&self) -> Result<()> {
        self.ensure_parent()?;
        let encrypted = self.cipher.encrypt(LIST_HEADER, &self.key)?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(Error::UserAlreadyExists),
            Err(e) => return Err(Error::file_io(&self.path, e)),
        };
        file.write_all(&encrypted)
            .map_err(|e| Error::file_io(&self.path, e))?;

        debug!(store = %self.path.display(), "created empty store");
        Ok(())
    }

    /// Read, decrypt and decode the stored snapshot.
    ///
    /// A missing file is [`Error::UserNotFound`]; data that does not decrypt
    /// to the list header is [`Error::WrongPassword`].
    pub fn load(&self) -> Result<Vec<Task>> {
        let plain = self.load_plain()?;
        let tasks = codec::decode_list(&plain).map_err(|e| match e {
            Error::WrongHeader => Error::WrongPassword,
            other => other,
        })?;
        debug!(store = %self.path.display(), tasks = tasks.len(), "loaded store");
        Ok(tasks)
    }

    fn load_plain(&self) -> Result<Vec<u8>> {
        let encrypted = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::UserNotFound),
            Err(e) => return Err(Error::file_io(&self.path, e)),
        };
        let plain = self.cipher.decrypt(&encrypted, &self.key)?;
        if !plain.starts_with(LIST_HEADER) {
            return Err(Error::WrongPassword);
        }
        Ok(plain)
    }

    pub fn store(&self, tasks: &[Task]) -> Result<()> {
        self.store_encoded(&codec::encode_list(tasks))
    }

    /// Encrypt already-encoded list bytes and overwrite the file.
    pub fn store_encoded(&self, encoded: &[u8]) -> Result<()> {
        self.ensure_parent()?;
        let encrypted = self.cipher.encrypt(encoded, &self.key)?;
        fs::write(&self.path, encrypted).map_err(|e| Error::file_io(&self.path, e))?;
        debug!(store = %self.path.display(), bytes = encoded.len(), "wrote store");
        Ok(())
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file_io(parent, e))?;
        }
        Ok(())
    }
}
