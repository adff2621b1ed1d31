//! Shared-memory cache of the encoded snapshot.
//!
//! The segment is a file of fixed length `8 + capacity + 8` mapped shared
//! into every attached process:
//!
//! ```text
//! [0, 4)                      size: u32le         bytes of data in use
//! [4, 8)                      version: u32le      bumped by one on every store
//! [8, 8 + size)               data                encoded task list
//! [8 + capacity, .. + 8)      generation: u64le   random, fixed at seeding
//! ```
//!
//! Versions restart at one whenever a segment is created, so readers compare
//! the generation as well to notice they are looking at a different segment.
//!
//! All access happens with the account's named lock held; the mapping is
//! never read or written otherwise.

use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use sched_core::{Error, Result};

/// Bytes taken by the `size` and `version` fields.
pub const HEADER_LEN: usize = 8;

/// Bytes taken by the trailing `generation` field.
pub const GENERATION_LEN: usize = 8;

/// Segment bytes that are not data.
pub const SEGMENT_OVERHEAD: usize = HEADER_LEN + GENERATION_LEN;

const SIZE_RANGE: std::ops::Range<usize> = 0..4;
const VERSION_RANGE: std::ops::Range<usize> = 4..8;

/// Read-only typed view over a segment's bytes.
#[derive(Debug, Clone, Copy)]
pub struct CacheView<'a> {
    bytes: &'a [u8],
}

impl<'a> CacheView<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < SEGMENT_OVERHEAD {
            return Err(Error::ShmInitialization(format!(
                "segment of {} bytes is smaller than its header and trailer",
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len() - SEGMENT_OVERHEAD
    }

    pub fn size(&self) -> u32 {
        read_u32(&self.bytes[SIZE_RANGE])
    }

    pub fn version(&self) -> u32 {
        read_u32(&self.bytes[VERSION_RANGE])
    }

    /// Identity of this segment; zero only before it is seeded.
    pub fn generation(&self) -> u64 {
        let start = self.bytes.len() - GENERATION_LEN;
        let mut raw = [0u8; GENERATION_LEN];
        raw.copy_from_slice(&self.bytes[start..]);
        u64::from_le_bytes(raw)
    }

    /// The `size` bytes in use, or an error if `size` overruns the data region.
    pub fn data(&self) -> Result<&'a [u8]> {
        let size = self.size() as usize;
        if size > self.capacity() {
            return Err(Error::ShmInitialization(format!(
                "size field {} exceeds capacity {}",
                size,
                self.capacity()
            )));
        }
        Ok(&self.bytes[HEADER_LEN..HEADER_LEN + size])
    }
}

/// Mutable typed view over a segment's bytes.
#[derive(Debug)]
pub struct CacheViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> CacheViewMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Result<Self> {
        CacheView::new(bytes)?;
        Ok(Self { bytes })
    }

    pub fn as_view(&self) -> CacheView<'_> {
        CacheView { bytes: &*self.bytes }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len() - SEGMENT_OVERHEAD
    }

    pub fn set_version(&mut self, version: u32) {
        self.bytes[VERSION_RANGE].copy_from_slice(&version.to_le_bytes());
    }

    pub fn set_generation(&mut self, generation: u64) {
        let start = self.bytes.len() - GENERATION_LEN;
        self.bytes[start..].copy_from_slice(&generation.to_le_bytes());
    }

    /// Replace the data region and bump the version, returning the new version.
    pub fn store(&mut self, data: &[u8]) -> Result<u32> {
        let capacity = self.capacity();
        if data.len() > capacity {
            return Err(Error::ShmSizeExceed {
                size: data.len(),
                capacity,
            });
        }
        self.bytes[HEADER_LEN..HEADER_LEN + data.len()].copy_from_slice(data);
        self.bytes[SIZE_RANGE].copy_from_slice(&(data.len() as u32).to_le_bytes());
        let version = next_version(self.as_view().version());
        self.set_version(version);
        Ok(version)
    }
}

/// How a [`SharedCache`] came to be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// This process allocated and seeded the segment.
    Created,
    /// The segment already existed and was attached as-is.
    Opened,
}

/// A mapped shared cache segment.
#[derive(Debug)]
pub struct SharedCache {
    path: PathBuf,
    map: MmapMut,
    origin: CacheOrigin,
}

impl SharedCache {
    /// Attach to the segment at `path`, creating it if absent.
    ///
    /// `seed` is called only on the create path and supplies the initial
    /// data; `None` leaves the segment empty (`size = 0`). A segment whose
    /// version is still zero was left half-initialized and is re-seeded.
    ///
    /// The caller must hold the account's named lock.
    pub fn open_or_create<F>(path: impl Into<PathBuf>, capacity: usize, seed: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Option<Vec<u8>>>,
    {
        let path = path.into();
        let expected_len = (SEGMENT_OVERHEAD + capacity) as u64;
        if capacity > u32::MAX as usize {
            return Err(Error::ShmInitialization(format!(
                "capacity {} does not fit the u32 size field",
                capacity
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| shm_error(parent, "create directory", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| shm_error(&path, "open", e))?;
        let len = file
            .metadata()
            .map_err(|e| shm_error(&path, "stat", e))?
            .len();

        let fresh = len == 0;
        if fresh {
            file.set_len(expected_len)
                .map_err(|e| shm_error(&path, "size", e))?;
        } else if len != expected_len {
            return Err(Error::ShmInitialization(format!(
                "segment {} is {} bytes, expected {}",
                path.display(),
                len,
                expected_len
            )));
        }

        // SAFETY: the file is sized above and never truncated while mapped.
        // Other processes write through their own mappings only while holding
        // the named lock, which this process also holds for every access.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| shm_error(&path, "map", e))?;

        let mut cache = Self {
            path,
            map,
            origin: CacheOrigin::Opened,
        };

        let initialized = cache.view()?.version() != 0;
        if !initialized {
            if !fresh {
                warn!(segment = %cache.path.display(), "re-seeding uninitialized shared cache");
            }
            let data = seed()?.unwrap_or_default();
            let mut view = cache.view_mut()?;
            view.store(&data)?;
            view.set_version(1);
            view.set_generation(new_generation());
            cache.origin = CacheOrigin::Created;
            debug!(segment = %cache.path.display(), bytes = data.len(), "created shared cache");
        } else {
            debug!(segment = %cache.path.display(), "opened shared cache");
        }

        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> CacheOrigin {
        self.origin
    }

    pub fn capacity(&self) -> usize {
        self.map.len() - SEGMENT_OVERHEAD
    }

    pub fn view(&self) -> Result<CacheView<'_>> {
        CacheView::new(&self.map)
    }

    pub fn view_mut(&mut self) -> Result<CacheViewMut<'_>> {
        CacheViewMut::new(&mut self.map)
    }

    pub fn version(&self) -> Result<u32> {
        Ok(self.view()?.version())
    }

    pub fn generation(&self) -> Result<u64> {
        Ok(self.view()?.generation())
    }

    /// Fail with [`Error::ShmSizeExceed`] if `len` bytes would not fit.
    pub fn check_fits(&self, len: usize) -> Result<()> {
        let capacity = self.capacity();
        if len > capacity {
            return Err(Error::ShmSizeExceed {
                size: len,
                capacity,
            });
        }
        Ok(())
    }

    /// Copy out the data region.
    pub fn load(&self) -> Result<Vec<u8>> {
        Ok(self.view()?.data()?.to_vec())
    }

    /// Replace the data region and bump the version, returning the new version.
    pub fn store(&mut self, data: &[u8]) -> Result<u32> {
        self.view_mut()?.store(data)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}

/// Versions start at one; zero marks a segment that was never seeded.
fn next_version(version: u32) -> u32 {
    version.wrapping_add(1).max(1)
}

/// A fresh non-zero segment generation.
fn new_generation() -> u64 {
    (Uuid::new_v4().as_u128() as u64).max(1)
}

fn shm_error(path: &Path, action: &str, e: std::io::Error) -> Error {
    Error::ShmInitialization(format!("failed to {} {}: {}", action, path.display(), e))
}
