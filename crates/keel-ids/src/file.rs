use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use keel_types::PersistentId;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{IdError, IdResult};
use crate::provider::IdProvider;

/// Number of ids reserved per counter file write.
pub const DEFAULT_BLOCK_SIZE: u64 = 1000;

/// Counter file size: 8 bytes id + 4 bytes CRC.
const FILE_SIZE: usize = 12;

struct Counter {
    /// Last id handed out.
    current: u64,
    /// Highest id durably reserved. Ids up to it may already be in use.
    reserved: u64,
}

/// Durable id counter backed by a small file.
///
/// Ids are reserved in blocks: the file always holds an id at or above every
/// id ever handed out, so a restart resumes above it and an id is never
/// issued twice, at the cost of skipping the unused rest of a block.
///
/// On-disk format:
/// ```text
/// [8 bytes: highest reserved id (little-endian u64)]
/// [4 bytes: CRC32 of the id bytes (little-endian u32)]
/// ```
pub struct FileIdProvider<I> {
    path: PathBuf,
    block_size: u64,
    counter: Mutex<Counter>,
    _kind: PhantomData<fn() -> I>,
}

impl<I: PersistentId> FileIdProvider<I> {
    /// Open the counter at `path`, starting at `seed` if the file does not exist.
    pub fn open(path: &Path, seed: u64) -> IdResult<Self> {
        Self::open_with_block_size(path, seed, DEFAULT_BLOCK_SIZE)
    }

    pub fn open_with_block_size(path: &Path, seed: u64, block_size: u64) -> IdResult<Self> {
        let start = match read_counter(path)? {
            Some(stored) => {
                info!(path = %path.display(), kind = I::LABEL, resume = stored, "id counter resumed");
                stored.max(seed)
            }
            None => seed,
        };
        Ok(Self {
            path: path.to_path_buf(),
            block_size: block_size.max(1),
            counter: Mutex::new(Counter {
                current: start,
                reserved: start,
            }),
            _kind: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The highest id durably reserved so far.
    pub fn reserved_id(&self) -> I {
        I::from_raw(self.counter.lock().reserved)
    }
}

impl<I: PersistentId> fmt::Debug for FileIdProvider<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileIdProvider")
            .field("kind", &I::LABEL)
            .field("path", &self.path)
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl<I: PersistentId> IdProvider<I> for FileIdProvider<I> {
    fn initialize_id(&self) -> IdResult<I> {
        let mut counter = self.counter.lock();
        if !self.path.exists() {
            write_counter(&self.path, counter.reserved)?;
        }
        counter.reserved = counter.reserved.max(counter.current);
        Ok(I::from_raw(counter.current))
    }

    fn current_id(&self) -> I {
        I::from_raw(self.counter.lock().current)
    }

    fn provide_next_id(&self) -> IdResult<I> {
        let mut counter = self.counter.lock();
        let next = counter.current.checked_add(1).ok_or(IdError::Exhausted {
            kind: I::LABEL,
            current: counter.current,
        })?;
        if next > counter.reserved {
            let reserved = counter.current.saturating_add(self.block_size);
            write_counter(&self.path, reserved)?;
            debug!(kind = I::LABEL, reserved, "reserved id block");
            counter.reserved = reserved;
        }
        counter.current = next;
        Ok(I::from_raw(next))
    }

    fn update_current_id(&self, id: I) -> IdResult<()> {
        let mut counter = self.counter.lock();
        let raw = id.raw();
        if raw <= counter.current {
            return Ok(());
        }
        if raw > counter.reserved {
            write_counter(&self.path, raw)?;
            counter.reserved = raw;
        }
        counter.current = raw;
        Ok(())
    }

    fn strategy_name(&self) -> &'static str {
        "File"
    }
}

fn read_counter(path: &Path) -> IdResult<Option<u64>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let corrupt = |reason: String| IdError::CorruptCounter {
        path: path.to_path_buf(),
        reason,
    };
    let frame: [u8; FILE_SIZE] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| corrupt(format!("expected {FILE_SIZE} bytes, found {}", bytes.len())))?;
    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&frame[..8]);
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&frame[8..]);
    let stored_crc = u32::from_le_bytes(crc_bytes);
    let actual_crc = crc32fast::hash(&id_bytes);
    if stored_crc != actual_crc {
        return Err(corrupt(format!(
            "checksum mismatch: stored {stored_crc:#010x}, computed {actual_crc:#010x}"
        )));
    }
    Ok(Some(u64::from_le_bytes(id_bytes)))
}

fn write_counter(path: &Path, value: u64) -> IdResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let id_bytes = value.to_le_bytes();
    let mut frame = Vec::with_capacity(FILE_SIZE);
    frame.extend_from_slice(&id_bytes);
    frame.extend_from_slice(&crc32fast::hash(&id_bytes).to_le_bytes());

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&frame)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
