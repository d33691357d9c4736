//! Write-Ahead Log for subscription sets.
//!
//! Every commit and every state change is appended here (and fsynced)
//! before it becomes visible. On open the log is replayed to rebuild the
//! latest set and its state. A torn tail left by a crash is truncated.
//!
//! Once the log grows past a threshold it is rewritten as a checkpoint:
//! the latest commit followed by its state.

use crate::error::{Result, SyncError};
use crate::subscriptions::{Subscription, VersionStatus};
use crate::types::{Timestamp, Version};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for WAL file.
const WAL_MAGIC: &[u8; 4] = b"SWL\0";

/// Current WAL format version.
const WAL_VERSION: u8 = 1;

const HEADER_LEN: u64 = 5;

/// Upper bound for a single entry. Larger lengths mean a corrupt header.
const MAX_ENTRY_LEN: usize = 64 * 1024 * 1024;

/// A single WAL entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalEntry {
    /// Sequence number, unique within one log file.
    pub seq: u64,
    /// The operation.
    pub operation: WalOperation,
    /// When the entry was written.
    pub timestamp: Timestamp,
}

/// Operations recorded in the WAL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WalOperation {
    /// A new subscription set version, with its full contents.
    Commit {
        version: Version,
        subscriptions: Vec<Subscription>,
    },
    /// The latest version changed state.
    State {
        version: Version,
        status: VersionStatus,
    },
}

/// Write-Ahead Log manager.
pub struct WriteAheadLog {
    /// Path to the WAL file.
    path: PathBuf,
    /// Next sequence number and number of entries in the file.
    counters: Mutex<Counters>,
    /// Write handle.
    writer: Mutex<BufWriter<File>>,
}

#[derive(Clone, Copy)]
struct Counters {
    next_seq: u64,
    entries: usize,
}

impl WriteAheadLog {
    /// Create or open a WAL file, truncating any torn tail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let counters = if path.exists() {
            let (entries, good_len) = Self::scan(&path)?;
            let file_len = fs::metadata(&path)?.len();
            if good_len < file_len {
                warn!(
                    path = %path.display(),
                    dropped_bytes = file_len - good_len,
                    "truncating torn WAL tail"
                );
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(good_len)?;
                file.sync_all()?;
            }
            let next_seq = entries.last().map_or(1, |e| e.seq + 1);
            Counters {
                next_seq,
                entries: entries.len(),
            }
        } else {
            Self::write_header(&path)?;
            Counters {
                next_seq: 1,
                entries: 0,
            }
        };

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(Self {
            path,
            counters: Mutex::new(counters),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Log an operation (returns sequence number).
    pub fn log(&self, operation: WalOperation) -> Result<u64> {
        let mut counters = self.counters.lock();
        let seq = counters.next_seq;

        let entry = WalEntry {
            seq,
            operation,
            timestamp: Timestamp::now(),
        };

        let mut writer = self.writer.lock();
        Self::write_entry(&mut *writer, &entry)?;
        writer.flush()?;
        // fsync for durability
        writer.get_ref().sync_all()?;

        counters.next_seq += 1;
        counters.entries += 1;
        Ok(seq)
    }

    /// Read every intact entry in order.
    pub fn entries(&self) -> Result<Vec<WalEntry>> {
        let (entries, _) = Self::scan(&self.path)?;
        Ok(entries)
    }

    /// Number of entries in the file.
    pub fn len(&self) -> usize {
        self.counters.lock().entries
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole log with `operations`.
    ///
    /// Written to a temporary file and renamed over the log, so a crash
    /// leaves either the old or the new contents.
    pub fn rewrite(&self, operations: Vec<WalOperation>) -> Result<()> {
        let mut counters = self.counters.lock();
        let mut writer = self.writer.lock();
        writer.flush()?;

        let tmp_path = self.path.with_extension("wal.tmp");
        Self::write_header(&tmp_path)?;
        let count = operations.len();
        {
            let file = OpenOptions::new().append(true).open(&tmp_path)?;
            let mut tmp = BufWriter::new(file);
            for (i, operation) in operations.into_iter().enumerate() {
                let entry = WalEntry {
                    seq: i as u64 + 1,
                    operation,
                    timestamp: Timestamp::now(),
                };
                Self::write_entry(&mut tmp, &entry)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        *writer = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        *counters = Counters {
            next_seq: count as u64 + 1,
            entries: count,
        };

        debug!(path = %self.path.display(), entries = count, "WAL compacted");
        Ok(())
    }

    fn write_header(path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(WAL_MAGIC)?;
        file.write_all(&[WAL_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    /// Read all intact entries and the byte length they cover.
    fn scan(path: &Path) -> Result<(Vec<WalEntry>, u64)> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        // Verify header
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != WAL_MAGIC {
            return Err(SyncError::InvalidFormat("Invalid WAL magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != WAL_VERSION {
            return Err(SyncError::InvalidFormat(format!(
                "Unsupported WAL version: {}",
                version[0]
            )));
        }

        let mut entries = Vec::new();
        let mut good_len = HEADER_LEN;
        loop {
            match Self::read_entry(&mut reader) {
                Ok((entry, size)) => {
                    entries.push(entry);
                    good_len += size;
                }
                Err(SyncError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stopping WAL replay at bad entry");
                    break;
                }
            }
        }

        Ok((entries, good_len))
    }

    fn write_entry<W: Write>(writer: &mut W, entry: &WalEntry) -> Result<()> {
        let encoded = rmp_serde::to_vec(entry)?;

        let len = encoded.len() as u32;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&encoded)?;

        let checksum = crc32fast::hash(&encoded);
        writer.write_all(&checksum.to_le_bytes())?;

        Ok(())
    }

    fn read_entry<R: Read>(reader: &mut R) -> Result<(WalEntry, u64)> {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_ENTRY_LEN {
            return Err(SyncError::Corruption("WAL entry too large".into()));
        }

        let mut encoded = vec![0u8; len];
        reader.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let computed_checksum = crc32fast::hash(&encoded);
        if stored_checksum != computed_checksum {
            return Err(SyncError::Corruption("WAL checksum mismatch".into()));
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok((entry, 8 + len as u64))
    }
}
