use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rsvp_types::{EventId, Reservation, SeatCount, UserId};

use crate::error::{StoreError, StoreResult};
use crate::table::{Change, CommitSink, ReservationTable};
use crate::traits::{ReservationStore, UnitOfWork};

/// One committed unit of work: every row write it made to a single event.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JournalRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub event: EventId,
    pub changes: Vec<Change>,
}

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every commit (safest, highest latency).
    EveryCommit,
    /// Hand every commit to the OS and rely on page-cache writeback.
    #[default]
    OsDefault,
}

/// Configuration for the journal-backed store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Largest payload a frame may carry.
const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

struct JournalWriter {
    file: File,
    offset: u64,
    /// Set when a failed append could not be cut back off the file.
    broken: bool,
}

/// Reservation store backed by an append-only journal file.
///
/// Every commit appends exactly one framed record before the in-memory state
/// changes; an append that fails is cut back off the file, so the journal
/// only ever holds whole commits. A journal belongs to one store at a time:
/// `open` takes an exclusive lock on a sibling `.lock` file and holds it
/// until the store is dropped.
///
/// On open the journal is replayed front to back. A damaged final frame is a
/// torn append and is truncated away. Damage anywhere else fails the open
/// with [`StoreError::CorruptRecord`] and leaves the file as it was, since
/// dropping a record from the middle could resurrect seats it released.
pub struct JournalReservationStore {
    path: PathBuf,
    table: ReservationTable,
    writer: Mutex<JournalWriter>,
    config: JournalConfig,
    _lock: File,
}

impl JournalReservationStore {
    /// Open (or create) the journal at `path` and replay it.
    ///
    /// Fails with [`StoreError::JournalLocked`] while another store holds
    /// the same journal.
    pub fn open(path: &Path, config: JournalConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = acquire_lock(path)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let bytes = fs::read(path)?;
        let recovery = recover(&bytes)?;

        let table = ReservationTable::new();
        for record in &recovery.records {
            table.apply(record.event, &record.changes)?;
        }

        if recovery.valid_len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                valid_len = recovery.valid_len,
                file_len = bytes.len(),
                "truncating torn journal tail"
            );
            file.set_len(recovery.valid_len)?;
        }

        info!(
            path = %path.display(),
            records = recovery.records.len(),
            rows = table.row_count()?,
            "journal store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            table,
            writer: Mutex::new(JournalWriter {
                file,
                offset: recovery.valid_len,
                broken: false,
            }),
            config,
            _lock: lock,
        })
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the journal in bytes.
    pub fn offset(&self) -> StoreResult<u64> {
        let w = self
            .writer
            .lock()
            .map_err(|_| StoreError::poisoned("journal"))?;
        Ok(w.offset)
    }

    /// Number of reservation rows currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        self.table.row_count()
    }

    /// Returns `true` if the store holds no rows.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite the journal as one snapshot record per event.
    ///
    /// Commits are held off for the duration. The new journal is written to a
    /// sibling file and renamed over the old one.
    pub fn compact(&self) -> StoreResult<()> {
        let mut w = self
            .writer
            .lock()
            .map_err(|_| StoreError::poisoned("journal"))?;

        let snapshot = self.table.dump()?;
        let tmp_path = sibling(&self.path, "compact");
        let mut offset = 0u64;
        {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            for (event, changes) in &snapshot {
                let frame = encode_frame(&JournalRecord {
                    event: *event,
                    changes: changes.clone(),
                })?;
                out.write_all(&frame)?;
                offset += frame.len() as u64;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        w.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        w.offset = offset;
        w.broken = false;

        debug!(events = snapshot.len(), bytes = offset, "journal compacted");
        Ok(())
    }
}

impl CommitSink for JournalReservationStore {
    fn commit(&self, table: &ReservationTable, event: EventId, changes: &[Change]) -> StoreResult<()> {
        let frame = encode_frame(&JournalRecord {
            event,
            changes: changes.to_vec(),
        })?;

        // The writer lock spans append and apply so compaction never snapshots
        // state that is missing a record already on disk.
        let mut w = self
            .writer
            .lock()
            .map_err(|_| StoreError::poisoned("journal"))?;
        if w.broken {
            return Err(StoreError::Poisoned(format!(
                "journal {} has an unrecoverable tail",
                self.path.display()
            )));
        }

        let entry_offset = w.offset;
        let sync = self.config.sync_mode == SyncMode::EveryCommit;
        if let Err(e) = append_frame(&mut w.file, entry_offset, &frame, sync) {
            if matches!(e, StoreError::Poisoned(_)) {
                w.broken = true;
            }
            return Err(e);
        }
        w.offset += frame.len() as u64;

        table.apply(event, changes)?;
        debug!(offset = entry_offset, len = frame.len(), %event, "journal append");
        Ok(())
    }
}

impl ReservationStore for JournalReservationStore {
    fn begin(&self, event: EventId, deadline: Instant) -> StoreResult<Box<dyn UnitOfWork + '_>> {
        let unit = self.table.begin(event, deadline, self)?;
        Ok(Box::new(unit))
    }

    fn snapshot_total(&self, event: EventId) -> StoreResult<u64> {
        self.table.total(event)
    }

    fn snapshot_get(&self, event: EventId, user: UserId) -> StoreResult<Option<SeatCount>> {
        self.table.get(event, user)
    }

    fn reservations_for_event(&self, event: EventId) -> StoreResult<Vec<Reservation>> {
        self.table.for_event(event)
    }

    fn reservations_for_user(&self, user: UserId) -> StoreResult<Vec<Reservation>> {
        self.table.for_user(user)
    }
}

impl std::fmt::Debug for JournalReservationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalReservationStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

/// `<journal>.<suffix>`, next to the journal.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Take the exclusive advisory lock guarding `path`.
///
/// The lock lives on a sibling file because compaction replaces the journal
/// itself.
fn acquire_lock(path: &Path) -> StoreResult<File> {
    let lock_path = sibling(path, "lock");
    let lock = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    match fs2::FileExt::try_lock_exclusive(&lock) {
        Ok(()) => Ok(lock),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(StoreError::JournalLocked {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Serialize and frame one record.
fn encode_frame(record: &JournalRecord) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    if payload.len() > MAX_RECORD_SIZE {
        return Err(StoreError::Serialization(format!(
            "record too large: {} bytes",
            payload.len()
        )));
    }
    let length = payload.len() as u32;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// The file operations an append needs beyond [`Write`].
trait JournalFile: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalFile for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Append `frame` to a journal whose valid length is `offset`.
///
/// On failure the file is cut back to `offset`, so a failed commit leaves
/// nothing behind. If that also fails the error is
/// [`StoreError::Poisoned`].
fn append_frame<F: JournalFile>(file: &mut F, offset: u64, frame: &[u8], sync: bool) -> StoreResult<()> {
    let Err(err) = write_all_synced(file, frame, sync) else {
        return Ok(());
    };
    match file.truncate_to(offset) {
        Ok(()) => {
            warn!(offset, error = %err, "journal append failed; tail rolled back");
            Err(err.into())
        }
        Err(rollback) => Err(StoreError::Poisoned(format!(
            "journal append failed ({err}) and truncating back to offset {offset} failed ({rollback})"
        ))),
    }
}

fn write_all_synced<F: JournalFile>(file: &mut F, frame: &[u8], sync: bool) -> io::Result<()> {
    file.write_all(frame)?;
    file.flush()?;
    if sync {
        file.sync()?;
    }
    Ok(())
}

/// Result of replaying a journal image.
struct Recovery {
    records: Vec<JournalRecord>,
    /// Length of the prefix made of whole, valid frames.
    valid_len: u64,
}

enum Frame {
    Record { record: JournalRecord, len: usize },
    /// Bad header, short payload or checksum mismatch.
    Damaged(String),
    /// Checksum matches but the payload is not a valid record.
    Undecodable(String),
}

fn read_frame(buf: &[u8]) -> Frame {
    let Some(header) = buf.get(..HEADER_SIZE) else {
        return Frame::Damaged(format!("{} trailing bytes, short of a header", buf.len()));
    };
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    if length == 0 || length > MAX_RECORD_SIZE {
        return Frame::Damaged(format!("implausible frame length {length}"));
    }
    let Some(payload) = buf.get(HEADER_SIZE..HEADER_SIZE + length) else {
        return Frame::Damaged(format!("frame of {length} bytes runs past the end of the journal"));
    };
    if crc32fast::hash(payload) != expected_crc {
        return Frame::Damaged("CRC mismatch".to_string());
    }
    match bincode::deserialize::<JournalRecord>(payload) {
        Ok(record) => Frame::Record {
            record,
            len: HEADER_SIZE + length,
        },
        Err(e) => Frame::Undecodable(e.to_string()),
    }
}

/// Offset of the first whole, valid frame at or after `from`.
fn next_valid_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&at| matches!(read_frame(&bytes[at..]), Frame::Record { .. }))
}

/// Replay a journal image.
///
/// A damaged frame with no valid frame after it is a torn append: replay
/// stops there and `valid_len` marks where to truncate. A damaged frame
/// followed by valid ones, or a checksummed frame that does not decode, is
/// corruption and fails the whole replay.
fn recover(bytes: &[u8]) -> StoreResult<Recovery> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        match read_frame(&bytes[offset..]) {
            Frame::Record { record, len } => {
                records.push(record);
                offset += len;
            }
            Frame::Undecodable(reason) => {
                return Err(StoreError::CorruptRecord {
                    offset: offset as u64,
                    reason,
                });
            }
            Frame::Damaged(reason) => {
                if let Some(next) = next_valid_frame(bytes, offset + 1) {
                    return Err(StoreError::CorruptRecord {
                        offset: offset as u64,
                        reason: format!("{reason}; a valid record follows at offset {next}"),
                    });
                }
                warn!(offset, reason = %reason, "discarding torn journal tail");
                break;
            }
        }
    }

    debug!(recovered = records.len(), valid_len = offset, "journal replay complete");
    Ok(Recovery {
        records,
        valid_len: offset as u64,
    })
}
