use super::EventStore;
use super::memory::StreamIndex;
use crate::error::{Error, Result};
use crate::event::{EntityKind, Event, ExpectedVersion, PendingEvent};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Whether the log file is locked against a second writer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Exclusive advisory lock (`flock`) held for the store's lifetime.
    #[default]
    Flock,
    /// No locking. Only safe when a single process owns the directory.
    None,
}

/// Compute xxh64 hash of raw line bytes (without trailing newline), hex-encoded.
pub fn line_hash(line: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(line, 0);
    format!("{:016x}", hash)
}

/// Where the log currently ends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogTail {
    /// Global position of the last event in the file; 0 for an empty log.
    pub position: u64,
    /// Byte offset just past the last complete line.
    pub offset: u64,
    /// [`line_hash`] of the last line; empty for an empty log.
    pub hash: String,
}

struct LogWriter {
    file: File,
    tail: LogTail,
}

/// Durable event store backed by a single append-only JSONL file.
///
/// Every event is one JSON line in `events.jsonl`. The whole file is read
/// on open to rebuild the per-aggregate index; afterwards reads are served
/// from memory and appends go to both.
///
/// Global positions are assigned while the file writer is held, so file
/// order and position order agree. A line left half-written by a crash is
/// truncated on the next open.
pub struct FileEventStore {
    dir: PathBuf,
    log_path: PathBuf,
    index: StreamIndex,
    writer: Mutex<LogWriter>,
}

impl FileEventStore {
    /// Open or create a store in the given directory, taking the writer lock.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_lock(dir, LockMode::Flock)
    }

    /// Open or create a store in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an `AlreadyExists` I/O error when another writer holds the
    /// lock, and `InvalidData` when a complete line fails to parse or a
    /// stream is not gapless.
    pub fn open_with_lock(dir: impl AsRef<Path>, lock: LockMode) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let log_path = dir.join("events.jsonl");
        fs::create_dir_all(&dir)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)?;

        if lock == LockMode::Flock && file.try_lock_exclusive().is_err() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!(
                    "another writer holds the lock on {}",
                    log_path.display()
                ),
            )));
        }

        let index = StreamIndex::default();
        let mut tail = LogTail::default();
        for result in read_lines(&log_path, 0)? {
            let (event, next_offset, hash) = result?;
            tail.position = tail.position.max(event.position);
            tail.offset = next_offset;
            tail.hash = hash;
            index.restore(event)?;
        }

        let file_len = file.metadata()?.len();
        if tail.offset < file_len {
            log::warn!(
                "kinfold: {}: discarding {} bytes of torn trailing line",
                log_path.display(),
                file_len - tail.offset
            );
            file.set_len(tail.offset)?;
            file.sync_data()?;
        }

        log::debug!(
            "opened event log {} at position {}",
            log_path.display(),
            tail.position
        );

        Ok(FileEventStore {
            dir,
            log_path,
            index,
            writer: Mutex::new(LogWriter { file, tail }),
        })
    }

    /// Returns the path to the data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the log file.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Returns where the log currently ends.
    pub fn tail(&self) -> LogTail {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tail
            .clone()
    }

    /// Read events from the log starting at the given byte offset.
    pub fn read_from(&self, offset: u64) -> Result<Vec<Event>> {
        read_lines(&self.log_path, offset)?
            .map(|r| r.map(|(event, _, _)| event))
            .collect()
    }

    /// Read the line immediately before the given byte offset and return its hash.
    ///
    /// The offset should point to the byte after the newline of the last consumed line.
    /// Returns `None` if offset is 0 or beyond the end of the file.
    pub fn line_hash_before(&self, offset: u64) -> Result<Option<String>> {
        if offset == 0 {
            return Ok(None);
        }

        let mut file = File::open(&self.log_path)?;
        let file_len = file.metadata()?.len();

        if offset > file_len {
            return Ok(None);
        }

        // offset - 1 is the '\n' at end of previous line
        let newline_pos = offset - 1;
        let mut start = 0u64;

        if newline_pos > 0 {
            let scan_start = newline_pos.saturating_sub(8192);
            file.seek(SeekFrom::Start(scan_start))?;
            let mut buf = vec![0u8; (newline_pos - scan_start) as usize];
            file.read_exact(&mut buf)?;

            if let Some(pos) = buf.iter().rposition(|&b| b == b'\n') {
                start = scan_start + pos as u64 + 1;
            } else {
                start = scan_start;
            }
        }

        file.seek(SeekFrom::Start(start))?;
        let mut line_buf = vec![0u8; (newline_pos - start) as usize];
        file.read_exact(&mut line_buf)?;

        Ok(Some(line_hash(&line_buf)))
    }
}

impl std::fmt::Debug for FileEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEventStore")
            .field("log_path", &self.log_path)
            .finish_non_exhaustive()
    }
}

impl EventStore for FileEventStore {
    fn append(
        &self,
        aggregate_id: Uuid,
        aggregate_type: EntityKind,
        events: Vec<PendingEvent>,
        expected: ExpectedVersion,
    ) -> Result<u64> {
        let version =
            self.index
                .append_with(aggregate_id, aggregate_type, events, expected, |batch| {
                    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
                    let mut tail = writer.tail.clone();

                    let mut buf = Vec::new();
                    for event in batch.iter_mut() {
                        tail.position += 1;
                        event.position = tail.position;
                        let line = serde_json::to_vec(event)?;
                        tail.offset += line.len() as u64 + 1;
                        tail.hash = line_hash(&line);
                        buf.extend_from_slice(&line);
                        buf.push(b'\n');
                    }

                    // One write for the whole batch: a crash leaves at most a
                    // torn final line, which open() truncates.
                    if let Err(e) = write_batch(&mut writer.file, &buf) {
                        let keep = writer.tail.offset;
                        let _ = writer.file.set_len(keep);
                        return Err(e.into());
                    }
                    writer.tail = tail;
                    Ok(())
                })?;
        log::debug!("appended to {aggregate_type} {aggregate_id}, now at version {version}");
        Ok(version)
    }

    fn load(&self, aggregate_id: Uuid) -> Result<Vec<Event>> {
        self.index.load(aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<Event>> {
        Ok(self.index.load_all())
    }

    fn version(&self, aggregate_id: Uuid) -> Result<u64> {
        Ok(self.index.version(aggregate_id))
    }
}

fn write_batch(file: &mut File, buf: &[u8]) -> io::Result<()> {
    file.write_all(buf)?;
    file.sync_data()
}

/// Iterate complete lines of the log from `offset`.
///
/// Yields `(event, next_byte_offset, line_hash)`. Empty lines are skipped; a
/// partial line (missing trailing newline) ends the iteration. Lines are read
/// as raw bytes, so a write torn inside a multibyte character still counts
/// as torn rather than as invalid UTF-8.
fn read_lines(
    path: &Path,
    offset: u64,
) -> Result<impl Iterator<Item = Result<(Event, u64, String)>>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    Ok(LogIterator {
        reader: BufReader::new(file),
        pos: offset,
        buf: Vec::new(),
    })
}

struct LogIterator<R> {
    reader: R,
    pos: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> Iterator for LogIterator<R> {
    type Item = Result<(Event, u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(read) => read as u64,
                Err(e) => return Some(Err(e.into())),
            };

            // EOF, or EOF without a trailing newline: a torn write.
            if self.buf.last() != Some(&b'\n') {
                return None;
            }

            let next_pos = self.pos + read;
            let line = &self.buf[..self.buf.len() - 1];

            if line.is_empty() {
                self.pos = next_pos;
                continue;
            }

            let hash = line_hash(line);

            let event: Event = match serde_json::from_slice(line) {
                Ok(e) => e,
                Err(e) => {
                    return Some(Err(Error::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        e,
                    ))));
                }
            };

            self.pos = next_pos;
            return Some(Ok((event, next_pos, hash)));
        }
    }
}
