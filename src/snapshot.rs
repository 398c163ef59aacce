//! Snapshot persistence for the read model.

use crate::model::Tables;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// A persisted checkpoint of every read-model table.
///
/// Snapshots are written atomically to disk (via a `.tmp` + rename) by
/// [`Genealogy::checkpoint`](crate::Genealogy::checkpoint). On the next open
/// only the events after `offset` are projected on top of `tables`.
///
/// The snapshot file is JSON and can be inspected directly:
///
/// ```text
/// $ cat read_model.snapshot.json | jq '{position, offset, hash}'
/// {
///   "position": 312,
///   "offset": 98304,
///   "hash": "a3f2e1b09c4d..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Snapshot {
    pub tables: Tables,

    /// Global position of the last event folded into `tables`.
    pub position: u64,

    /// Byte offset into `events.jsonl` after the last event consumed.
    pub offset: u64,

    /// Hex-encoded xxh64 hash of the last event line processed.
    /// Used for integrity verification on the next open.
    pub hash: String,
}

impl Snapshot {
    pub fn new(tables: Tables, position: u64, offset: u64, hash: String) -> Self {
        Snapshot {
            tables,
            position,
            offset,
            hash,
        }
    }
}

/// Save a snapshot atomically to disk.
///
/// Writes to a `.tmp` file first, syncs, then renames to the final path.
/// If the process crashes mid-write, the old snapshot file survives intact.
pub fn save(path: &Path, snapshot: &Snapshot) -> io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    let json = serde_json::to_vec(snapshot)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a snapshot from disk.
///
/// Returns `Ok(None)` if the file doesn't exist or if deserialization fails
/// (treating a corrupt snapshot as missing triggers a full rebuild).
pub fn load(path: &Path) -> io::Result<Option<Snapshot>> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    match serde_json::from_slice(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            log::warn!("kinfold: ignoring unreadable snapshot {}: {e}", path.display());
            Ok(None)
        }
    }
}

/// Delete a snapshot file and its `.tmp` file if present.
///
/// Idempotent: missing files are not an error.
pub fn delete(path: &Path) -> io::Result<()> {
    for path in [path.to_path_buf(), path.with_extension("json.tmp")] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
