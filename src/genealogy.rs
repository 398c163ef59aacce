//! The public facade: one event store, one read model, every command.

use crate::error::Result;
use crate::executor::Executor;
use crate::model::{PersonName, Record, Tables};
use crate::projector;
use crate::read_model::{ListQuery, MemoryReadModel, Page, ReadModelStore};
use crate::snapshot::{self, Snapshot};
use crate::store::{EventStore, FileEventStore, LockMode, MemoryEventStore};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SNAPSHOT_FILE: &str = "read_model.snapshot.json";

/// Default upper bound on page sizes for lists and history.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) max_page_size: usize,
    snapshot_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            snapshot_path: None,
        }
    }
}

impl Settings {
    pub(crate) fn clamp(&self, limit: usize) -> usize {
        limit.clamp(1, self.max_page_size.max(1))
    }
}

/// An event-sourced family tree.
///
/// Commands append to the event store and project into the read model
/// before returning, so a caller always reads its own writes. Queries go to
/// the read model; history and rollback go back to the event streams.
///
/// # Examples
///
/// ```
/// use kinfold::{CommandContext, Genealogy, NewPerson, Person};
///
/// let tree = Genealogy::in_memory();
/// let ctx = CommandContext::default().with_actor("user-1");
/// let created = tree
///     .create_person(&ctx, NewPerson {
///         given_name: "Ada".into(),
///         surname: "Lovelace".into(),
///         ..Default::default()
///     })
///     .unwrap();
///
/// let ada: Person = tree.get(created.id).unwrap();
/// assert_eq!(ada.version, 1);
/// ```
pub struct Genealogy<E = MemoryEventStore, R = MemoryReadModel> {
    pub(crate) executor: Executor<E, R>,
    pub(crate) settings: Settings,
}

impl Genealogy<MemoryEventStore, MemoryReadModel> {
    /// An empty tree that lives only as long as the process.
    pub fn in_memory() -> Self {
        Genealogy {
            executor: Executor::new(MemoryEventStore::new(), MemoryReadModel::new()),
            settings: Settings::default(),
        }
    }
}

impl Default for Genealogy<MemoryEventStore, MemoryReadModel> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Genealogy<FileEventStore, MemoryReadModel> {
    /// Configure a durable tree stored in `dir`.
    pub fn builder(dir: impl AsRef<Path>) -> GenealogyBuilder {
        GenealogyBuilder::new(dir)
    }
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    /// Wrap existing stores and rebuild the read model from the event log.
    pub fn new(events: E, read_model: R) -> Result<Self> {
        let genealogy = Genealogy {
            executor: Executor::new(events, read_model),
            settings: Settings::default(),
        };
        genealogy.rebuild()?;
        Ok(genealogy)
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.settings.max_page_size = max_page_size;
        self
    }

    pub fn events(&self) -> &E {
        &self.executor.events
    }

    pub fn read_model(&self) -> &R {
        &self.executor.read_model
    }

    /// The largest page any list or history query returns.
    pub fn max_page_size(&self) -> usize {
        self.settings.max_page_size
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) when no live
    /// record of that kind exists under `id`.
    pub fn get<T: Record>(&self, id: Uuid) -> Result<T> {
        self.executor.read_model.get(id)
    }

    /// List records; the page size is clamped to
    /// [`max_page_size`](Self::max_page_size).
    pub fn list<T: Record>(&self, query: &ListQuery) -> Result<Page<T>> {
        let mut query = query.clone();
        query.limit = self.settings.clamp(query.limit);
        self.executor.read_model.list(&query)
    }

    /// Every name of a person, primary name first.
    pub fn names(&self, person_id: Uuid) -> Vec<PersonName> {
        self.executor
            .read_model
            .query(|tables| tables.names_of(person_id).into_iter().cloned().collect())
    }

    /// Run a read against a consistent view of every table.
    pub fn query<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        self.executor.read_model.query(f)
    }

    /// Current stream length of an aggregate; 0 when it has no history.
    pub fn version(&self, id: Uuid) -> Result<u64> {
        self.executor.events.version(id)
    }

    /// Discard the read model and replay the whole log into it.
    ///
    /// Holds every aggregate lock, so no command commits meanwhile.
    pub fn rebuild(&self) -> Result<()> {
        let _all = self.executor.lock_all();
        let events = self.executor.events.load_all()?;
        let mut tables = Tables::default();
        projector::replay(&mut tables, &events);
        self.executor.read_model.restore(tables);
        log::info!("rebuilt read model from {} event(s)", events.len());
        Ok(())
    }
}

impl<R: ReadModelStore> Genealogy<FileEventStore, R> {
    /// Data directory of the event log.
    pub fn dir(&self) -> &Path {
        self.executor.events.dir()
    }

    /// Write the read model to its snapshot file.
    ///
    /// The next open then only projects events appended after this point.
    /// Does nothing when snapshots are disabled.
    pub fn checkpoint(&self) -> Result<()> {
        let Some(path) = &self.settings.snapshot_path else {
            log::debug!("snapshots disabled, skipping checkpoint");
            return Ok(());
        };
        let _all = self.executor.lock_all();
        let tail = self.executor.events.tail();
        let position = tail.position;
        let snap = Snapshot::new(
            self.executor.read_model.snapshot(),
            position,
            tail.offset,
            tail.hash,
        );
        snapshot::save(path, &snap)?;
        log::info!("saved read-model snapshot at position {position}");
        Ok(())
    }
}

/// Builder for a durable [`Genealogy`].
///
/// # Examples
///
/// ```no_run
/// use kinfold::{Genealogy, LockMode};
///
/// let tree = Genealogy::builder("data/tree")
///     .lock_mode(LockMode::Flock)
///     .max_page_size(200)
///     .open()
///     .unwrap();
/// tree.checkpoint().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct GenealogyBuilder {
    dir: PathBuf,
    lock_mode: LockMode,
    snapshots: bool,
    max_page_size: usize,
}

impl GenealogyBuilder {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        GenealogyBuilder {
            dir: dir.as_ref().to_path_buf(),
            lock_mode: LockMode::default(),
            snapshots: true,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.lock_mode = mode;
        self
    }

    /// Load and write read-model snapshots (on by default).
    pub fn snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = enabled;
        self
    }

    pub fn max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Open the event log and bring the read model up to date.
    ///
    /// A valid snapshot is loaded and only newer events are projected;
    /// otherwise the whole log is replayed.
    ///
    /// # Errors
    ///
    /// Fails when the log cannot be opened or locked, or holds malformed
    /// lines.
    pub fn open(self) -> Result<Genealogy<FileEventStore, MemoryReadModel>> {
        let events = FileEventStore::open_with_lock(&self.dir, self.lock_mode)?;
        let snapshot_path = self.snapshots.then(|| self.dir.join(SNAPSHOT_FILE));

        let restored = match &snapshot_path {
            Some(path) => restore_snapshot(&events, path)?,
            None => None,
        };

        let genealogy = Genealogy {
            executor: Executor::new(events, MemoryReadModel::new()),
            settings: Settings {
                max_page_size: self.max_page_size,
                snapshot_path,
            },
        };
        match restored {
            Some(tables) => genealogy.executor.read_model.restore(tables),
            None => genealogy.rebuild()?,
        }
        Ok(genealogy)
    }
}

/// Load the snapshot and catch it up with the log.
///
/// Returns `None` when there is no usable snapshot: missing, corrupt, or no
/// longer matching the log it was taken from.
fn restore_snapshot(events: &FileEventStore, path: &Path) -> Result<Option<Tables>> {
    let Some(snap) = snapshot::load(path)? else {
        return Ok(None);
    };

    let matches_log = if snap.offset == 0 {
        snap.hash.is_empty()
    } else {
        events.line_hash_before(snap.offset)?.as_deref() == Some(snap.hash.as_str())
    };
    if !matches_log {
        log::warn!(
            "kinfold: snapshot {} does not match the event log, removing it and rebuilding",
            path.display()
        );
        snapshot::delete(path)?;
        return Ok(None);
    }

    let mut tables = snap.tables;
    let newer = events.read_from(snap.offset)?;
    projector::replay(&mut tables, &newer);
    log::debug!(
        "restored snapshot at position {}, projected {} newer event(s)",
        snap.position,
        newer.len()
    );
    Ok(Some(tables))
}
