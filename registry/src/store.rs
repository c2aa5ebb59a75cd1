//! Record store for projects and tests.
//!
//! Data lives in memory behind a read-write lock; every mutation persists a
//! full snapshot through a [`SnapshotStore`] so a restart resumes from the
//! last write. Reads and writes are separate lock acquisitions, so a
//! duplicate-key check and the insert it guards can race. The losing side
//! gets a conflict only if its check runs after the winning insert; that
//! best-effort window is accepted.

use crate::metrics_defs::SNAPSHOT_WRITE_DURATION;
use crate::model::{Project, Test};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// The full persisted state of the service.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    pub projects: Vec<Project>,
    pub tests: Vec<Test>,
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<StoreData, StoreError>;
    fn store(&self, data: &StoreData) -> Result<(), StoreError>;
}

#[derive(Clone)]
enum Compression {
    #[allow(dead_code)]
    None,
    // zstd with compression level
    Zstd(i32),
}

// JSON rather than a binary encoding: the bucket field's untagged
// string-or-list representation needs a self-describing format to decode.
struct Codec {
    compression: Compression,
}

impl Codec {
    fn new(compression: Compression) -> Self {
        Codec { compression }
    }

    fn write<W: Write>(&self, writer: &mut W, data: &StoreData) -> Result<(), StoreError> {
        match self.compression {
            Compression::None => {
                serde_json::to_writer(&mut *writer, data)?;
                writer.flush()?;
                Ok(())
            }
            Compression::Zstd(level) => {
                let mut encoder = zstd::stream::write::Encoder::new(writer, level)?;
                serde_json::to_writer(&mut encoder, data)?;
                encoder.finish()?;
                Ok(())
            }
        }
    }

    fn read<R: Read>(&self, reader: R) -> Result<StoreData, StoreError> {
        match self.compression {
            Compression::None => {
                let value: StoreData = serde_json::from_reader(reader)?;
                Ok(value)
            }
            Compression::Zstd(_) => {
                let decoder = zstd::stream::read::Decoder::new(reader)?;
                let decoded: StoreData = serde_json::from_reader(decoder)?;
                Ok(decoded)
            }
        }
    }
}

/// Keeps everything in memory only. Used for tests and for deployments that
/// treat the registry as a cache.
pub struct MemorySnapshotStore;

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<StoreData, StoreError> {
        Ok(StoreData::default())
    }

    fn store(&self, _data: &StoreData) -> Result<(), StoreError> {
        // Do nothing
        Ok(())
    }
}

/// Persists snapshots to a single compressed file.
pub struct FilesystemSnapshotStore {
    path: PathBuf,
    codec: Codec,
}

impl FilesystemSnapshotStore {
    pub fn new(base_dir: &str, filename: &str) -> Self {
        FilesystemSnapshotStore {
            path: Path::new(base_dir).join(filename),
            codec: Codec::new(Compression::Zstd(1)),
        }
    }
}

impl SnapshotStore for FilesystemSnapshotStore {
    fn load(&self) -> Result<StoreData, StoreError> {
        let file = File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        self.codec.read(reader)
    }

    fn store(&self, data: &StoreData) -> Result<(), StoreError> {
        // Create or overwrite file
        let file = File::create(&self.path)?;
        let mut writer = io::BufWriter::new(file);
        self.codec.write(&mut writer, data)?;
        tracing::debug!(path = ?self.path, "stored snapshot");
        Ok(())
    }
}

struct StoreInner {
    data: RwLock<StoreData>,
    snapshots: Arc<dyn SnapshotStore>,
}

/// Handle to the record store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens the store from the last snapshot. A missing snapshot file means
    /// a fresh deployment and yields an empty store; any other load failure
    /// propagates.
    pub fn open(snapshots: Arc<dyn SnapshotStore>) -> Result<Self, StoreError> {
        let data = match snapshots.load() {
            Ok(data) => data,
            Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!("no snapshot found, starting with an empty store");
                StoreData::default()
            }
            Err(err) => return Err(err),
        };

        Ok(Store {
            inner: Arc::new(StoreInner {
                data: RwLock::new(data),
                snapshots,
            }),
        })
    }

    pub fn projects(&self) -> Vec<Project> {
        self.inner.data.read().projects.clone()
    }

    pub fn project(&self, name: &str) -> Option<Project> {
        self.inner
            .data
            .read()
            .projects
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub fn insert_project(&self, project: Project) -> Result<(), StoreError> {
        self.mutate(|data| data.projects.push(project))
    }

    pub fn replace_project(&self, name: &str, project: Project) -> Result<(), StoreError> {
        self.mutate(|data| {
            match data.projects.iter_mut().find(|p| p.name == name) {
                Some(existing) => *existing = project,
                None => data.projects.push(project),
            }
        })
    }

    /// Removes the named project. Returns whether a record existed.
    pub fn remove_project(&self, name: &str) -> Result<bool, StoreError> {
        self.mutate(|data| {
            let before = data.projects.len();
            data.projects.retain(|p| p.name != name);
            data.projects.len() != before
        })
    }

    pub fn tests(&self, project: &str) -> Vec<Test> {
        self.inner
            .data
            .read()
            .tests
            .iter()
            .filter(|t| t.project == project)
            .cloned()
            .collect()
    }

    pub fn test(&self, project: &str, uuid: &str) -> Option<Test> {
        self.inner
            .data
            .read()
            .tests
            .iter()
            .find(|t| t.project == project && t.uuid == uuid)
            .cloned()
    }

    pub fn insert_test(&self, test: Test) -> Result<(), StoreError> {
        self.mutate(|data| data.tests.push(test))
    }

    pub fn replace_test(&self, project: &str, uuid: &str, test: Test) -> Result<(), StoreError> {
        self.mutate(|data| {
            match data
                .tests
                .iter_mut()
                .find(|t| t.project == project && t.uuid == uuid)
            {
                Some(existing) => *existing = test,
                None => data.tests.push(test),
            }
        })
    }

    /// Removes one test. Returns whether a record existed.
    pub fn remove_test(&self, project: &str, uuid: &str) -> Result<bool, StoreError> {
        self.mutate(|data| {
            let before = data.tests.len();
            data.tests.retain(|t| !(t.project == project && t.uuid == uuid));
            data.tests.len() != before
        })
    }

    /// Applies a mutation under the write lock, then persists the snapshot
    /// before releasing it.
    fn mutate<F, T>(&self, mutation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreData) -> T,
    {
        let mut guard = self.inner.data.write();
        let out = mutation(&mut guard);

        let start = Instant::now();
        self.inner.snapshots.store(&guard)?;
        metrics::histogram!(SNAPSHOT_WRITE_DURATION.name).record(start.elapsed().as_secs_f64());

        Ok(out)
    }
}
