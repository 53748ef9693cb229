use std::{
    fmt::{Debug, Formatter},
    fs::{self, File},
    io::{BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::Result;

/// An entity that can be stored in a [`MetaStore`]. The key identifies the record, inserting a
/// record with an existing key replaces it.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn record_key(&self) -> String;
}

/// Persistence for broker metadata. Implementations must return records from [`MetaStore::all`]
/// in the order they were first inserted.
pub trait MetaStore<T: Record>: Send + Sync {
    fn insert(&self, record: &T) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn all(&self) -> Result<Vec<T>>;
}

impl<T: Record, S: MetaStore<T> + ?Sized> MetaStore<T> for Arc<S> {
    fn insert(&self, record: &T) -> Result<()> {
        (**self).insert(record)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn all(&self) -> Result<Vec<T>> {
        (**self).all()
    }
}

/// Keeps the records in memory only. Used for hosts that don't persist anything.
pub struct MemoryStore<T> {
    records: Mutex<Vec<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MetaStore<T> for MemoryStore<T> {
    fn insert(&self, record: &T) -> Result<()> {
        upsert(&mut self.records.lock(), record);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.records.lock().retain(|record| record.record_key() != key);
        Ok(())
    }

    fn all(&self) -> Result<Vec<T>> {
        Ok(self.records.lock().clone())
    }
}

impl<T> Debug for MemoryStore<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

/// Stores all records as a single JSON array. Every change rewrites the document into a
/// temporary file which then replaces the old one, so a crash leaves either the old or the new
/// state on disk.
pub struct JsonFileStore<T> {
    path: PathBuf,
    records: Mutex<Vec<T>>,
}

impl<T: Record> JsonFileStore<T> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let records = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        info!(path = %path.display(), count = records.len(), "Opened metadata store");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, records: &[T]) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");

        {
            let mut file = File::create(&tmp_path)?;
            serde_json::to_writer_pretty(&mut file, records)?;
            file.flush()?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), count = records.len(), "Wrote metadata store");
        Ok(())
    }
}

impl<T: Record> MetaStore<T> for JsonFileStore<T> {
    fn insert(&self, record: &T) -> Result<()> {
        let mut records = self.records.lock();
        let mut updated = records.clone();
        upsert(&mut updated, record);

        self.write(&updated)?;
        *records = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut records = self.records.lock();
        if !records.iter().any(|record| record.record_key() == key) {
            return Ok(());
        }

        let updated = records
            .iter()
            .filter(|record| record.record_key() != key)
            .cloned()
            .collect::<Vec<_>>();

        self.write(&updated)?;
        *records = updated;
        Ok(())
    }

    fn all(&self) -> Result<Vec<T>> {
        Ok(self.records.lock().clone())
    }
}

impl<T> Debug for JsonFileStore<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn upsert<T: Record>(records: &mut Vec<T>, record: &T) {
    let key = record.record_key();
    match records.iter_mut().find(|existing| existing.record_key() == key) {
        Some(existing) => *existing = record.clone(),
        None => records.push(record.clone()),
    }
}
