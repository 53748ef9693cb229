use std::{
    collections::HashSet,
    fmt::{Debug, Formatter},
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Result;

/// Size of the length and checksum fields in front of every record.
const RECORD_HEADER_LEN: usize = 8;

/// Compaction only kicks in after this many remove records.
const COMPACT_MIN_REMOVED: usize = 2000;

/// A message that can be written to a [`MessageLog`].
pub trait LogEntry: Serialize + DeserializeOwned {
    fn log_id(&self) -> u64;
}

#[derive(Serialize)]
enum RecordRef<'a, T> {
    Insert(&'a T),
    Remove(u64),
}

// must keep the variant order of `RecordRef`, bincode encodes the variant index
#[derive(Deserialize)]
enum Record<T> {
    Insert(T),
    Remove(u64),
}

/// Append-only file holding the persistent messages of a single queue.
///
/// Every record is laid out as `len: u32 LE | crc32: u32 LE | payload`, where the payload is a
/// bincode encoded insert or remove record. Removing a message appends a remove record, the
/// file only shrinks when it gets [compacted](MessageLog::compact).
pub struct MessageLog<T> {
    path: PathBuf,
    file: File,
    live: usize,
    removed: usize,
    /// highest id of any record, inserts and removes alike
    highest_id: Option<u64>,
    _entry: std::marker::PhantomData<fn() -> T>,
}

impl<T: LogEntry> MessageLog<T> {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = open_append(&path)?;

        Ok(Self {
            path,
            file,
            live: 0,
            removed: 0,
            highest_id: None,
            _entry: std::marker::PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back all messages that were appended and not removed, in the order they were
    /// appended. A torn record at the end of the file (from a crash during a write) is cut off.
    ///
    /// Afterwards [`MessageLog::highest_id`] knows every id the log mentions. New entries must use
    /// ids above it, a remove record would otherwise hide them on the next recovery.
    pub fn recover(&mut self) -> Result<Vec<T>> {
        let mut buf = Vec::new();
        File::open(&self.path)?.read_to_end(&mut buf)?;

        let mut inserted = Vec::new();
        let mut removed = HashSet::new();
        let mut highest_id = None;
        let mut offset = 0;

        while let Some(payload) = next_record(&buf, offset) {
            match bincode::deserialize::<Record<T>>(payload) {
                Ok(Record::Insert(entry)) => {
                    highest_id = highest_id.max(Some(entry.log_id()));
                    inserted.push(entry);
                }
                Ok(Record::Remove(id)) => {
                    highest_id = highest_id.max(Some(id));
                    removed.insert(id);
                }
                Err(err) => {
                    warn!(%err, offset, path = %self.path.display(), "Undecodable log record");
                    break;
                }
            }
            offset += RECORD_HEADER_LEN + payload.len();
        }

        if offset < buf.len() {
            warn!(
                path = %self.path.display(),
                valid = offset,
                len = buf.len(),
                "Truncating damaged tail of message log"
            );
            self.file.set_len(offset as u64)?;
            self.file.sync_all()?;
        }

        let remove_records = removed.len();
        let live = inserted
            .into_iter()
            .filter(|entry| !removed.contains(&entry.log_id()))
            .collect::<Vec<_>>();

        self.live = live.len();
        self.removed = remove_records;
        self.highest_id = highest_id;

        info!(path = %self.path.display(), count = live.len(), "Recovered message log");

        Ok(live)
    }

    pub fn append(&mut self, entry: &T) -> Result<()> {
        self.write_record(&RecordRef::Insert(entry))?;
        self.live += 1;
        self.highest_id = self.highest_id.max(Some(entry.log_id()));
        Ok(())
    }

    pub fn remove(&mut self, id: u64) -> Result<()> {
        self.write_record(&RecordRef::<T>::Remove(id))?;
        self.live = self.live.saturating_sub(1);
        self.removed += 1;
        self.highest_id = self.highest_id.max(Some(id));
        Ok(())
    }

    pub fn highest_id(&self) -> Option<u64> {
        self.highest_id
    }

    /// Whether enough dead records piled up that rewriting the log is worth it.
    pub fn needs_compaction(&self) -> bool {
        self.removed > COMPACT_MIN_REMOVED && self.removed > self.live
    }

    /// Rewrites the log to contain exactly `live`, in the given order.
    pub fn compact<'a>(&mut self, live: impl IntoIterator<Item = &'a T>) -> Result<()>
    where
        T: 'a,
    {
        let tmp_path = self.path.with_extension("mqd.tmp");
        let mut count = 0;

        {
            let mut tmp = File::create(&tmp_path)?;
            for entry in live {
                tmp.write_all(&encode_record(&RecordRef::Insert(entry))?)?;
                count += 1;
            }
            tmp.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        self.file = open_append(&self.path)?;

        debug!(path = %self.path.display(), dropped = self.removed, count, "Compacted message log");

        self.live = count;
        self.removed = 0;
        Ok(())
    }

    /// Deletes the log file. The log must not be written to afterwards. If deleting fails, the
    /// file is left as it was.
    pub fn destroy(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        debug!(path = %self.path.display(), "Deleted message log");
        self.live = 0;
        self.removed = 0;
        Ok(())
    }

    fn write_record(&mut self, record: &RecordRef<'_, T>) -> Result<()> {
        let bytes = encode_record(record)?;
        self.file.write_all(&bytes)?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl<T> Debug for MessageLog<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageLog")
            .field("path", &self.path)
            .field("live", &self.live)
            .field("removed", &self.removed)
            .field("highest_id", &self.highest_id)
            .finish()
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
}

fn encode_record<T: Serialize>(record: &RecordRef<'_, T>) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(ErrorKind::InvalidInput, "log record larger than 4GiB")
    })?;

    let mut bytes = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Returns the payload of the record at `offset` if it is complete and its checksum matches.
fn next_record(buf: &[u8], offset: usize) -> Option<&[u8]> {
    let header = buf.get(offset..offset + RECORD_HEADER_LEN)?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let start = offset + RECORD_HEADER_LEN;
    let payload = buf.get(start..start + len)?;

    (crc32fast::hash(payload) == crc).then(|| payload)
}

#[cfg(test)]
mod tests {
    use std::{fs::OpenOptions, io::Write};

    use serde::{Deserialize, Serialize};

    use super::{LogEntry, MessageLog, COMPACT_MIN_REMOVED};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Msg {
        id: u64,
        body: Vec<u8>,
    }

    impl LogEntry for Msg {
        fn log_id(&self) -> u64 {
            self.id
        }
    }

    fn msg(id: u64, body: &str) -> Msg {
        Msg {
            id,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn recovers_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.mqd");

        {
            let mut log = MessageLog::open(&path).unwrap();
            log.append(&msg(1, "a")).unwrap();
            log.append(&msg(2, "b")).unwrap();
            log.append(&msg(3, "c")).unwrap();
            log.remove(2).unwrap();
            log.remove(42).unwrap();
        }

        let mut log = MessageLog::<Msg>::open(&path).unwrap();
        assert_eq!(log.recover().unwrap(), vec![msg(1, "a"), msg(3, "c")]);
        assert_eq!(log.highest_id(), Some(42));
    }

    #[test]
    fn highest_id_counts_removed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.mqd");

        {
            let mut log = MessageLog::open(&path).unwrap();
            log.append(&msg(1, "a")).unwrap();
            log.append(&msg(2, "b")).unwrap();
            log.remove(1).unwrap();
            log.remove(2).unwrap();
            assert_eq!(log.highest_id(), Some(2));
        }

        let mut log = MessageLog::<Msg>::open(&path).unwrap();
        assert!(log.recover().unwrap().is_empty());
        assert_eq!(log.highest_id(), Some(2));

        let mut empty = MessageLog::<Msg>::open(dir.path().join("empty.mqd")).unwrap();
        assert!(empty.recover().unwrap().is_empty());
        assert_eq!(empty.highest_id(), None);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.mqd");

        {
            let mut log = MessageLog::open(&path).unwrap();
            log.append(&msg(1, "a")).unwrap();
        }
        let intact_len = std::fs::metadata(&path).unwrap().len();

        // half a header
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[12, 0, 0])
            .unwrap();

        let mut log = MessageLog::<Msg>::open(&path).unwrap();
        assert_eq!(log.recover().unwrap(), vec![msg(1, "a")]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);

        log.append(&msg(2, "b")).unwrap();
        drop(log);

        let mut log = MessageLog::<Msg>::open(&path).unwrap();
        assert_eq!(log.recover().unwrap(), vec![msg(1, "a"), msg(2, "b")]);
    }

    #[test]
    fn compaction_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.mqd");
        let mut log = MessageLog::open(&path).unwrap();

        let total = COMPACT_MIN_REMOVED as u64 + 10;
        for id in 0..total {
            log.append(&msg(id, "x")).unwrap();
        }
        for id in 0..total - 3 {
            log.remove(id).unwrap();
        }
        assert!(log.needs_compaction());

        let live = (total - 3..total).map(|id| msg(id, "x")).collect::<Vec<_>>();
        log.compact(&live).unwrap();
        assert!(!log.needs_compaction());
        drop(log);

        let mut log = MessageLog::<Msg>::open(&path).unwrap();
        assert_eq!(log.recover().unwrap(), live);
    }

    #[test]
    fn destroy_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.mqd");
        let mut log = MessageLog::open(&path).unwrap();
        log.append(&msg(1, "a")).unwrap();

        log.destroy().unwrap();
        assert!(!path.exists());
    }
}
