use std::{
    collections::HashSet,
    fmt::{Debug, Formatter},
    path::PathBuf,
};

use hare_core::{
    message::{Message, MessageId, MessageInner},
    queue::QueueName,
    Result,
};
use hare_datastructure::MessageQueue;
use hare_storage::MessageLog;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// The pending messages of a single queue.
///
/// Messages are kept in publish order. If the queue is durable and has a log file, messages
/// published with the durable delivery mode are also written to it and can be recovered after
/// a restart.
///
/// A message that was pushed to a consumer and is waiting for its ack is *claimed*: it stays in
/// the store but is not handed out a second time.
pub struct QueueStore {
    name: QueueName,
    durable: bool,
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    messages: MessageQueue<Message>,
    claimed: HashSet<MessageId>,
    log: Option<MessageLog<MessageInner>>,
    /// highest id the log had records for when it was recovered
    logged_id: Option<MessageId>,
    /// Set once the queue was deleted, everything published afterwards is dropped.
    destroyed: bool,
}

impl QueueStore {
    /// Creates the store. `log_path` is only used for durable queues.
    pub fn open(name: QueueName, durable: bool, log_path: Option<PathBuf>) -> Result<Self> {
        let log = match log_path {
            Some(path) if durable => Some(MessageLog::open(path)?),
            _ => None,
        };

        Ok(Self {
            name,
            durable,
            inner: Mutex::new(StoreInner {
                messages: MessageQueue::new(),
                claimed: HashSet::new(),
                log,
                logged_id: None,
                destroyed: false,
            }),
        })
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Replaces the in-memory messages with the ones persisted in the log. Returns how many
    /// messages were recovered. Does nothing for stores without a log.
    pub fn recovery(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let log = match &mut inner.log {
            Some(log) => log,
            None => return Ok(0),
        };

        let recovered = log.recover()?;
        let count = recovered.len();
        inner.logged_id = log.highest_id().map(MessageId::new);

        inner.messages = recovered.into_iter().map(Message::new).collect();
        inner.claimed.clear();

        debug!(queue = %self.name, count, "Recovered messages");
        Ok(count)
    }

    pub fn insert(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.destroyed {
            debug!(queue = %self.name, id = %message.id(), "Dropping message for deleted queue");
            return Ok(());
        }

        if message.is_persistent() {
            if let Some(log) = &mut inner.log {
                log.append(&message)?;
            }
        }

        trace!(queue = %self.name, id = %message.id(), "Appended message");
        inner.messages.append(message);
        Ok(())
    }

    /// The oldest message that isn't claimed.
    pub fn front(&self) -> Option<Message> {
        let inner = self.inner.lock();
        let front = inner
            .messages
            .iter()
            .find(|message| !inner.claimed.contains(&message.id()))
            .cloned();
        front
    }

    /// Claims the oldest message that isn't claimed yet.
    pub fn claim_front(&self) -> Option<Message> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let message = inner
            .messages
            .iter()
            .find(|message| !inner.claimed.contains(&message.id()))
            .cloned()?;

        inner.claimed.insert(message.id());
        Some(message)
    }

    /// Makes a claimed message available again. Returns whether the message was claimed.
    pub fn release(&self, id: MessageId) -> bool {
        self.inner.lock().claimed.remove(&id)
    }

    /// Removes a message. Removing a message that isn't there is a no-op. Returns whether a
    /// message was removed.
    pub fn remove(&self, id: MessageId) -> Result<bool> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        inner.claimed.remove(&id);

        let removed = match inner.messages.remove(id) {
            Some(message) => message,
            None => return Ok(false),
        };

        trace!(queue = %self.name, %id, "Removed message");

        if let (true, Some(log)) = (removed.is_persistent(), &mut inner.log) {
            log.remove(id.get())?;

            if log.needs_compaction() {
                let live = inner
                    .messages
                    .iter()
                    .filter(|message| message.is_persistent())
                    .map(|message| &**message);

                if let Err(err) = log.compact(live) {
                    warn!(queue = %self.name, %err, "Failed to compact message log");
                }
            }
        }

        Ok(true)
    }

    /// Removes and returns the oldest message that isn't claimed.
    pub fn take_next(&self) -> Result<Option<Message>> {
        match self.front() {
            Some(message) if self.remove(message.id())? => Ok(Some(message)),
            // someone else removed it in the meantime
            Some(_) => self.take_next(),
            None => Ok(None),
        }
    }

    /// Number of messages that can still be handed out.
    pub fn getable_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.messages.len() - inner.claimed.len()
    }

    /// Number of messages in the store, including claimed ones.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The highest message id the store knows of. This includes ids of messages that were
    /// removed but still have records in the recovered log.
    pub fn last_id(&self) -> Option<MessageId> {
        let inner = self.inner.lock();
        let in_memory = inner.messages.iter().map(|message| message.id()).max();
        in_memory.max(inner.logged_id)
    }

    /// Deletes the log file. The messages stay in memory but are not persisted anymore.
    pub fn delete_log(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        if let Some(log) = &mut inner.log {
            log.destroy()?;
        }
        inner.log = None;
        Ok(())
    }

    /// Drops all messages. Called once the queue is deleted, the store drops everything
    /// inserted afterwards.
    pub fn destroy(&self) {
        let mut inner = self.inner.lock();

        inner.destroyed = true;
        inner.messages.clear();
        inner.claimed.clear();
        inner.log = None;
    }
}

impl Debug for QueueStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("name", &self.name)
            .field("durable", &self.durable)
            .finish_non_exhaustive()
    }
}
