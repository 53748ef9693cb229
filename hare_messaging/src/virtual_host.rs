use std::{
    collections::{BTreeMap, HashMap},
    fmt::{Debug, Formatter},
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use hare_core::{
    binding::Binding,
    exchange::{Exchange, ExchangeName},
    message::{BasicProperties, DeliveryMode, Message, MessageId, MessageInner},
    queue::{Queue, QueueName},
    registry::{Entity, Registry},
    BrokerError, Result,
};
use hare_storage::{JsonFileStore, MemoryStore, MetaStore, Record, StorageError};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::{routing, store::QueueStore};

/// Everything a client can see: exchanges, queues, their bindings and the messages in the queues.
///
/// Topology changes (declares, deletes, binds) are serialized through one lock, so a publish sees
/// either all or nothing of a concurrent change. Appending to a store happens outside of it.
pub struct VirtualHost {
    name: String,
    /// `None` for hosts that keep nothing on disk
    message_dir: Option<PathBuf>,
    exchanges: Registry<Exchange>,
    queues: Registry<Queue>,
    binding_store: Box<dyn MetaStore<Binding>>,
    topology: RwLock<Topology>,
    ids: MessageIdSequence,
}

#[derive(Default)]
struct Topology {
    stores: HashMap<QueueName, Arc<QueueStore>>,
    /// An exchange only has an entry while it has at least one binding.
    bindings: HashMap<ExchangeName, BTreeMap<QueueName, Binding>>,
}

/// Hands out message ids, increasing for the lifetime of the host.
#[derive(Debug)]
struct MessageIdSequence(AtomicU64);

impl MessageIdSequence {
    fn starting_after(last: Option<MessageId>) -> Self {
        Self(AtomicU64::new(last.map_or(1, |id| id.get() + 1)))
    }

    fn next(&self) -> MessageId {
        MessageId::new(self.0.fetch_add(1, Ordering::Relaxed))
    }

    fn skip_past(&self, id: MessageId) {
        self.0.fetch_max(id.get() + 1, Ordering::Relaxed);
    }
}

impl VirtualHost {
    /// Opens the host persisted below `base_dir`, creating it if it doesn't exist yet.
    pub fn open(name: impl Into<String>, base_dir: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let dir = base_dir.as_ref().join(file_name(&name));

        fs::create_dir_all(&dir).map_err(StorageError::from)?;
        info!(vhost = %name, dir = %dir.display(), "Opening virtual host");

        Self::with_stores(
            name,
            Some(dir.join("messages")),
            Box::new(JsonFileStore::open(dir.join("exchanges.json"))?),
            Box::new(JsonFileStore::open(dir.join("queues.json"))?),
            Box::new(JsonFileStore::open(dir.join("bindings.json"))?),
        )
    }

    /// A host that doesn't persist anything, durable flags are only remembered.
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        Self::with_stores(
            name,
            None,
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
            Box::new(MemoryStore::new()),
        )
    }

    /// Creates the host on top of the given stores and recovers everything they contain.
    pub fn with_stores(
        name: impl Into<String>,
        message_dir: Option<PathBuf>,
        exchange_store: Box<dyn MetaStore<Exchange>>,
        queue_store: Box<dyn MetaStore<Queue>>,
        binding_store: Box<dyn MetaStore<Binding>>,
    ) -> Result<Self> {
        let name = name.into();

        let exchanges = Registry::open(exchange_store)?;
        exchanges.declare(Exchange::default_exchange())?;

        let queues = Registry::open(queue_store)?;

        let mut topology = Topology::default();
        let mut last_id = None;

        for queue in queues.all() {
            let store = open_store(message_dir.as_deref(), &queue)?;
            store.recovery()?;
            last_id = last_id.max(store.last_id());
            topology.stores.insert(queue.name.clone(), Arc::new(store));
        }

        for binding in binding_store.all()? {
            if exchanges.exists(&binding.exchange) && queues.exists(&binding.queue) {
                debug!(exchange = %binding.exchange, queue = %binding.queue, "Recovered binding");
                topology
                    .bindings
                    .entry(binding.exchange.clone())
                    .or_default()
                    .insert(binding.queue.clone(), binding);
            } else {
                warn!(exchange = %binding.exchange, queue = %binding.queue, "Dropping stale binding");
                binding_store.remove(&binding.record_key())?;
            }
        }

        info!(
            vhost = %name,
            exchanges = exchanges.len(),
            queues = queues.len(),
            next_message_id = last_id.map_or(1, |id: MessageId| id.get() + 1),
            "Virtual host ready"
        );

        Ok(Self {
            name,
            message_dir,
            exchanges,
            queues,
            binding_store,
            topology: RwLock::new(topology),
            ids: MessageIdSequence::starting_after(last_id),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `false` if the exchange already existed. An existing exchange is never changed.
    pub fn declare_exchange(&self, exchange: Exchange) -> Result<bool> {
        let _topology = self.topology.write();
        self.exchanges.declare(exchange)
    }

    /// Deletes the exchange and all of its bindings. The default exchange can't be deleted.
    pub fn delete_exchange(&self, name: &str) -> Result<Option<Exchange>> {
        if name.is_empty() {
            return Err(BrokerError::AccessRefused("the default exchange can't be deleted"));
        }

        let mut topology = self.topology.write();

        let exchange = match self.exchanges.delete(name)? {
            Some(exchange) => exchange,
            None => return Ok(None),
        };

        for binding in topology
            .bindings
            .remove(name)
            .into_iter()
            .flat_map(BTreeMap::into_values)
        {
            self.forget_binding(&binding);
        }

        Ok(Some(exchange))
    }

    /// Returns `false` if the queue already existed. The messages of a durable queue that were
    /// persisted earlier are recovered before the queue becomes visible.
    pub fn declare_queue(&self, queue: Queue) -> Result<bool> {
        let mut topology = self.topology.write();

        if self.queues.exists(&queue.name) {
            return Ok(false);
        }

        let store = open_store(self.message_dir.as_deref(), &queue)?;
        let recovered = store.recovery()?;
        if recovered > 0 {
            warn!(queue = %queue.name, recovered, "Declared queue found leftover messages");
        }
        if let Some(last_id) = store.last_id() {
            self.ids.skip_past(last_id);
        }

        let name = queue.name.clone();
        if !self.queues.declare(queue)? {
            return Ok(false);
        }

        topology.stores.insert(name, Arc::new(store));
        Ok(true)
    }

    /// Deletes the queue with its messages and bindings. Auto-delete exchanges that lose their
    /// last binding by this are deleted as well.
    ///
    /// The message log is deleted first. If that fails, the queue is left unchanged.
    pub fn delete_queue(&self, name: &str) -> Result<Option<Queue>> {
        let mut topology = self.topology.write();

        if !self.queues.exists(name) {
            return Ok(None);
        }

        if let Some(store) = topology.stores.get(name) {
            store.delete_log()?;
        }

        let queue = match self.queues.delete(name)? {
            Some(queue) => queue,
            None => return Ok(None),
        };

        let bound_exchanges = topology
            .bindings
            .iter()
            .filter(|(_, bindings)| bindings.contains_key(name))
            .map(|(exchange, _)| exchange.clone())
            .collect::<Vec<_>>();

        for exchange in bound_exchanges {
            if let Some(binding) = self.remove_binding(&mut topology, &exchange, name) {
                self.forget_binding(&binding);
            }
        }

        if let Some(store) = topology.stores.remove(name) {
            store.destroy();
        }

        Ok(Some(queue))
    }

    /// Binds the queue to the exchange, replacing the binding key if they were bound before.
    pub fn bind(&self, exchange: &str, queue: &str, binding_key: &str) -> Result<()> {
        let mut topology = self.topology.write();

        let exchange = self
            .exchanges
            .select(exchange)
            .ok_or_else(|| BrokerError::not_found("exchange", exchange))?;
        let queue = self
            .queues
            .select(queue)
            .ok_or_else(|| BrokerError::not_found("queue", queue))?;

        let binding = Binding::new(exchange.name.clone(), queue.name.clone(), binding_key);

        if exchange.durable && queue.is_durable() {
            self.binding_store.insert(&binding)?;
        }

        info!(exchange = %exchange.name, queue = %queue.name, %binding_key, "Bound queue");

        topology
            .bindings
            .entry(exchange.name)
            .or_default()
            .insert(queue.name, binding);
        Ok(())
    }

    /// Returns whether they were bound.
    pub fn unbind(&self, exchange: &str, queue: &str) -> Result<bool> {
        let mut topology = self.topology.write();

        let bound = topology
            .bindings
            .get(exchange)
            .map_or(false, |bindings| bindings.contains_key(queue));
        if !bound {
            return Ok(false);
        }

        self.binding_store
            .remove(&Binding::key_for(exchange, queue))?;
        self.remove_binding(&mut topology, exchange, queue);

        info!(%exchange, %queue, "Unbound queue");
        Ok(true)
    }

    /// Routes a message through the exchange and appends a copy to every matching queue. Every
    /// copy gets its own id. Returns the queues the message was appended to.
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        delivery_mode: DeliveryMode,
        body: Bytes,
    ) -> Result<Vec<QueueName>> {
        let targets = {
            let topology = self.topology.read();

            let exchange = self
                .exchanges
                .select(exchange)
                .ok_or_else(|| BrokerError::not_found("exchange", exchange))?;

            let bindings = topology.bindings.get(&exchange.name);
            routing::route(
                exchange.kind,
                routing_key,
                bindings.into_iter().flat_map(BTreeMap::values),
            )
            .into_iter()
            .filter_map(|queue| {
                let store = topology.stores.get(&queue)?;
                Some((queue, Arc::clone(store)))
            })
            .collect::<Vec<_>>()
        };

        if targets.is_empty() {
            debug!(%exchange, %routing_key, "Message did not match any queue, dropping it");
            return Ok(Vec::new());
        }

        let mut queues = Vec::with_capacity(targets.len());

        for (queue, store) in targets {
            let properties = BasicProperties {
                id: self.ids.next(),
                routing_key: routing_key.to_owned(),
                delivery_mode,
            };
            trace!(%exchange, %queue, id = %properties.id, "Routed message");

            store.insert(MessageInner::new(properties, body.clone()))?;
            queues.push(queue);
        }

        Ok(queues)
    }

    /// The oldest message of the queue that isn't claimed, without removing it.
    pub fn consume(&self, queue: &str) -> Result<Option<Message>> {
        Ok(self.store(queue)?.front())
    }

    /// Removes the message from the queue. Returns whether it was still there.
    pub fn ack(&self, queue: &str, id: MessageId) -> Result<bool> {
        self.store(queue)?.remove(id)
    }

    /// Claims the oldest message of the queue for a push delivery.
    pub fn claim_front(&self, queue: &str) -> Result<Option<Message>> {
        Ok(self.store(queue)?.claim_front())
    }

    /// Makes a claimed message available again. Returns whether it was claimed.
    pub fn release(&self, queue: &str, id: MessageId) -> bool {
        let store = self.topology.read().stores.get(queue).cloned();
        store.map_or(false, |store| store.release(id))
    }

    /// Removes and returns the first message found, looking through the queues in the order they
    /// were declared. Claimed messages are skipped.
    pub fn query_any(&self) -> Result<Option<Bytes>> {
        let stores = {
            let topology = self.topology.read();
            self.queues
                .all()
                .into_iter()
                .filter_map(|queue| topology.stores.get(&queue.name).cloned())
                .collect::<Vec<_>>()
        };

        for store in stores {
            if let Some(message) = store.take_next()? {
                debug!(queue = %store.name(), id = %message.id(), "Query took message");
                return Ok(Some(message.body.clone()));
            }
        }

        Ok(None)
    }

    /// Number of messages in the queue that can still be handed out.
    pub fn message_count(&self, queue: &str) -> Result<usize> {
        Ok(self.store(queue)?.getable_count())
    }

    pub fn exchange_bindings(&self, exchange: &str) -> Vec<Binding> {
        self.topology
            .read()
            .bindings
            .get(exchange)
            .map(|bindings| bindings.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn select_exchange(&self, name: &str) -> Option<Exchange> {
        self.exchanges.select(name)
    }

    pub fn select_queue(&self, name: &str) -> Option<Queue> {
        self.queues.select(name)
    }

    pub fn exists_exchange(&self, name: &str) -> bool {
        self.exchanges.exists(name)
    }

    pub fn exists_queue(&self, name: &str) -> bool {
        self.queues.exists(name)
    }

    /// All exchanges in declaration order.
    pub fn all_exchanges(&self) -> Vec<Exchange> {
        self.exchanges.all()
    }

    /// All queues in declaration order.
    pub fn all_queues(&self) -> Vec<Queue> {
        self.queues.all()
    }

    fn store(&self, queue: &str) -> Result<Arc<QueueStore>> {
        match self.topology.read().stores.get(queue) {
            Some(store) => Ok(Arc::clone(store)),
            None => {
                warn!(vhost = %self.name, %queue, "Queue does not exist");
                Err(BrokerError::not_found("queue", queue))
            }
        }
    }

    /// Removes the binding from memory and deletes the exchange if it is auto-delete and this was
    /// its last binding.
    fn remove_binding(
        &self,
        topology: &mut Topology,
        exchange: &str,
        queue: &str,
    ) -> Option<Binding> {
        let bindings = topology.bindings.get_mut(exchange)?;
        let removed = bindings.remove(queue);

        if bindings.is_empty() {
            topology.bindings.remove(exchange);

            let auto_delete = self
                .exchanges
                .select(exchange)
                .map_or(false, |exchange| exchange.auto_delete);

            if auto_delete {
                info!(%exchange, "Deleting auto-delete exchange after its last binding");
                if let Err(err) = self.exchanges.delete(exchange) {
                    warn!(%exchange, %err, "Failed to delete auto-delete exchange");
                }
            }
        }

        removed
    }

    /// Removes the persisted record of a binding that is gone already. A record that can't be
    /// removed is dropped the next time the host starts, since one of its ends is missing.
    fn forget_binding(&self, binding: &Binding) {
        if let Err(err) = self.binding_store.remove(&binding.record_key()) {
            warn!(exchange = %binding.exchange, queue = %binding.queue, %err, "Failed to remove binding record");
        }
    }
}

impl Debug for VirtualHost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualHost")
            .field("name", &self.name)
            .field("message_dir", &self.message_dir)
            .field("exchanges", &self.exchanges)
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

fn open_store(message_dir: Option<&Path>, queue: &Queue) -> Result<QueueStore> {
    let log_path = message_dir.map(|dir| dir.join(format!("{}.mqd", file_name(&queue.name))));
    QueueStore::open(queue.name.clone(), queue.is_durable(), log_path)
}

/// Turns a name into something that can be used as a file name: ascii letters, digits, `-`, `_`
/// and `.` are kept, every other byte is written as `%XX`.
/// Names made up of dots only are escaped completely so they can't point to a parent directory.
fn file_name(name: &str) -> String {
    let keep_dots = !name.bytes().all(|byte| byte == b'.');
    let mut file_name = String::with_capacity(name.len());

    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => {
                file_name.push(char::from(byte))
            }
            b'.' if keep_dots => file_name.push('.'),
            _ => file_name.push_str(&format!("%{byte:02X}")),
        }
    }

    file_name
}

#[cfg(test)]
mod tests {
    use super::file_name;

    #[test]
    fn file_names_are_escaped() {
        assert_eq!(file_name("orders.eu-1_a"), "orders.eu-1_a");
        assert_eq!(file_name("/"), "%2F");
        assert_eq!(file_name("a b%"), "a%20b%25");
        assert_eq!(file_name("ü"), "%C3%BC");
        assert_eq!(file_name(".."), "%2E%2E");
    }
}
