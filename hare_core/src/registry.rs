use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt::{Debug, Display, Formatter},
    hash::Hash,
};

use hare_storage::{MetaStore, Record};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::Result;

/// Metadata that lives in a [`Registry`].
pub trait Entity: Record + Debug {
    type Name: Clone + Eq + Hash + Borrow<str> + Display + Debug + Send + Sync;

    /// Used in log messages and errors.
    const KIND: &'static str;

    fn name(&self) -> &Self::Name;

    fn is_durable(&self) -> bool;
}

/// Owns all entities of one kind (exchanges or queues) of a virtual host.
///
/// Entities are immutable once declared. Durable entities are written through to the metadata
/// store before they become visible.
pub struct Registry<E: Entity> {
    entries: Mutex<Entries<E>>,
    store: Box<dyn MetaStore<E>>,
}

struct Entries<E: Entity> {
    by_name: HashMap<E::Name, E>,
    /// declaration order
    order: Vec<E::Name>,
}

impl<E: Entity> Registry<E> {
    /// Creates the registry with every entity that was persisted in `store`.
    pub fn open(store: Box<dyn MetaStore<E>>) -> Result<Self> {
        let recovered = store.all()?;

        let mut entries = Entries {
            by_name: HashMap::with_capacity(recovered.len()),
            order: Vec::with_capacity(recovered.len()),
        };

        for entity in recovered {
            debug!(kind = E::KIND, name = %entity.name(), "Recovered entity");
            entries.order.push(entity.name().clone());
            entries.by_name.insert(entity.name().clone(), entity);
        }

        Ok(Self {
            entries: Mutex::new(entries),
            store,
        })
    }

    /// Declares the entity. Returns `false` if an entity with that name already exists, the
    /// existing one is left untouched in that case.
    pub fn declare(&self, entity: E) -> Result<bool> {
        let mut entries = self.entries.lock();

        if entries.by_name.contains_key::<E::Name>(entity.name()) {
            return Ok(false);
        }

        if entity.is_durable() {
            self.store.insert(&entity)?;
        }

        info!(kind = E::KIND, name = %entity.name(), durable = entity.is_durable(), "Declared");

        entries.order.push(entity.name().clone());
        entries.by_name.insert(entity.name().clone(), entity);
        Ok(true)
    }

    pub fn delete(&self, name: &str) -> Result<Option<E>> {
        let mut entries = self.entries.lock();

        let durable = match entries.by_name.get(name) {
            Some(entity) => entity.is_durable(),
            None => return Ok(None),
        };

        if durable {
            self.store.remove(name)?;
        }

        entries
            .order
            .retain(|existing| Borrow::<str>::borrow(existing) != name);
        let removed = entries.by_name.remove(name);

        info!(kind = E::KIND, %name, "Deleted");
        Ok(removed)
    }

    pub fn select(&self, name: &str) -> Option<E> {
        self.entries.lock().by_name.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.lock().by_name.contains_key(name)
    }

    /// A snapshot of all entities in declaration order.
    pub fn all(&self) -> Vec<E> {
        let entries = self.entries.lock();
        entries
            .order
            .iter()
            .filter_map(|name| entries.by_name.get::<E::Name>(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Entity> Debug for Registry<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &E::KIND)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use hare_storage::{MemoryStore, MetaStore, StorageError};

    use super::Registry;
    use crate::{
        error::BrokerError,
        exchange::{Exchange, ExchangeType},
        queue::Queue,
    };

    struct FailingStore;

    impl<T: hare_storage::Record> MetaStore<T> for FailingStore {
        fn insert(&self, _: &T) -> hare_storage::Result<()> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn remove(&self, _: &str) -> hare_storage::Result<()> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn all(&self) -> hare_storage::Result<Vec<T>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn declare_is_idempotent() {
        let registry = Registry::open(Box::new(MemoryStore::new())).unwrap();

        assert!(registry
            .declare(Exchange::new("logs", ExchangeType::Fanout))
            .unwrap());
        assert!(!registry
            .declare(Exchange::new("logs", ExchangeType::Topic).durable(true))
            .unwrap());

        assert_eq!(registry.len(), 1);
        let logs = registry.select("logs").unwrap();
        assert_eq!(logs.kind, ExchangeType::Fanout);
        assert!(!logs.durable);
    }

    #[test]
    fn durable_declare_failure_leaves_no_state() {
        let registry = Registry::<Queue>::open(Box::new(FailingStore)).unwrap();

        let result = registry.declare(Queue::new("orders").durable(true));
        assert!(matches!(result, Err(BrokerError::Persistence(_))));
        assert!(!registry.exists("orders"));

        // transient queues never touch the store
        assert!(registry.declare(Queue::new("scratch")).unwrap());
        assert!(registry.exists("scratch"));
    }

    #[test]
    fn durable_entities_are_recovered() {
        let store = Arc::new(MemoryStore::<Queue>::new());

        {
            let registry = Registry::open(Box::new(store.clone())).unwrap();
            registry.declare(Queue::new("b").durable(true)).unwrap();
            registry.declare(Queue::new("tmp")).unwrap();
            registry.declare(Queue::new("a").durable(true)).unwrap();
        }

        let registry = Registry::<Queue>::open(Box::new(store)).unwrap();
        let names = registry
            .all()
            .into_iter()
            .map(|queue| queue.name.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn delete_missing_is_noop() {
        let registry = Registry::<Queue>::open(Box::new(MemoryStore::new())).unwrap();
        assert!(registry.delete("nope").unwrap().is_none());
    }
}
