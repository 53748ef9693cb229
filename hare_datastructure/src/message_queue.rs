use std::{
    collections::VecDeque,
    fmt::{Debug, Formatter},
    sync::Arc,
};

/// Something that can be looked up in a [`MessageQueue`] by its id.
pub trait Identified {
    type Id: PartialEq + Copy;

    fn id(&self) -> Self::Id;
}

impl<T: Identified> Identified for Arc<T> {
    type Id = T::Id;

    fn id(&self) -> Self::Id {
        (**self).id()
    }
}

/// The data structure behind a queue's pending messages.
///
/// Keeps insertion order and supports removing arbitrary entries by id. Messages are usually
/// acknowledged close to the front, so removal searches from there.
///
/// Not synchronized, the owner is expected to put it behind a lock.
pub struct MessageQueue<T> {
    deque: VecDeque<T>,
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            deque: VecDeque::new(),
        }
    }

    pub fn append(&mut self, message: T) {
        self.deque.push_back(message);
    }

    pub fn front(&self) -> Option<&T> {
        self.deque.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.deque.iter()
    }

    pub fn len(&self) -> usize {
        self.deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    pub fn clear(&mut self) {
        self.deque.clear();
    }
}

impl<T: Identified> MessageQueue<T> {
    /// Removes the entry with the given id. Removing an id that isn't present does nothing.
    pub fn remove(&mut self, id: T::Id) -> Option<T> {
        let position = self.deque.iter().position(|message| message.id() == id)?;
        self.deque.remove(position)
    }

    pub fn contains(&self, id: T::Id) -> bool {
        self.deque.iter().any(|message| message.id() == id)
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for MessageQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            deque: iter.into_iter().collect(),
        }
    }
}

impl<T: Debug> Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.deque.len())
            .finish_non_exhaustive()
    }
}
