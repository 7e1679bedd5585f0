//! LRU (Least Recently Used) store bounded by total bytes
//!
//! Entries live in an arena of slots addressed by handles. The recency chain
//! is a doubly linked list of handles (head = most recently used) and the
//! index maps each key to its handle, so a lookup can never reach a freed
//! entry: slots are only recycled after both views have dropped them.

use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;

use crate::budget::SizeBudget;
use crate::error::{Error, Result};
use crate::storage::Storage;

/// Size budget used by [`LruStore::default`], in bytes
pub const DEFAULT_MAX_SIZE: usize = 1024;

/// Stable reference to an arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handle(usize);

/// Node in the recency chain
struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    prev: Option<Handle>,
    next: Option<Handle>,
}

impl Node {
    fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Key-value store evicting least recently used entries to stay within
/// `max_size` bytes of keys plus values
pub struct LruStore {
    map: HashMap<Vec<u8>, Handle, RandomState>,
    nodes: Vec<Option<Node>>,
    free_list: Vec<usize>,
    head: Option<Handle>,
    tail: Option<Handle>,
    budget: SizeBudget,
}

impl LruStore {
    /// Create an empty store holding at most `max_size` bytes
    pub fn new(max_size: usize) -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
            budget: SizeBudget::new(max_size),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes currently used by keys and values
    pub fn current_size(&self) -> usize {
        self.budget.current()
    }

    /// Configured byte limit
    pub fn max_size(&self) -> usize {
        self.budget.max()
    }

    /// Check for `key` without touching its recency
    pub fn contains(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            store: self,
            cursor: self.head,
        }
    }

    /// Walk the chain and verify it agrees with the index and the budget
    pub fn check_invariants(&self) -> Result<()> {
        let mut chained = 0;
        let mut actual = 0;
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(handle) = cursor {
            let node = self
                .nodes
                .get(handle.0)
                .and_then(|slot| slot.as_ref())
                .ok_or_else(|| Error::BrokenChain(format!("slot {} is vacant", handle.0)))?;

            if node.prev != prev {
                return Err(Error::BrokenChain(format!(
                    "slot {} has a wrong predecessor",
                    handle.0
                )));
            }
            if self.map.get(node.key.as_slice()) != Some(&handle) {
                return Err(Error::BrokenChain(format!(
                    "slot {} is not indexed under its key",
                    handle.0
                )));
            }

            chained += 1;
            actual += node.size();
            // A cycle would never terminate otherwise
            if chained > self.map.len() {
                return Err(Error::IndexMismatch {
                    indexed: self.map.len(),
                    chained,
                });
            }

            prev = Some(handle);
            cursor = node.next;
        }

        if self.tail != prev {
            return Err(Error::BrokenChain("tail does not end the chain".to_string()));
        }
        if chained != self.map.len() {
            return Err(Error::IndexMismatch {
                indexed: self.map.len(),
                chained,
            });
        }
        if self.nodes.len() - self.free_list.len() != chained {
            return Err(Error::BrokenChain(format!(
                "{} occupied slots for {} entries",
                self.nodes.len() - self.free_list.len(),
                chained
            )));
        }
        if actual != self.budget.current() {
            return Err(Error::SizeMismatch {
                tracked: self.budget.current(),
                actual,
            });
        }
        if self.budget.current() > self.budget.max() {
            return Err(Error::OverBudget {
                current: self.budget.current(),
                max: self.budget.max(),
            });
        }

        Ok(())
    }

    fn insert_new(&mut self, key: &[u8], value: &[u8]) -> bool {
        let size = key.len() + value.len();
        if !self.budget.fits(size) {
            return false;
        }

        self.make_room(size, None);

        let handle = self.alloc_node(Node {
            key: key.to_vec(),
            value: value.to_vec(),
            prev: None,
            next: None,
        });
        self.push_front(handle);
        self.map.insert(key.to_vec(), handle);
        self.budget.charge(size);

        true
    }

    fn replace(&mut self, handle: Handle, key_len: usize, value: &[u8]) -> bool {
        if !self.budget.fits(key_len + value.len()) {
            return false;
        }

        self.move_to_front(handle);

        let old_len = match &self.nodes[handle.0] {
            Some(node) => node.value.len(),
            None => return false,
        };
        self.budget.release(old_len);

        // The entry being written sits at the head and is never evicted here
        self.make_room(value.len(), Some(handle));

        if let Some(node) = &mut self.nodes[handle.0] {
            node.value = value.to_vec();
        }
        self.budget.charge(value.len());

        true
    }

    /// Evict from the tail until `incoming` bytes fit, stopping at `keep`
    fn make_room(&mut self, incoming: usize, keep: Option<Handle>) {
        while !self.budget.has_room(incoming) {
            let tail = match self.tail {
                Some(tail) if Some(tail) != keep => tail,
                _ => break,
            };
            match self.detach(tail) {
                Some(node) => {
                    self.map.remove(node.key.as_slice());
                }
                None => break,
            }
        }
    }

    /// Unlink a node, free its slot and give its bytes back to the budget
    fn detach(&mut self, handle: Handle) -> Option<Node> {
        self.unlink(handle);
        let node = self.nodes[handle.0].take()?;
        self.free_list.push(handle.0);
        self.budget.release(node.size());
        Some(node)
    }

    fn move_to_front(&mut self, handle: Handle) {
        if self.head == Some(handle) {
            return; // Already at front
        }

        self.unlink(handle);
        self.push_front(handle);
    }

    fn push_front(&mut self, handle: Handle) {
        let old_head = self.head;

        if let Some(node) = &mut self.nodes[handle.0] {
            node.prev = None;
            node.next = old_head;
        }

        match old_head {
            Some(head) => self.link_prev(head, Some(handle)),
            None => self.tail = Some(handle),
        }

        self.head = Some(handle);
    }

    fn unlink(&mut self, handle: Handle) {
        let (prev, next) = match &self.nodes[handle.0] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev) => self.link_next(prev, next),
            None => self.head = next,
        }

        match next {
            Some(next) => self.link_prev(next, prev),
            None => self.tail = prev,
        }

        if let Some(node) = &mut self.nodes[handle.0] {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_prev(&mut self, handle: Handle, prev: Option<Handle>) {
        if let Some(node) = &mut self.nodes[handle.0] {
            node.prev = prev;
        }
    }

    fn link_next(&mut self, handle: Handle, next: Option<Handle>) {
        if let Some(node) = &mut self.nodes[handle.0] {
            node.next = next;
        }
    }

    fn alloc_node(&mut self, node: Node) -> Handle {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = Some(node);
            Handle(idx)
        } else {
            self.nodes.push(Some(node));
            Handle(self.nodes.len() - 1)
        }
    }
}

impl Storage for LruStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.map.get(key).copied() {
            Some(handle) => self.replace(handle, key.len(), value),
            None => self.insert_new(key, value),
        }
    }

    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.map.contains_key(key) {
            return false;
        }
        self.insert_new(key, value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self.map.get(key).copied() {
            Some(handle) => self.replace(handle, key.len(), value),
            None => false,
        }
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        match self.map.remove(key) {
            Some(handle) => self.detach(handle).is_some(),
            None => false,
        }
    }

    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let handle = self.map.get(key).copied()?;
        self.move_to_front(handle);
        self.nodes[handle.0].as_ref().map(|node| node.value.clone())
    }
}

impl Default for LruStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl fmt::Debug for LruStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruStore")
            .field("len", &self.len())
            .field("current_size", &self.current_size())
            .field("max_size", &self.max_size())
            .finish()
    }
}

/// Iterator over keys in recency order, created by [`LruStore::keys`]
pub struct Keys<'a> {
    store: &'a LruStore,
    cursor: Option<Handle>,
}

impl<'a> Iterator for Keys<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let store = self.store;
        let handle = self.cursor?;
        let node = store.nodes[handle.0].as_ref()?;
        self.cursor = node.next;
        Some(node.key.as_slice())
    }
}
