// Registry - Insertion-ordered record store backing both queue stages

use std::collections::HashMap;
use std::hash::Hash;

use crate::domain::model::{Job, JobId, SelectionId, SelectionRecord};

/// Records stored in a registry expose a stable key
pub trait Keyed {
    type Key: Copy + Eq + Hash;

    fn key(&self) -> Self::Key;
}

impl Keyed for SelectionRecord {
    type Key = SelectionId;

    fn key(&self) -> SelectionId {
        self.id()
    }
}

impl Keyed for Job {
    type Key = JobId;

    fn key(&self) -> JobId {
        self.id()
    }
}

/// Explicit insertion order plus a lookup table; iteration is always oldest first
#[derive(Debug, Clone)]
pub struct Registry<T: Keyed> {
    order: Vec<T::Key>,
    entries: HashMap<T::Key, T>,
}

pub type SelectionRegistry = Registry<SelectionRecord>;
pub type JobRegistry = Registry<Job>;

impl<T: Keyed> Default for Registry<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<T: Keyed> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &T::Key) -> Option<&mut T> {
        self.entries.get_mut(key)
    }

    /// Append a record; a record with an existing key is replaced in place
    pub(crate) fn insert(&mut self, record: T) {
        let key = record.key();
        if self.entries.insert(key, record).is_none() {
            self.order.push(key);
        }
    }

    pub(crate) fn remove(&mut self, key: &T::Key) -> Option<T> {
        let record = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(record)
    }

    /// Remove every record, oldest first
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .collect()
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order.iter().filter_map(move |key| self.entries.get(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &T::Key> + '_ {
        self.order.iter()
    }
}

impl<T: Keyed + Clone> Registry<T> {
    /// Ordered copies of every record
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
