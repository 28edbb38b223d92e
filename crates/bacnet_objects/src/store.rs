//! Instance Store
//!
//! Owns the records of one object type, keyed by instance number.
//!
//! Enumeration order is ascending by instance number. Index-based protocol
//! services (object-list reads, event information, alarm summary) rely on
//! that order being the same between calls.

use std::collections::BTreeMap;

use crate::error::{ObjectError, ObjectResult};

/// Ordered arena of object records
#[derive(Debug, Clone)]
pub struct InstanceStore<T> {
    records: BTreeMap<u32, T>,
    capacity: usize,
}

impl<T> InstanceStore<T> {
    /// Create an empty store holding at most `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            capacity,
        }
    }

    /// Insert a new record under `instance`
    ///
    /// An existing record under the same instance is left untouched.
    pub fn insert(&mut self, instance: u32, record: T) -> ObjectResult<&mut T> {
        if self.records.contains_key(&instance) {
            return Err(ObjectError::DuplicateInstance(instance));
        }
        if self.records.len() >= self.capacity {
            return Err(ObjectError::CapacityExceeded(self.capacity));
        }
        Ok(self.records.entry(instance).or_insert(record))
    }

    /// Remove and return the record under `instance`
    pub fn remove(&mut self, instance: u32) -> ObjectResult<T> {
        self.records
            .remove(&instance)
            .ok_or(ObjectError::InvalidInstance(instance))
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, instance: u32) -> ObjectResult<&T> {
        self.records
            .get(&instance)
            .ok_or(ObjectError::InvalidInstance(instance))
    }

    pub fn get_mut(&mut self, instance: u32) -> ObjectResult<&mut T> {
        self.records
            .get_mut(&instance)
            .ok_or(ObjectError::InvalidInstance(instance))
    }

    pub fn is_valid(&self, instance: u32) -> bool {
        self.records.contains_key(&instance)
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Position of `instance` in ascending order
    pub fn index_of(&self, instance: u32) -> Option<usize> {
        if !self.records.contains_key(&instance) {
            return None;
        }
        Some(self.records.range(..instance).count())
    }

    /// Instance at position `index` in ascending order
    pub fn instance_of(&self, index: usize) -> Option<u32> {
        self.records.keys().nth(index).copied()
    }

    /// Instance numbers in ascending order
    pub fn instances(&self) -> Vec<u32> {
        self.records.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.records.iter().map(|(instance, record)| (*instance, record))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.records
            .iter_mut()
            .map(|(instance, record)| (*instance, record))
    }
}
