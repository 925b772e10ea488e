//! Per-service property tree.
//!
//! The tree keeps every declared property in declaration order together with
//! its type and current value. Writes that change a value mark the path dirty
//! until the registration layer publishes it.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::property::PropertyDefinition;
use crate::value::{BusValue, ValueType};

#[derive(Debug, Clone)]
struct Entry {
    path: String,
    value_type: ValueType,
    value: BusValue,
    dirty: bool,
}

/// Ordered mapping from property path to typed value.
#[derive(Debug, Clone, Default)]
pub struct PropertyTree {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl PropertyTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree holding the initial values of a schema.
    pub fn from_schema(schema: &[PropertyDefinition]) -> Result<Self> {
        let mut tree = Self::new();
        for def in schema {
            tree.declare(&def.path, def.value_type, def.initial.clone())?;
        }
        Ok(tree)
    }

    /// Declare a new property.
    pub fn declare(&mut self, path: &str, value_type: ValueType, initial: BusValue) -> Result<()> {
        if self.index.contains_key(path) {
            return Err(Error::DuplicatePath(path.to_string()));
        }
        if initial.value_type() != value_type {
            return Err(Error::TypeMismatch {
                path: path.to_string(),
                expected: value_type,
                actual: initial.value_type(),
            });
        }

        self.index.insert(path.to_string(), self.entries.len());
        self.entries.push(Entry {
            path: path.to_string(),
            value_type,
            value: initial,
            dirty: false,
        });
        Ok(())
    }

    fn entry(&self, path: &str) -> Result<&Entry> {
        self.index
            .get(path)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| Error::UnknownPath(path.to_string()))
    }

    fn entry_mut(&mut self, path: &str) -> Result<&mut Entry> {
        match self.index.get(path) {
            Some(&i) => Ok(&mut self.entries[i]),
            None => Err(Error::UnknownPath(path.to_string())),
        }
    }

    /// Current value at a path.
    pub fn get(&self, path: &str) -> Result<&BusValue> {
        self.entry(path).map(|e| &e.value)
    }

    /// Declared type of a path.
    pub fn value_type(&self, path: &str) -> Result<ValueType> {
        self.entry(path).map(|e| e.value_type)
    }

    /// Write a value.
    ///
    /// Returns whether the stored value changed. Unchanged writes succeed but
    /// leave the dirty flag alone. A failed write never mutates the tree.
    pub fn set(&mut self, path: &str, value: BusValue) -> Result<bool> {
        let entry = self.entry_mut(path)?;
        if value.value_type() != entry.value_type {
            return Err(Error::TypeMismatch {
                path: path.to_string(),
                expected: entry.value_type,
                actual: value.value_type(),
            });
        }
        if entry.value == value {
            return Ok(false);
        }
        entry.value = value;
        entry.dirty = true;
        Ok(true)
    }

    /// Whether a path has an unpublished change.
    pub fn is_dirty(&self, path: &str) -> Result<bool> {
        self.entry(path).map(|e| e.dirty)
    }

    /// Clear the dirty flag of a path, returning its previous state.
    pub fn take_dirty(&mut self, path: &str) -> Result<bool> {
        let entry = self.entry_mut(path)?;
        Ok(std::mem::replace(&mut entry.dirty, false))
    }

    /// Paths with unpublished changes, in declaration order.
    pub fn dirty_paths(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.dirty)
            .map(|e| e.path.clone())
            .collect()
    }

    /// Declared paths in declaration order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable copy of every path and value.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            values: self
                .entries
                .iter()
                .map(|e| (e.path.clone(), e.value.clone()))
                .collect(),
        }
    }
}

/// Point-in-time copy of a property tree, handed to transports for publication.
///
/// Serializes as a JSON object keyed by path, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    values: Vec<(String, BusValue)>,
}

impl Snapshot {
    pub fn get(&self, path: &str) -> Option<&BusValue> {
        self.values
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BusValue)> {
        self.values.iter().map(|(p, v)| (p.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (path, value) in &self.values {
            map.serialize_entry(path, value)?;
        }
        map.end()
    }
}
