//! Reference-counted schema cache shared by all partition workers
//!
//! One [`parking_lot::RwLock`] guards both the definition map and the
//! refcount map, so the two can never disagree about which ids are present.
//! Lookups take the shared lock and run in parallel; registration and
//! release take the exclusive lock. Registration is rare compared to
//! lookups (once per schema id per process, give or take a race), which is
//! what makes a single writer lock acceptable.
//!
//! # Example
//!
//! ```rust
//! use avroma::{SchemaCache, SchemaDefinition, SchemaId};
//!
//! let cache = SchemaCache::new();
//! let id = SchemaId::new(1);
//!
//! cache.add(id, SchemaDefinition::from(r#""string""#));
//! assert!(cache.get(id).is_some());
//!
//! cache.del(id);
//! assert!(cache.get(id).is_none());
//! ```

use crate::types::{SchemaDefinition, SchemaId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Default)]
struct Entries {
    definitions: HashMap<SchemaId, SchemaDefinition>,
    refcounts: HashMap<SchemaId, u32>,
}

/// Concurrency-safe map from schema id to schema definition with per-entry
/// reference counting
#[derive(Debug, Default)]
pub struct SchemaCache {
    inner: RwLock<Entries>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached definition
    pub fn get(&self, id: SchemaId) -> Option<SchemaDefinition> {
        self.inner.read().definitions.get(&id).cloned()
    }

    /// Store `definition` under `id` and take one reference on the entry.
    ///
    /// An existing definition is replaced, not merged; the refcount keeps
    /// counting from its current value.
    pub fn add(&self, id: SchemaId, definition: SchemaDefinition) {
        let mut entries = self.inner.write();
        entries.definitions.insert(id, definition);
        let count = entries.refcounts.entry(id).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Release one reference. The entry is removed once no references remain.
    /// Releasing an absent id does nothing.
    pub fn del(&self, id: SchemaId) {
        let mut entries = self.inner.write();
        let Some(count) = entries.refcounts.get_mut(&id) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count < 1 {
            entries.refcounts.remove(&id);
            entries.definitions.remove(&id);
        }
    }

    /// Remove the entry regardless of how many references it holds
    pub fn kill(&self, id: SchemaId) {
        let mut entries = self.inner.write();
        entries.definitions.remove(&id);
        entries.refcounts.remove(&id);
    }

    /// Current reference count, 0 when absent
    pub fn refcount(&self, id: SchemaId) -> u32 {
        self.inner.read().refcounts.get(&id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: SchemaId) -> bool {
        self.inner.read().definitions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().definitions.is_empty()
    }

    /// Diagnostic snapshot of both maps, keys in ascending order:
    /// `ValueMap: map[1:<schema> 2:<schema>] | CountMap: map[1:3 2:1]`
    pub fn dump(&self) -> String {
        let entries = self.inner.read();

        let mut ids: Vec<SchemaId> = entries.definitions.keys().copied().collect();
        ids.sort_unstable();
        let mut counted: Vec<SchemaId> = entries.refcounts.keys().copied().collect();
        counted.sort_unstable();

        let mut out = String::from("ValueMap: map[");
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}:{}", id, entries.definitions[id]);
        }
        out.push_str("] | CountMap: map[");
        for (i, id) in counted.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{}:{}", id, entries.refcounts[id]);
        }
        out.push(']');
        out
    }

    /// Both key sets agree. Holds after every public operation.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let entries = self.inner.read();
        entries.definitions.len() == entries.refcounts.len()
            && entries
                .definitions
                .keys()
                .all(|id| entries.refcounts.contains_key(id))
    }
}
