//!
//! The per-class variable schema.
//!
//! Every real class owns one schema, mapping variable names (and the reserved
//! object id key) to slot indices. Indices are append-only: once published, a name
//! keeps its index forever and no index is ever handed out twice. This makes any
//! object's slot array, however short, a valid prefix of the current schema.
//!
//! Readers never lock. Writers serialize on the schema's own lock and publish a
//! fresh copy of the name table.
//!

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use rom_core::Interned;

/// What a schema slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotName {
    /// A named variable (instance variable, class variable or internal field).
    Variable(Interned),
    /// The lazily assigned object id.
    ObjectId,
}

/// A class-wide, append-only mapping from variable names to slot indices.
pub struct VariableSchema {
    accessors: ArcSwap<HashMap<Interned, usize>>,
    names: ArcSwap<Vec<SlotName>>,
    object_id: OnceLock<usize>,
    lock: Mutex<()>,
}

impl Default for VariableSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self {
            accessors: ArcSwap::from_pointee(HashMap::new()),
            names: ArcSwap::from_pointee(Vec::new()),
            object_id: OnceLock::new(),
            lock: Mutex::new(()),
        }
    }

    /// Get the slot index of a variable, if one was ever assigned.
    #[inline]
    pub fn index_for_read(&self, name: Interned) -> Option<usize> {
        self.accessors.load().get(&name).copied()
    }

    /// Get the slot index of a variable, assigning the next free one on first use.
    pub fn index_for_write(&self, name: Interned) -> usize {
        if let Some(index) = self.index_for_read(name) {
            return index;
        }

        let _guard = self.lock.lock();
        if let Some(index) = self.index_for_read(name) {
            return index;
        }

        let index = self.allocate(SlotName::Variable(name));
        let mut accessors = HashMap::clone(&self.accessors.load_full());
        accessors.insert(name, index);
        self.accessors.store(Arc::new(accessors));

        log::debug!("allocated variable slot {} for {:?}", index, name);
        index
    }

    /// Get the reserved object id slot, assigning it on first use.
    pub fn object_id_index(&self) -> usize {
        *self.object_id.get_or_init(|| {
            let _guard = self.lock.lock();
            let index = self.allocate(SlotName::ObjectId);
            log::debug!("allocated object id slot {}", index);
            index
        })
    }

    /// Get the reserved object id slot, if it was assigned already.
    #[inline]
    pub fn object_id_index_for_read(&self) -> Option<usize> {
        self.object_id.get().copied()
    }

    /// The number of slots an object needs to hold every known variable.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get every slot in index order.
    pub fn names(&self) -> Arc<Vec<SlotName>> {
        self.names.load_full()
    }

    /// Get every named variable slot, in index order.
    pub fn variables(&self) -> Vec<(usize, Interned)> {
        self.names
            .load()
            .iter()
            .enumerate()
            .filter_map(|(index, name)| match name {
                SlotName::Variable(name) => Some((index, *name)),
                SlotName::ObjectId => None,
            })
            .collect()
    }

    // The caller must hold `self.lock`.
    fn allocate(&self, name: SlotName) -> usize {
        let mut names = Vec::clone(&self.names.load_full());
        let index = names.len();
        names.push(name);
        self.names.store(Arc::new(names));
        index
    }
}

impl fmt::Debug for VariableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableSchema")
            .field("names", &self.names.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_append_only() {
        let schema = VariableSchema::new();
        let a = schema.index_for_write(Interned(1));
        let b = schema.index_for_write(Interned(2));
        let id = schema.object_id_index();
        let c = schema.index_for_write(Interned(3));

        assert_eq!((a, b, id, c), (0, 1, 2, 3));
        assert_eq!(schema.index_for_write(Interned(1)), 0);
        assert_eq!(schema.object_id_index(), 2);
        assert_eq!(schema.len(), 4);
        assert_eq!(
            schema.variables(),
            vec![(0, Interned(1)), (1, Interned(2)), (3, Interned(3))]
        );
    }

    #[test]
    fn unknown_names_have_no_index() {
        let schema = VariableSchema::new();
        assert_eq!(schema.index_for_read(Interned(7)), None);
        assert_eq!(schema.object_id_index_for_read(), None);
        assert!(schema.is_empty());
    }

    #[test]
    fn concurrent_allocation_hands_out_distinct_indices() {
        let schema = VariableSchema::new();
        let indices: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8u32)
                .map(|it| {
                    let schema = &schema;
                    scope.spawn(move || schema.index_for_write(Interned(it)))
                })
                .collect();
            handles.into_iter().map(|it| it.join().unwrap()).collect()
        });

        let mut sorted = indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
        for (name, index) in indices.iter().enumerate() {
            assert_eq!(schema.index_for_read(Interned(name as u32)), Some(*index));
        }
    }
}
