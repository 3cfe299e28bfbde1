//!
//! This is an implementation of a string interner.
//!
//! Method names, variable names and constant names are all interned, so that the
//! hot paths (method tables, dispatch cache keys, variable schemas) only ever
//! compare and hash small integers.
//!

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// An interned string.
///
/// This is fast to move, clone and compare.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Interned(pub u32);

/// A string interner.
#[derive(Debug, Default)]
pub struct Interner {
    map: HashMap<Arc<str>, u32>,
    vec: Vec<Arc<str>>,
}

impl Interner {
    /// Initialize the interner with an initial capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            map: HashMap::with_capacity(cap),
            vec: Vec::with_capacity(cap),
        }
    }

    /// Intern a given string.
    pub fn intern(&mut self, name: &str) -> Interned {
        if let Some(&id) = self.map.get(name) {
            return Interned(id);
        }
        let name: Arc<str> = Arc::from(name);
        let id = self.vec.len() as u32;
        self.map.insert(name.clone(), id);
        self.vec.push(name);

        Interned(id)
    }

    /// Get the interning ID of a string, if it was interned before.
    pub fn get(&self, name: &str) -> Option<Interned> {
        self.map.get(name).copied().map(Interned)
    }

    /// Get the string associated to a given interning ID.
    pub fn lookup(&self, id: Interned) -> &Arc<str> {
        &self.vec[id.0 as usize]
    }

    /// The number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

/// A thread-safe interner, shared by every thread of one runtime.
///
/// Lookups of already-interned names only take the read lock.
#[derive(Debug, Default)]
pub struct SymbolTable {
    inner: RwLock<Interner>,
}

impl SymbolTable {
    /// Initialize the table with an initial capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: RwLock::new(Interner::with_capacity(cap)),
        }
    }

    /// Intern a given string.
    pub fn intern(&self, name: &str) -> Interned {
        if let Some(id) = self.inner.read().get(name) {
            return id;
        }
        self.inner.write().intern(name)
    }

    /// Get the interning ID of a string without interning it.
    pub fn get(&self, name: &str) -> Option<Interned> {
        self.inner.read().get(name)
    }

    /// Get the string associated to a given interning ID.
    pub fn lookup(&self, id: Interned) -> Arc<str> {
        self.inner.read().lookup(id).clone()
    }
}
