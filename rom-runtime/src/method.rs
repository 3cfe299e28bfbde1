use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use rom_core::{Interned, MethodSerial, ModuleId, RuntimeResult, Visibility};

use crate::runtime::Runtime;
use crate::value::Value;

/// A native method body. The receiver is passed as the first argument.
pub type NativeFn = Arc<dyn Fn(&Runtime, Vec<Value>) -> RuntimeResult<Value> + Send + Sync>;

/// The behaviour behind a method entry.
#[derive(Clone)]
pub enum Callable {
    /// A native function.
    Native(NativeFn),
    /// Reads the given instance variable.
    AttrReader(Interned),
    /// Writes the given instance variable.
    AttrWriter(Interned),
    /// Always returns the given value.
    Constant(Value),
    /// Calls the same method further up the ancestor chain.
    ZSuper,
    /// Marks the name as undefined, hiding every ancestor's definition.
    Undefined,
}

impl Callable {
    /// Wrap a closure as a native callable.
    pub fn native<F>(func: F) -> Self
    where
        F: Fn(&Runtime, Vec<Value>) -> RuntimeResult<Value> + Send + Sync + 'static,
    {
        Self::Native(Arc::new(func))
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(func) => f.debug_tuple("Native").field(&Arc::as_ptr(func)).finish(),
            Self::AttrReader(name) => f.debug_tuple("AttrReader").field(name).finish(),
            Self::AttrWriter(name) => f.debug_tuple("AttrWriter").field(name).finish(),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::ZSuper => f.write_str("ZSuper"),
            Self::Undefined => f.write_str("Undefined"),
        }
    }
}

/// A method, as stored in a method table.
///
/// Method records are immutable: redefinition, aliasing and visibility changes all
/// install a fresh record with a fresh serial. The serial is what the dispatch cache
/// uses to find every resolution of a record once it gets replaced.
pub struct DynamicMethod {
    serial: MethodSerial,
    name: Interned,
    original_name: Interned,
    visibility: Visibility,
    owner: ModuleId,
    callable: Callable,
}

impl DynamicMethod {
    pub(crate) fn new(
        serial: MethodSerial,
        name: Interned,
        visibility: Visibility,
        owner: ModuleId,
        callable: Callable,
    ) -> Self {
        Self {
            serial,
            name,
            original_name: name,
            visibility,
            owner,
            callable,
        }
    }

    /// The same behaviour under another name, owned by `owner`.
    pub(crate) fn aliased(&self, serial: MethodSerial, name: Interned, owner: ModuleId) -> Self {
        Self {
            serial,
            name,
            original_name: self.original_name,
            visibility: self.visibility,
            owner,
            callable: self.callable.clone(),
        }
    }

    /// The same behaviour with another visibility.
    pub(crate) fn with_visibility(&self, serial: MethodSerial, visibility: Visibility) -> Self {
        Self {
            serial,
            name: self.name,
            original_name: self.original_name,
            visibility,
            owner: self.owner,
            callable: self.callable.clone(),
        }
    }

    /// The same behaviour, owned by another module (used when copying tables).
    pub(crate) fn rehomed(&self, serial: MethodSerial, owner: ModuleId) -> Self {
        Self {
            serial,
            name: self.name,
            original_name: self.original_name,
            visibility: self.visibility,
            owner,
            callable: self.callable.clone(),
        }
    }

    #[inline]
    pub fn serial(&self) -> MethodSerial {
        self.serial
    }

    #[inline]
    pub fn name(&self) -> Interned {
        self.name
    }

    /// The name this behaviour was first defined under.
    #[inline]
    pub fn original_name(&self) -> Interned {
        self.original_name
    }

    #[inline]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The module whose table holds this record.
    #[inline]
    pub fn owner(&self) -> ModuleId {
        self.owner
    }

    #[inline]
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.callable.is_undefined()
    }
}

impl fmt::Debug for DynamicMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMethod")
            .field("serial", &self.serial)
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("owner", &self.owner)
            .field("callable", &self.callable)
            .finish()
    }
}

/// The methods of one module, in definition order.
///
/// Every reader and writer goes through the same lock.
#[derive(Default)]
pub struct MethodTable {
    methods: Mutex<IndexMap<Interned, Arc<DynamicMethod>>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: Interned) -> Option<Arc<DynamicMethod>> {
        self.methods.lock().get(&name).cloned()
    }

    pub fn contains(&self, name: Interned) -> bool {
        self.methods.lock().contains_key(&name)
    }

    /// Install a method, returning the one it replaces.
    pub(crate) fn insert(&self, method: Arc<DynamicMethod>) -> Option<Arc<DynamicMethod>> {
        self.methods.lock().insert(method.name(), method)
    }

    pub(crate) fn remove(&self, name: Interned) -> Option<Arc<DynamicMethod>> {
        self.methods.lock().shift_remove(&name)
    }

    /// A point-in-time copy of every entry.
    pub fn entries(&self) -> Vec<Arc<DynamicMethod>> {
        self.methods.lock().values().cloned().collect()
    }

    pub fn names(&self) -> Vec<Interned> {
        self.methods.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.methods.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.lock().is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.methods.lock().keys()).finish()
    }
}
