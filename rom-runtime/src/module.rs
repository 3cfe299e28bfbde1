use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use rom_core::{Interned, ModuleId};

use crate::method::MethodTable;
use crate::object::RObject;
use crate::runtime::Runtime;
use crate::schema::VariableSchema;
use crate::value::Value;
use crate::ObjRef;

/// Builds a fresh instance of the given class.
pub type Allocator = fn(runtime: &Runtime, class: ModuleId) -> ObjRef;

/// What kind of node a module record is.
#[derive(Debug, Clone)]
pub enum ModuleKind {
    /// A plain module, usable as a mixin.
    Module,
    /// A class that can be instantiated.
    Class {
        /// How instances get built, if they can be built at all.
        allocator: Option<Allocator>,
    },
    /// A per-object private subclass.
    Singleton {
        /// The object this class belongs to.
        attached: Weak<RObject>,
        /// The module this class belongs to, if it is a module's singleton class.
        module: Option<ModuleId>,
    },
    /// A synthetic node standing for one mixed-in module at one chain position.
    Included {
        /// The module whose method table and constants this node forwards to.
        module: ModuleId,
    },
}

/// Represents a module, class, singleton class or included-module wrapper.
///
/// Records live in the runtime's [`ModuleArena`] and refer to each other by id.
pub struct ModuleRecord {
    id: ModuleId,
    kind: ModuleKind,
    name: RwLock<Option<String>>,
    superclass: RwLock<Option<ModuleId>>,
    lexical_parent: RwLock<Option<ModuleId>>,
    methods: MethodTable,
    constants: RwLock<IndexMap<Interned, Value>>,
    subclasses: Mutex<Vec<ModuleId>>,
    schema: VariableSchema,
    object: ObjRef,
}

impl ModuleRecord {
    pub(crate) fn new(
        id: ModuleId,
        kind: ModuleKind,
        superclass: Option<ModuleId>,
        object: ObjRef,
    ) -> Self {
        Self {
            id,
            kind,
            name: RwLock::new(None),
            superclass: RwLock::new(superclass),
            lexical_parent: RwLock::new(None),
            methods: MethodTable::new(),
            constants: RwLock::new(IndexMap::new()),
            subclasses: Mutex::new(Vec::new()),
            schema: VariableSchema::new(),
            object,
        }
    }

    #[inline]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    pub fn is_module(&self) -> bool {
        matches!(self.kind, ModuleKind::Module)
    }

    /// Classes and singleton classes.
    pub fn is_class(&self) -> bool {
        matches!(
            self.kind,
            ModuleKind::Class { .. } | ModuleKind::Singleton { .. }
        )
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self.kind, ModuleKind::Singleton { .. })
    }

    pub fn is_included(&self) -> bool {
        matches!(self.kind, ModuleKind::Included { .. })
    }

    /// The module a wrapper forwards to.
    pub fn included_module(&self) -> Option<ModuleId> {
        match self.kind {
            ModuleKind::Included { module } => Some(module),
            _ => None,
        }
    }

    /// The identity this node stands for: the wrapped module for wrappers, itself otherwise.
    pub fn non_included(&self) -> ModuleId {
        self.included_module().unwrap_or(self.id)
    }

    pub fn allocator(&self) -> Option<Allocator> {
        match self.kind {
            ModuleKind::Class { allocator } => allocator,
            _ => None,
        }
    }

    /// The object a singleton class is attached to, if it is still alive.
    pub fn attached(&self) -> Option<ObjRef> {
        match &self.kind {
            ModuleKind::Singleton { attached, .. } => attached.upgrade(),
            _ => None,
        }
    }

    /// The module a module's singleton class is attached to.
    pub fn attached_module(&self) -> Option<ModuleId> {
        match &self.kind {
            ModuleKind::Singleton { module, .. } => *module,
            _ => None,
        }
    }

    /// Whether this is the singleton class of exactly this object.
    pub fn is_attached_to(&self, obj: &RObject) -> bool {
        match &self.kind {
            ModuleKind::Singleton { attached, .. } => std::ptr::eq(attached.as_ptr(), obj),
            _ => false,
        }
    }

    #[inline]
    pub fn superclass(&self) -> Option<ModuleId> {
        *self.superclass.read()
    }

    pub(crate) fn set_superclass(&self, superclass: Option<ModuleId>) {
        *self.superclass.write() = superclass;
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub fn has_name(&self) -> bool {
        self.name.read().is_some()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.write() = Some(name);
    }

    pub fn lexical_parent(&self) -> Option<ModuleId> {
        *self.lexical_parent.read()
    }

    pub(crate) fn set_lexical_parent(&self, parent: ModuleId) {
        *self.lexical_parent.write() = Some(parent);
    }

    #[inline]
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn constant(&self, name: Interned) -> Option<Value> {
        self.constants.read().get(&name).cloned()
    }

    pub fn has_constant(&self, name: Interned) -> bool {
        self.constants.read().contains_key(&name)
    }

    pub(crate) fn set_constant(&self, name: Interned, value: Value) -> Option<Value> {
        self.constants.write().insert(name, value)
    }

    pub(crate) fn remove_constant(&self, name: Interned) -> Option<Value> {
        self.constants.write().shift_remove(&name)
    }

    /// A point-in-time copy of every constant, in definition order.
    pub fn constants(&self) -> Vec<(Interned, Value)> {
        self.constants
            .read()
            .iter()
            .map(|(name, value)| (*name, value.clone()))
            .collect()
    }

    /// Direct subclasses (including singleton classes and wrappers hung below this node).
    pub fn subclasses(&self) -> Vec<ModuleId> {
        self.subclasses.lock().clone()
    }

    pub(crate) fn add_subclass(&self, subclass: ModuleId) {
        let mut subclasses = self.subclasses.lock();
        if !subclasses.contains(&subclass) {
            subclasses.push(subclass);
        }
    }

    /// The variable schema shared by every instance whose real class is this one.
    #[inline]
    pub fn schema(&self) -> &VariableSchema {
        &self.schema
    }

    /// This module as an object: its flags, class variables and singleton class live here.
    #[inline]
    pub fn object(&self) -> &ObjRef {
        &self.object
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name())
            .field("superclass", &self.superclass())
            .finish()
    }
}

/// Every module record of one runtime, addressed by [`ModuleId`].
///
/// Records are never removed, so ids stay valid for the runtime's lifetime.
#[derive(Default)]
pub struct ModuleArena {
    records: RwLock<Vec<Arc<ModuleRecord>>>,
}

impl ModuleArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for the given id.
    ///
    /// Panics on an id this arena never handed out.
    pub fn get(&self, id: ModuleId) -> Arc<ModuleRecord> {
        self.records
            .read()
            .get(id.index())
            .cloned()
            .unwrap_or_else(|| panic!("dangling module id {}", id))
    }

    /// The id the next inserted record will get.
    pub fn next_id(&self) -> ModuleId {
        ModuleId(self.records.read().len() as u32)
    }

    /// Insert a new record built from its freshly assigned id.
    ///
    /// `build` runs under the arena's write lock and must not touch the arena.
    pub(crate) fn insert_with(&self, build: impl FnOnce(ModuleId) -> ModuleRecord) -> ModuleId {
        let mut records = self.records.write();
        let id = ModuleId(records.len() as u32);
        records.push(Arc::new(build(id)));
        id
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Every record, in creation order.
    pub fn records(&self) -> Vec<Arc<ModuleRecord>> {
        self.records.read().clone()
    }
}
