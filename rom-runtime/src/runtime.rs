use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use rom_core::{
    Interned, MethodSerial, ModuleId, ObjectFlags, RuntimeError, RuntimeResult, SymbolTable,
};

use crate::cache::{CacheStats, DispatchCache};
use crate::config::RuntimeConfig;
use crate::module::{Allocator, ModuleArena, ModuleKind, ModuleRecord};
use crate::object::RObject;
use crate::primitives;
use crate::value::Value;
use crate::ObjRef;

/// The core classes of the object model.
///
/// This struct allows to always keep a reference to important classes,
/// even in case of modifications to constants by user-defined code.
/// Booting creates them first and in this order, so their ids are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreClasses {
    /// The **Object** class.
    pub object: ModuleId,
    /// The **Module** class.
    pub module: ModuleId,
    /// The **Class** class.
    pub class: ModuleId,
    /// The **Kernel** module.
    pub kernel: ModuleId,
    /// The **NilClass** class.
    pub nil: ModuleId,
    /// The **TrueClass** class.
    pub true_class: ModuleId,
    /// The **FalseClass** class.
    pub false_class: ModuleId,
    /// The **Integer** class.
    pub integer: ModuleId,
    /// The **Symbol** class.
    pub symbol: ModuleId,
    /// The **String** class.
    pub string: ModuleId,
    /// The **Array** class.
    pub array: ModuleId,
}

impl CoreClasses {
    const BOOT: Self = Self {
        object: ModuleId(0),
        module: ModuleId(1),
        class: ModuleId(2),
        kernel: ModuleId(3),
        nil: ModuleId(4),
        true_class: ModuleId(5),
        false_class: ModuleId(6),
        integer: ModuleId(7),
        symbol: ModuleId(8),
        string: ModuleId(9),
        array: ModuleId(10),
    };
}

/// The central data structure of the object model.
///
/// It owns every module record, the symbol table, the dispatch cache and the
/// counters handing out object ids and method serials. Independent runtimes share
/// nothing, and one runtime can be shared across threads.
pub struct Runtime {
    config: RuntimeConfig,
    modules: ModuleArena,
    symbols: SymbolTable,
    cache: DispatchCache,
    hierarchy_lock: Mutex<()>,
    object_ids: AtomicU64,
    // Integers whose tagged id would overflow get a heap-style id instead.
    integer_ids: DashMap<i64, i64>,
    method_serials: AtomicU64,
    safe_level: AtomicU8,
    core: CoreClasses,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// The allocator of ordinary classes.
pub fn allocate_object(_: &Runtime, class: ModuleId) -> ObjRef {
    Arc::new(RObject::new(class, ObjectFlags::empty()))
}

impl Runtime {
    /// Create a runtime and boot its core hierarchy.
    pub fn new(config: RuntimeConfig) -> Self {
        let runtime = Self {
            symbols: SymbolTable::with_capacity(config.initial_symbol_capacity),
            cache: DispatchCache::new(config.method_cache),
            modules: ModuleArena::new(),
            hierarchy_lock: Mutex::new(()),
            object_ids: AtomicU64::new(1),
            integer_ids: DashMap::new(),
            method_serials: AtomicU64::new(1),
            safe_level: AtomicU8::new(0),
            core: CoreClasses::BOOT,
            config,
        };
        runtime.boot();
        runtime
            .safe_level
            .store(runtime.config.safe_level, Ordering::Release);
        runtime
    }

    fn boot(&self) {
        let core = CoreClasses::BOOT;
        let class = |superclass, allocator| {
            self.create_record(ModuleKind::Class { allocator }, superclass)
        };

        let object = class(None, Some(allocate_object as Allocator));
        let module = class(Some(object), None);
        let class_class = class(Some(module), None);
        let kernel = self.create_record(ModuleKind::Module, None);
        let nil = class(Some(object), None);
        let true_class = class(Some(object), None);
        let false_class = class(Some(object), None);
        let integer = class(Some(object), None);
        let symbol = class(Some(object), None);
        let string = class(Some(object), None);
        let array = class(Some(object), None);

        debug_assert_eq!(object, core.object);
        debug_assert_eq!(module, core.module);
        debug_assert_eq!(class_class, core.class);
        debug_assert_eq!(kernel, core.kernel);
        debug_assert_eq!(nil, core.nil);
        debug_assert_eq!(true_class, core.true_class);
        debug_assert_eq!(false_class, core.false_class);
        debug_assert_eq!(integer, core.integer);
        debug_assert_eq!(symbol, core.symbol);
        debug_assert_eq!(string, core.string);
        debug_assert_eq!(array, core.array);

        let kernel_wrapper = self.create_record(ModuleKind::Included { module: kernel }, None);
        self.module(object).set_superclass(Some(kernel_wrapper));

        let object_record = self.module(object);
        for (id, name) in [
            (object, "Object"),
            (module, "Module"),
            (class_class, "Class"),
            (kernel, "Kernel"),
            (nil, "NilClass"),
            (true_class, "TrueClass"),
            (false_class, "FalseClass"),
            (integer, "Integer"),
            (symbol, "Symbol"),
            (string, "String"),
            (array, "Array"),
        ] {
            let record = self.module(id);
            record.set_name(name.to_string());
            record.set_lexical_parent(object);
            object_record.set_constant(self.intern(name), Value::Module(id));
        }

        for id in [
            object,
            module,
            class_class,
            nil,
            true_class,
            false_class,
            integer,
            symbol,
            string,
            array,
        ] {
            self.attach_metaclass(id);
        }

        primitives::install(self);
        log::debug!("booted {} core modules", self.modules.len());
    }

    /// Create a module record and hang it below its superclass.
    pub(crate) fn create_record(&self, kind: ModuleKind, superclass: Option<ModuleId>) -> ModuleId {
        let meta = match kind {
            ModuleKind::Module | ModuleKind::Included { .. } => CoreClasses::BOOT.module,
            ModuleKind::Class { .. } | ModuleKind::Singleton { .. } => CoreClasses::BOOT.class,
        };
        let id = self.modules.insert_with(|id| {
            let object = Arc::new(RObject::new(meta, ObjectFlags::empty()));
            ModuleRecord::new(id, kind, superclass, object)
        });
        if let Some(superclass) = superclass {
            self.module(superclass).add_subclass(id);
        }
        id
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    #[inline]
    pub fn modules(&self) -> &ModuleArena {
        &self.modules
    }

    /// Get the record of a module.
    #[inline]
    pub fn module(&self, id: ModuleId) -> Arc<ModuleRecord> {
        self.modules.get(id)
    }

    #[inline]
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    #[inline]
    pub fn cache(&self) -> &DispatchCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Intern a symbol.
    pub fn intern(&self, name: &str) -> Interned {
        self.symbols.intern(name)
    }

    /// Get the name of an interned symbol.
    pub fn symbol_name(&self, sym: Interned) -> Arc<str> {
        self.symbols.lookup(sym)
    }

    pub(crate) fn hierarchy_lock(&self) -> MutexGuard<'_, ()> {
        self.hierarchy_lock.lock()
    }

    pub(crate) fn next_method_serial(&self) -> MethodSerial {
        MethodSerial(self.method_serials.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_object_id(&self) -> i64 {
        let counter = self.object_ids.fetch_add(1, Ordering::Relaxed);
        ((counter << 3) & i64::MAX as u64) as i64
    }

    /// Get the current safe level.
    pub fn safe_level(&self) -> u8 {
        self.safe_level.load(Ordering::Acquire)
    }

    /// Raise the safe level; it can never be lowered.
    pub fn set_safe_level(&self, level: u8) -> RuntimeResult<()> {
        let current = self.safe_level();
        if level < current {
            return Err(RuntimeError::insecure(format!(
                "tried to downgrade safe level from {current} to {level}"
            )));
        }
        self.safe_level.store(level, Ordering::Release);
        Ok(())
    }

    /// Fail when running at `level` or above.
    pub fn secure(&self, level: u8) -> RuntimeResult<()> {
        let current = self.safe_level();
        if current >= level {
            return Err(RuntimeError::insecure(format!(
                "operation at level {current}"
            )));
        }
        Ok(())
    }

    /// Check that a module may be structurally modified.
    pub(crate) fn check_module_writable(&self, id: ModuleId, operation: &str) -> RuntimeResult<()> {
        let record = self.module(id);
        let object = record.object();
        if self.safe_level() >= 4 && !object.is_tainted() {
            return Err(RuntimeError::insecure(format!("can't {operation}")));
        }
        if object.is_frozen() {
            let what = if record.is_singleton() {
                "object"
            } else {
                "class/module"
            };
            return Err(RuntimeError::frozen(what));
        }
        Ok(())
    }

    /// Define (or reopen) a top-level class.
    pub fn define_class(&self, name: &str, superclass: Option<ModuleId>) -> RuntimeResult<ModuleId> {
        self.define_class_under(self.core.object, name, superclass)
    }

    /// Define (or reopen) a class as a constant of `outer`.
    pub fn define_class_under(
        &self,
        outer: ModuleId,
        name: &str,
        superclass: Option<ModuleId>,
    ) -> RuntimeResult<ModuleId> {
        let sym = self.intern(name);
        if let Some(existing) = self.module(outer).constant(sym) {
            let Some(id) = existing.as_module().filter(|it| self.module(*it).is_class()) else {
                return Err(RuntimeError::Type(format!("{name} is not a class")));
            };
            if let Some(superclass) = superclass {
                if self.real_superclass(id) != Some(superclass) {
                    return Err(RuntimeError::Type(format!(
                        "superclass mismatch for class {name}"
                    )));
                }
            }
            return Ok(id);
        }

        let id = self.new_class(superclass.unwrap_or(self.core.object))?;
        self.set_constant(outer, name, Value::Module(id))?;
        log::debug!("defined class {}", self.module_name(id));
        Ok(id)
    }

    /// Define (or reopen) a top-level module.
    pub fn define_module(&self, name: &str) -> RuntimeResult<ModuleId> {
        self.define_module_under(self.core.object, name)
    }

    /// Define (or reopen) a module as a constant of `outer`.
    pub fn define_module_under(&self, outer: ModuleId, name: &str) -> RuntimeResult<ModuleId> {
        let sym = self.intern(name);
        if let Some(existing) = self.module(outer).constant(sym) {
            return existing
                .as_module()
                .filter(|it| self.module(*it).is_module())
                .ok_or_else(|| RuntimeError::Type(format!("{name} is not a module")));
        }

        let id = self.new_module();
        self.set_constant(outer, name, Value::Module(id))?;
        log::debug!("defined module {}", self.module_name(id));
        Ok(id)
    }

    /// Create an anonymous class.
    pub fn new_class(&self, superclass: ModuleId) -> RuntimeResult<ModuleId> {
        let record = self.module(superclass);
        if record.is_singleton() {
            return Err(RuntimeError::Type(
                "can't make subclass of singleton class".to_string(),
            ));
        }
        if !record.is_class() {
            return Err(RuntimeError::Type(format!(
                "superclass must be a Class ({} given)",
                self.module_name(superclass)
            )));
        }
        if superclass == self.core.class {
            return Err(RuntimeError::Type("can't make subclass of Class".to_string()));
        }

        let allocator = record.allocator();
        let id = self.create_record(ModuleKind::Class { allocator }, Some(superclass));
        self.attach_metaclass(id);
        Ok(id)
    }

    /// Create an anonymous module.
    pub fn new_module(&self) -> ModuleId {
        self.create_record(ModuleKind::Module, None)
    }

    /// Build a fresh, uninitialized instance of a class.
    pub fn allocate(&self, class: ModuleId) -> RuntimeResult<ObjRef> {
        let record = self.module(class);
        match record.kind() {
            ModuleKind::Class {
                allocator: Some(allocator),
            } => Ok(allocator(self, class)),
            ModuleKind::Class { allocator: None } => Err(RuntimeError::Type(format!(
                "allocator undefined for {}",
                self.module_name(class)
            ))),
            ModuleKind::Singleton { .. } => Err(RuntimeError::Type(
                "can't create instance of singleton class".to_string(),
            )),
            ModuleKind::Module | ModuleKind::Included { .. } => Err(RuntimeError::Type(format!(
                "can't instantiate module {}",
                self.module_name(class)
            ))),
        }
    }

    /// Allocate an instance and send it `initialize` with the given arguments.
    pub fn new_instance(&self, class: ModuleId, args: Vec<Value>) -> RuntimeResult<ObjRef> {
        let obj = self.allocate(class)?;
        let receiver = Value::Object(obj.clone());
        self.send(&receiver, "initialize", args)?;
        Ok(obj)
    }

    /// The heap object behind a value, if any (modules are backed by one too).
    pub fn heap_object(&self, value: &Value) -> Option<ObjRef> {
        match value {
            Value::Object(obj) => Some(obj.clone()),
            Value::Module(id) => Some(self.module(*id).object().clone()),
            _ => None,
        }
    }

    /// The class method resolution starts from, singleton classes included.
    pub fn class_of(&self, value: &Value) -> ModuleId {
        match value {
            Value::Nil => self.core.nil,
            Value::Boolean(true) => self.core.true_class,
            Value::Boolean(false) => self.core.false_class,
            Value::Integer(_) => self.core.integer,
            Value::Symbol(_) => self.core.symbol,
            Value::String(_) => self.core.string,
            Value::Array(_) => self.core.array,
            Value::Object(obj) => obj.class(),
            Value::Module(id) => self.module(*id).object().class(),
        }
    }

    /// The class of a value, skipping singleton classes.
    pub fn real_class_of(&self, value: &Value) -> ModuleId {
        match value {
            Value::Object(obj) => obj.real_class(),
            Value::Module(id) => self.module(*id).object().real_class(),
            _ => self.class_of(value),
        }
    }

    /// The display name of a module.
    pub fn module_name(&self, id: ModuleId) -> String {
        let record = self.module(id);
        if let Some(name) = record.name() {
            return name;
        }
        match record.kind() {
            ModuleKind::Included { module } => self.module_name(*module),
            ModuleKind::Singleton { module: Some(module), .. } => {
                format!("#<Class:{}>", self.module_name(*module))
            }
            ModuleKind::Singleton { attached, .. } => match attached.upgrade() {
                Some(obj) => format!("#<Class:#<{}>>", self.module_name(obj.real_class())),
                None => "#<Class:?>".to_string(),
            },
            ModuleKind::Class { .. } => format!("#<Class:0x{:06x}>", id.0),
            ModuleKind::Module => format!("#<Module:0x{:06x}>", id.0),
        }
    }

    /// Render a value for humans.
    pub fn inspect(&self, value: &Value) -> String {
        self.inspect_nested(value, true)
    }

    fn inspect_nested(&self, value: &Value, with_variables: bool) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Integer(value) => value.to_string(),
            Value::Symbol(sym) => format!(":{}", self.symbol_name(*sym)),
            Value::String(value) => format!("{value:?}"),
            Value::Array(values) => {
                let items: Vec<String> = values
                    .iter()
                    .map(|it| self.inspect_nested(it, false))
                    .collect();
                format!("[{}]", items.join(", "))
            }
            Value::Module(id) => self.module_name(*id),
            Value::Object(obj) => {
                let mut output = format!("#<{}", self.module_name(obj.real_class()));
                if with_variables {
                    for (idx, name) in self.instance_variable_names(obj).iter().enumerate() {
                        let value = self.get_variable(obj, name).unwrap_or(Value::Nil);
                        let separator = if idx == 0 { " " } else { ", " };
                        let _ = write!(
                            output,
                            "{separator}{name}={}",
                            self.inspect_nested(&value, false)
                        );
                    }
                }
                output.push('>');
                output
            }
        }
    }

    /// The identity of any value; heap objects get a lazily assigned id.
    pub fn id_of(&self, value: &Value) -> i64 {
        match value {
            Value::Boolean(false) => 0,
            Value::Boolean(true) => 2,
            Value::Nil => 4,
            Value::Integer(value) => match value.checked_mul(2).and_then(|it| it.checked_add(1)) {
                Some(id) => id,
                None => *self.integer_ids.entry(*value).or_insert_with(|| self.next_object_id()),
            },
            Value::Symbol(sym) => i64::from(sym.0) * 8 + 6,
            Value::String(value) => ((Arc::as_ptr(value) as *const u8 as i64) << 3 | 2) & i64::MAX,
            Value::Array(values) => {
                ((Arc::as_ptr(values) as *const Value as i64) << 3 | 2) & i64::MAX
            }
            Value::Object(obj) => self.object_id(obj),
            Value::Module(id) => self.object_id(self.module(*id).object()),
        }
    }

    /// Freeze a value. Immediates are left alone.
    pub fn freeze(&self, value: &Value) -> RuntimeResult<()> {
        let Some(obj) = self.heap_object(value) else {
            return Ok(());
        };
        if self.safe_level() >= 4 && !obj.is_tainted() {
            return Err(RuntimeError::insecure("can't freeze object"));
        }
        obj.set_flag(ObjectFlags::FROZEN, true);
        Ok(())
    }

    pub fn is_frozen(&self, value: &Value) -> bool {
        match value {
            Value::String(_) | Value::Array(_) => true,
            _ => self.heap_object(value).is_some_and(|it| it.is_frozen()),
        }
    }

    /// Mark a value as tainted.
    pub fn taint(&self, value: &Value) -> RuntimeResult<()> {
        self.secure(4)?;
        let Some(obj) = self.heap_object(value) else {
            return Ok(());
        };
        if !obj.is_tainted() {
            if obj.is_frozen() {
                return Err(RuntimeError::frozen(self.module_name(obj.real_class())));
            }
            obj.set_flag(ObjectFlags::TAINTED, true);
        }
        Ok(())
    }

    pub fn is_tainted(&self, value: &Value) -> bool {
        self.heap_object(value).is_some_and(|it| it.is_tainted())
    }

    /// Resolve a constant path like `A::B::C`, starting from `Object`.
    pub fn resolve_path(&self, path: &str) -> RuntimeResult<ModuleId> {
        let mut current = self.core.object;
        for segment in path.split("::") {
            let value = self.get_constant(current, segment)?;
            current = value.as_module().ok_or_else(|| {
                RuntimeError::Type(format!("{path} does not refer to class/module"))
            })?;
        }
        Ok(current)
    }
}
