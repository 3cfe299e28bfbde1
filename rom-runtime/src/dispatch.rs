//!
//! Method definition, resolution and invocation.
//!
//! Every mutation of a method table invalidates, before returning:
//!
//! - the `(module, name)` entry,
//! - every cached resolution of the record it replaces,
//! - every cached resolution of `name` for a class whose chain passes through the module.
//!
//! The last rule covers a new definition shadowing one an ancestor provided.
//!

use std::collections::HashSet;
use std::sync::Arc;

use rom_core::{CallType, Interned, ModuleId, RuntimeError, RuntimeResult, Visibility};

use crate::cache::CacheEntry;
use crate::method::{Callable, DynamicMethod};
use crate::runtime::Runtime;
use crate::value::Value;

/// The trait for invoking methods.
pub trait Invoke {
    /// Invoke within the given runtime; the receiver is the first argument.
    fn invoke(&self, runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value>;
}

impl Invoke for DynamicMethod {
    fn invoke(&self, runtime: &Runtime, args: Vec<Value>) -> RuntimeResult<Value> {
        match self.callable() {
            Callable::Native(func) => func(runtime, args),
            Callable::AttrReader(ivar) => {
                let receiver = expect_arity(runtime, self, &args, 0)?;
                Ok(runtime
                    .heap_object(receiver)
                    .and_then(|obj| runtime.variable_get(&obj, *ivar))
                    .unwrap_or(Value::Nil))
            }
            Callable::AttrWriter(ivar) => {
                let receiver = expect_arity(runtime, self, &args, 1)?;
                let value = args[1].clone();
                let obj = runtime.heap_object(receiver).ok_or_else(|| {
                    RuntimeError::frozen(runtime.module_name(runtime.class_of(receiver)))
                })?;
                runtime.variable_set(&obj, *ivar, value.clone())?;
                Ok(value)
            }
            Callable::Constant(value) => Ok(value.clone()),
            Callable::ZSuper => runtime.call_super(self, args),
            Callable::Undefined => Err(RuntimeError::UndefinedMethod {
                name: runtime.symbol_name(self.name()).to_string(),
                reason: "undefined",
                receiver: args
                    .first()
                    .map_or_else(|| "nil".to_string(), |it| runtime.inspect(it)),
            }),
        }
    }
}

fn expect_arity<'a>(
    runtime: &Runtime,
    method: &DynamicMethod,
    args: &'a [Value],
    arity: usize,
) -> RuntimeResult<&'a Value> {
    match args.split_first() {
        Some((receiver, rest)) if rest.len() == arity => Ok(receiver),
        _ => Err(RuntimeError::Argument(format!(
            "'{}': wrong number of arguments ({} for {})",
            runtime.symbol_name(method.name()),
            args.len().saturating_sub(1),
            arity
        ))),
    }
}

impl Runtime {
    /// Resolve `name` starting from `class`, through the dispatch cache.
    pub fn resolve(&self, class: ModuleId, name: Interned) -> CacheEntry {
        if let Some(entry) = self.cache().get(class, name) {
            return entry;
        }
        let generation = self.cache().generation();
        let entry = CacheEntry::from(self.search_method_uncached(class, name));
        self.cache().insert(class, name, entry.clone(), generation);
        entry
    }

    /// Resolve `name` starting from `class`; undefined names resolve to `None`.
    pub fn search_method(&self, class: ModuleId, name: &str) -> Option<Arc<DynamicMethod>> {
        let name = self.intern(name);
        self.resolve(class, name).into_method()
    }

    /// Walk the ancestor chain without the cache; undef markers are returned as found.
    pub fn search_method_uncached(&self, class: ModuleId, name: Interned) -> Option<Arc<DynamicMethod>> {
        self.superclass_chain(class)
            .find_map(|node| self.module(self.module(node).non_included()).methods().get(name))
    }

    /// Define a method; `initialize` is always private.
    pub fn define_method(&self, module: ModuleId, name: &str, callable: Callable) -> RuntimeResult<()> {
        let visibility = if name == "initialize" || name == "initialize_copy" {
            Visibility::Private
        } else {
            Visibility::Public
        };
        self.add_method(module, self.intern(name), visibility, callable)?;
        Ok(())
    }

    /// Install a method record in a module's table.
    pub fn add_method(
        &self,
        module: ModuleId,
        name: Interned,
        visibility: Visibility,
        callable: Callable,
    ) -> RuntimeResult<Arc<DynamicMethod>> {
        let module = self.module(module).non_included();
        self.check_method_table_writable(module)?;
        let method = DynamicMethod::new(self.next_method_serial(), name, visibility, module, callable);
        Ok(self.install_method(module, method))
    }

    /// Insert into the table and invalidate every resolution it may change.
    pub(crate) fn install_method(&self, module: ModuleId, method: DynamicMethod) -> Arc<DynamicMethod> {
        let name = method.name();
        let method = Arc::new(method);
        let previous = self.module(module).methods().insert(method.clone());
        self.invalidate_resolutions(module, name, previous.as_deref());
        log::debug!(
            "defined {}#{} ({})",
            self.module_name(module),
            self.symbol_name(name),
            method.visibility()
        );
        method
    }

    fn invalidate_resolutions(&self, module: ModuleId, name: Interned, previous: Option<&DynamicMethod>) {
        let cache = self.cache();
        cache.invalidate(module, name);
        if let Some(previous) = previous {
            cache.invalidate_method(previous.serial());
        }
        cache.invalidate_name(name, |class| self.inherits_from(class, module));
    }

    fn check_method_table_writable(&self, module: ModuleId) -> RuntimeResult<()> {
        if module == self.core().object {
            self.secure(4)?;
        }
        self.check_module_writable(module, "modify method table")
    }

    /// Remove a method defined directly in `module`.
    pub fn remove_method(&self, module: ModuleId, name: &str) -> RuntimeResult<()> {
        let module = self.module(module).non_included();
        self.check_method_table_writable(module)?;

        let record = self.module(module);
        let sym = self
            .symbols()
            .get(name)
            .filter(|sym| record.methods().get(*sym).is_some_and(|it| !it.is_undefined()));
        let Some(sym) = sym else {
            return Err(RuntimeError::Name(format!(
                "method '{name}' not defined in {}",
                self.module_name(module)
            )));
        };

        if let Some(previous) = record.methods().remove(sym) {
            self.invalidate_resolutions(module, sym, Some(previous.as_ref()));
            log::debug!("removed {}#{}", self.module_name(module), name);
        }
        Ok(())
    }

    /// Hide `name` from `module` and its descendants with an undef marker.
    ///
    /// Only names defined directly in `module` can be undefined.
    pub fn undef_method(&self, module: ModuleId, name: &str) -> RuntimeResult<()> {
        let module = self.module(module).non_included();
        self.check_method_table_writable(module)?;

        let record = self.module(module);
        let sym = self
            .symbols()
            .get(name)
            .filter(|sym| record.methods().get(*sym).is_some_and(|it| !it.is_undefined()));
        let Some(sym) = sym else {
            return Err(RuntimeError::Name(format!(
                "undefined method '{name}' for {} '{}'",
                self.kind_name(module),
                self.module_name(module)
            )));
        };

        let marker = DynamicMethod::new(
            self.next_method_serial(),
            sym,
            Visibility::Public,
            module,
            Callable::Undefined,
        );
        self.install_method(module, marker);
        Ok(())
    }

    /// Make `new_name` another name for whatever `old_name` resolves to from `module`.
    pub fn alias_method(&self, module: ModuleId, new_name: &str, old_name: &str) -> RuntimeResult<()> {
        let module = self.module(module).non_included();
        self.check_method_table_writable(module)?;

        let old = self.intern(old_name);
        let method = self.find_for_module(module, old).ok_or_else(|| {
            RuntimeError::Name(format!(
                "undefined method '{old_name}' for {} '{}'",
                self.kind_name(module),
                self.module_name(module)
            ))
        })?;

        let alias = method.aliased(self.next_method_serial(), self.intern(new_name), module);
        self.install_method(module, alias);
        Ok(())
    }

    /// Change the visibility of each named method as seen from `module`.
    ///
    /// Inherited methods get a super-delegating entry carrying the new visibility.
    pub fn set_visibility(&self, module: ModuleId, names: &[&str], visibility: Visibility) -> RuntimeResult<()> {
        let module = self.module(module).non_included();
        self.check_method_table_writable(module)?;

        for name in names {
            let sym = self.intern(name);
            let method = self.find_for_module(module, sym).ok_or_else(|| {
                RuntimeError::Name(format!(
                    "undefined method '{name}' for {} '{}'",
                    self.kind_name(module),
                    self.module_name(module)
                ))
            })?;
            if method.visibility() == visibility {
                continue;
            }

            let serial = self.next_method_serial();
            let entry = if method.owner() == module {
                method.with_visibility(serial, visibility)
            } else {
                DynamicMethod::new(serial, sym, visibility, module, Callable::ZSuper)
            };
            self.install_method(module, entry);
        }
        Ok(())
    }

    /// Make each method a private instance method plus a public singleton method.
    pub fn module_function(&self, module: ModuleId, names: &[&str]) -> RuntimeResult<()> {
        if !self.module(module).is_module() {
            return Err(RuntimeError::Type(
                "module_function must be called for modules".to_string(),
            ));
        }
        let singleton = self.singleton_class_of(&Value::Module(module))?;
        self.check_method_table_writable(singleton)?;

        for name in names {
            let sym = self.intern(name);
            let method = self.find_for_module(module, sym).ok_or_else(|| {
                RuntimeError::Name(format!(
                    "undefined method '{name}' for module '{}'",
                    self.module_name(module)
                ))
            })?;
            self.set_visibility(module, &[*name], Visibility::Private)?;
            let copy = DynamicMethod::new(
                self.next_method_serial(),
                sym,
                Visibility::Public,
                singleton,
                method.callable().clone(),
            );
            self.install_method(singleton, copy);
        }
        Ok(())
    }

    /// Define `name` and/or `name=` accessors for `@name`.
    pub fn define_attr(&self, module: ModuleId, name: &str, readable: bool, writable: bool) -> RuntimeResult<()> {
        if !crate::variables::is_instance_variable_name(&format!("@{name}")) {
            return Err(RuntimeError::Name(format!("invalid attribute name '{name}'")));
        }
        let ivar = self.intern(&format!("@{name}"));
        if readable {
            self.add_method(module, self.intern(name), Visibility::Public, Callable::AttrReader(ivar))?;
        }
        if writable {
            let setter = self.intern(&format!("{name}="));
            self.add_method(module, setter, Visibility::Public, Callable::AttrWriter(ivar))?;
        }
        Ok(())
    }

    /// Unique method names along the chain, in resolution order.
    ///
    /// Module functions count as private.
    pub fn instance_methods(&self, module: ModuleId, visibilities: &[Visibility], include_inherited: bool) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for node in self.superclass_chain(module) {
            let owner = self.module(self.module(node).non_included());
            for method in owner.methods().entries() {
                if !seen.insert(method.name()) || method.is_undefined() {
                    continue;
                }
                let visibility = match method.visibility() {
                    Visibility::ModuleFunction => Visibility::Private,
                    visibility => visibility,
                };
                if visibilities.contains(&visibility) {
                    names.push(self.symbol_name(method.name()).to_string());
                }
            }
            if !include_inherited {
                break;
            }
        }
        names
    }

    /// The visibility `name` resolves to from `class`.
    pub fn method_visibility(&self, class: ModuleId, name: &str) -> Option<Visibility> {
        self.search_method(class, name).map(|it| it.visibility())
    }

    /// Whether `name` resolves from `class`; with `check_visibility`, private methods don't count.
    pub fn is_method_bound(&self, class: ModuleId, name: &str, check_visibility: bool) -> bool {
        self.search_method(class, name)
            .is_some_and(|it| !check_visibility || !it.visibility().is_private())
    }

    /// The module owning the method `name` resolves to from `class`.
    pub fn method_owner(&self, class: ModuleId, name: &str) -> Option<ModuleId> {
        self.search_method(class, name).map(|it| it.owner())
    }

    /// Call a method the way a call site would, enforcing visibility.
    pub fn call_method(
        &self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        call_type: CallType,
        caller: Option<&Value>,
    ) -> RuntimeResult<Value> {
        self.call_method_interned(receiver, self.intern(name), args, call_type, caller)
    }

    /// Call a method ignoring visibility.
    pub fn send(&self, receiver: &Value, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        self.call_method(receiver, name, args, CallType::Functional, None)
    }

    pub(crate) fn call_method_interned(
        &self,
        receiver: &Value,
        name: Interned,
        args: Vec<Value>,
        call_type: CallType,
        caller: Option<&Value>,
    ) -> RuntimeResult<Value> {
        let class = self.class_of(receiver);
        let reason = match self.resolve(class, name) {
            CacheEntry::Defined(method) => match method.visibility() {
                visibility if visibility.is_private() && call_type.is_normal() => "private",
                Visibility::Protected
                    if call_type.is_normal()
                        && !caller.is_some_and(|it| self.is_kind_of(it, method.owner())) =>
                {
                    "protected"
                }
                _ => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(receiver.clone());
                    full.extend(args);
                    return method.invoke(self, full);
                }
            },
            CacheEntry::Undefined => "undefined",
        };
        self.method_missing(receiver, name, args, reason)
    }

    /// Hand a failed call to the receiver's `method_missing`.
    ///
    /// The default `Kernel#method_missing` is short-circuited so the error keeps the reason.
    fn method_missing(&self, receiver: &Value, name: Interned, args: Vec<Value>, reason: &'static str) -> RuntimeResult<Value> {
        let class = self.class_of(receiver);
        let handler = self.resolve(class, self.intern("method_missing")).into_method();
        match handler {
            Some(handler) if handler.owner() != self.core().kernel => {
                let mut full = Vec::with_capacity(args.len() + 2);
                full.push(receiver.clone());
                full.push(Value::Symbol(name));
                full.extend(args);
                handler.invoke(self, full)
            }
            _ => Err(self.undefined_method(receiver, name, reason)),
        }
    }

    pub(crate) fn undefined_method(&self, receiver: &Value, name: Interned, reason: &'static str) -> RuntimeError {
        RuntimeError::UndefinedMethod {
            name: self.symbol_name(name).to_string(),
            reason,
            receiver: self.inspect(receiver),
        }
    }

    /// Run the next definition of `method`'s name above its owner in the receiver's chain.
    pub(crate) fn call_super(&self, method: &DynamicMethod, args: Vec<Value>) -> RuntimeResult<Value> {
        let receiver = args.first().cloned().unwrap_or(Value::Nil);
        let class = self.class_of(&receiver);
        let found = self
            .superclass_chain(class)
            .skip_while(|node| self.module(*node).non_included() != method.owner())
            .skip(1)
            .find_map(|node| self.module(self.module(node).non_included()).methods().get(method.original_name()))
            .filter(|it| !it.is_undefined());
        match found {
            Some(next) => next.invoke(self, args),
            None => Err(self.undefined_method(&receiver, method.name(), "no superclass")),
        }
    }

    // Modules fall back to Object's methods, as their instances always are Objects.
    fn find_for_module(&self, module: ModuleId, name: Interned) -> Option<Arc<DynamicMethod>> {
        let found = self
            .search_method_uncached(module, name)
            .filter(|it| !it.is_undefined());
        if found.is_some() || !self.module(module).is_module() {
            return found;
        }
        self.search_method_uncached(self.core().object, name)
            .filter(|it| !it.is_undefined())
    }

    fn kind_name(&self, module: ModuleId) -> &'static str {
        if self.module(module).is_module() {
            "module"
        } else {
            "class"
        }
    }
}
