//!
//! Singleton classes, `dup` and `clone`.
//!
//! A singleton class is a private subclass spliced between one object and its class.
//! It is created on first need, attached to exactly one object, and never shared:
//! cloning an object gives the copy its own singleton class.
//!

use std::sync::Arc;

use rom_core::{Interned, ModuleId, ObjectFlags, RuntimeError, RuntimeResult, Visibility};

use crate::method::Callable;
use crate::module::ModuleKind;
use crate::runtime::Runtime;
use crate::value::Value;
use crate::ObjRef;

impl Runtime {
    /// Get (creating it if needed) the singleton class of a value.
    ///
    /// `nil`, `true` and `false` use their own class; other immediates have none.
    pub fn singleton_class_of(&self, value: &Value) -> RuntimeResult<ModuleId> {
        match value {
            Value::Nil | Value::Boolean(_) => Ok(self.class_of(value)),
            Value::Object(obj) => Ok(self.attach_singleton_class(obj, None)),
            Value::Module(id) => Ok(self.attach_metaclass(*id)),
            _ => Err(RuntimeError::Type("can't define singleton".to_string())),
        }
    }

    /// The singleton class of a module; every class has one from creation on.
    pub(crate) fn attach_metaclass(&self, module: ModuleId) -> ModuleId {
        let object = self.module(module).object().clone();
        self.attach_singleton_class(&object, Some(module))
    }

    fn attach_singleton_class(&self, obj: &ObjRef, module: Option<ModuleId>) -> ModuleId {
        let current = obj.class();
        if self.module(current).is_attached_to(obj) {
            return current;
        }

        // The metaclass of a class inherits from the metaclass of its superclass.
        let superclass = module
            .filter(|it| self.module(*it).is_class() && !self.module(*it).is_singleton())
            .and_then(|it| self.real_superclass(it))
            .map(|it| self.attach_metaclass(it));

        let _guard = obj.lock();
        let current = obj.class();
        if self.module(current).is_attached_to(obj) {
            return current;
        }

        let superclass = superclass.unwrap_or(current);
        let id = self.create_record(
            ModuleKind::Singleton {
                attached: Arc::downgrade(obj),
                module,
            },
            Some(superclass),
        );

        let record = self.module(id);
        record
            .object()
            .set_flag(ObjectFlags::TAINTED, obj.is_tainted());
        record.object().set_flag(ObjectFlags::FROZEN, obj.is_frozen());
        obj.set_class(id);

        log::debug!("created singleton class {}", self.module_name(id));
        id
    }

    /// Define a public method on a value's singleton class.
    pub fn define_singleton_method(&self, value: &Value, name: &str, callable: Callable) -> RuntimeResult<()> {
        let singleton = self.singleton_class_of(value)?;
        self.add_method(singleton, self.intern(name), Visibility::Public, callable)?;
        Ok(())
    }

    /// The public and protected methods of a value's singleton class and of the
    /// modules it was extended with.
    pub fn singleton_methods(&self, value: &Value) -> Vec<String> {
        let class = self.class_of(value);
        if !self.module(class).is_singleton() {
            return Vec::new();
        }

        let mut names: Vec<String> = Vec::new();
        let mut hidden: Vec<Interned> = Vec::new();
        for node in self.superclass_chain(class) {
            let record = self.module(node);
            if !record.is_singleton() && !record.is_included() {
                break;
            }
            for method in self.module(record.non_included()).methods().entries() {
                if hidden.contains(&method.name()) {
                    continue;
                }
                hidden.push(method.name());
                if !method.is_undefined() && !method.visibility().is_private() {
                    names.push(self.symbol_name(method.name()).to_string());
                }
            }
        }
        names
    }

    /// Mix `module` into a value's singleton class.
    pub fn extend_object(&self, value: &Value, module: ModuleId) -> RuntimeResult<()> {
        let singleton = self.singleton_class_of(value)?;
        self.include_module(singleton, module)
    }

    /// Copy a value: variables and taint, but neither frozen state nor singleton class.
    pub fn dup(&self, value: &Value) -> RuntimeResult<Value> {
        match value {
            Value::Object(obj) => {
                let copy = self.copy_object(obj)?;
                self.send(&Value::Object(copy.clone()), "initialize_copy", vec![value.clone()])?;
                Ok(Value::Object(copy))
            }
            Value::Module(id) => {
                let copy = self.copy_module(*id)?;
                if self.module(copy).is_class() {
                    self.attach_metaclass(copy);
                }
                Ok(Value::Module(copy))
            }
            Value::String(_) | Value::Array(_) => Ok(value.clone()),
            _ => Err(RuntimeError::Type(format!(
                "can't dup {}",
                self.module_name(self.class_of(value))
            ))),
        }
    }

    /// Copy a value like [`Self::dup`], also copying its singleton class and frozen state.
    pub fn clone_value(&self, value: &Value) -> RuntimeResult<Value> {
        match value {
            Value::Object(obj) => {
                let copy = self.copy_object(obj)?;
                let class = obj.class();
                if self.module(class).is_attached_to(obj) {
                    self.clone_singleton_class(class, &copy, None);
                }
                self.send(&Value::Object(copy.clone()), "initialize_copy", vec![value.clone()])?;
                copy.set_flag(ObjectFlags::FROZEN, obj.is_frozen());
                Ok(Value::Object(copy))
            }
            Value::Module(id) => {
                let copy = self.copy_module(*id)?;
                let source = self.module(*id).object().clone();
                let target = self.module(copy).object().clone();
                let class = source.class();
                if self.module(class).is_attached_to(&source) {
                    self.clone_singleton_class(class, &target, Some(copy));
                }
                target.set_flag(ObjectFlags::FROZEN, source.is_frozen());
                Ok(Value::Module(copy))
            }
            Value::String(_) | Value::Array(_) => Ok(value.clone()),
            _ => Err(RuntimeError::Type(format!(
                "can't clone {}",
                self.module_name(self.class_of(value))
            ))),
        }
    }

    fn copy_object(&self, obj: &ObjRef) -> RuntimeResult<ObjRef> {
        let copy = self.allocate(obj.real_class())?;
        copy.set_flag(ObjectFlags::TAINTED, obj.is_tainted());
        self.copy_variables(obj, &copy);
        Ok(copy)
    }

    /// A fresh module with copies of `id`'s methods, constants and class variables.
    fn copy_module(&self, id: ModuleId) -> RuntimeResult<ModuleId> {
        let source = self.module(id);
        let kind = match source.kind() {
            ModuleKind::Module => ModuleKind::Module,
            ModuleKind::Class { allocator } => ModuleKind::Class {
                allocator: *allocator,
            },
            ModuleKind::Singleton { .. } => {
                return Err(RuntimeError::Type("can't copy singleton class".to_string()))
            }
            ModuleKind::Included { .. } => {
                return Err(RuntimeError::Type("can't copy included module".to_string()))
            }
        };
        let superclass = self.copy_wrappers(source.superclass());
        let copy = self.create_record(kind, superclass);
        self.copy_tables(id, copy);
        self.module(copy)
            .object()
            .set_flag(ObjectFlags::TAINTED, source.object().is_tainted());
        log::debug!("copied {} into {}", self.module_name(id), self.module_name(copy));
        Ok(copy)
    }

    /// Give `target` its own copy of the singleton class `source`.
    fn clone_singleton_class(&self, source: ModuleId, target: &ObjRef, module: Option<ModuleId>) -> ModuleId {
        let superclass = self.copy_wrappers(self.module(source).superclass());
        let id = self.create_record(
            ModuleKind::Singleton {
                attached: Arc::downgrade(target),
                module,
            },
            superclass,
        );
        self.copy_tables(source, id);
        target.set_class(id);
        log::debug!("cloned singleton class {} into {}", source, id);
        id
    }

    // Duplicate the leading run of wrappers so the copy can be spliced independently.
    fn copy_wrappers(&self, first: Option<ModuleId>) -> Option<ModuleId> {
        let mut wrappers = Vec::new();
        let mut base = first;
        while let Some(node) = base {
            let record = self.module(node);
            match record.included_module() {
                Some(module) => {
                    wrappers.push(module);
                    base = record.superclass();
                }
                None => break,
            }
        }
        wrappers.into_iter().rev().fold(base, |superclass, module| {
            Some(self.create_record(ModuleKind::Included { module }, superclass))
        })
    }

    fn copy_tables(&self, from: ModuleId, to: ModuleId) {
        let source = self.module(from);
        let target = self.module(to);
        for method in source.methods().entries() {
            target
                .methods()
                .insert(Arc::new(method.rehomed(self.next_method_serial(), to)));
        }
        for (name, value) in source.constants() {
            target.set_constant(name, value);
        }
        self.copy_variables(source.object(), target.object());
    }
}
