use indexmap::IndexSet;

use rom_core::{Interned, ModuleId, RuntimeError, RuntimeResult};

use crate::runtime::Runtime;
use crate::value::Value;
use crate::variables::is_class_variable_name;

/// Whether `name` is a valid constant name.
pub fn is_constant_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_alphanumeric())
}

impl Runtime {
    /// Assign a constant, naming the value if it is an anonymous module.
    pub fn set_constant(&self, module: ModuleId, name: &str, value: Value) -> RuntimeResult<()> {
        if !is_constant_name(name) {
            return Err(RuntimeError::Name(format!("wrong constant name {name}")));
        }
        let module = self.module(module).non_included();
        self.check_module_writable(module, "set constant")?;

        if let Value::Module(id) = &value {
            self.name_module(*id, module, name);
        }
        let sym = self.intern(name);
        if self.module(module).set_constant(sym, value).is_some() {
            log::debug!("already initialized constant {}", self.constant_path(module, name));
        }
        Ok(())
    }

    /// Look a constant up along the ancestor chain (and `Object`'s, for modules).
    pub fn get_constant(&self, module: ModuleId, name: &str) -> RuntimeResult<Value> {
        self.symbols()
            .get(name)
            .and_then(|sym| self.lookup_constant(module, sym))
            .ok_or_else(|| {
                RuntimeError::Name(format!(
                    "uninitialized constant {}",
                    self.constant_path(module, name)
                ))
            })
    }

    pub fn is_constant_defined(&self, module: ModuleId, name: &str) -> bool {
        self.symbols()
            .get(name)
            .is_some_and(|sym| self.lookup_constant(module, sym).is_some())
    }

    /// Remove a constant defined directly in `module`.
    pub fn remove_constant(&self, module: ModuleId, name: &str) -> RuntimeResult<Value> {
        self.check_module_writable(module, "remove constant")?;
        self.symbols()
            .get(name)
            .and_then(|sym| self.module(module).remove_constant(sym))
            .ok_or_else(|| {
                RuntimeError::Name(format!(
                    "constant {} not defined",
                    self.constant_path(module, name)
                ))
            })
    }

    /// The names of every constant visible from `module`, own constants first.
    ///
    /// `Object`'s constants are only listed for `Object` itself.
    pub fn constants(&self, module: ModuleId) -> Vec<String> {
        let object = self.core().object;
        let mut names = IndexSet::new();
        for node in self.superclass_chain(module) {
            let owner = self.module(node).non_included();
            if owner == object && module != object {
                break;
            }
            names.extend(self.module(owner).constants().into_iter().map(|(name, _)| name));
        }
        names
            .into_iter()
            .map(|name| self.symbol_name(name).to_string())
            .collect()
    }

    fn lookup_constant(&self, module: ModuleId, name: Interned) -> Option<Value> {
        let found = self
            .superclass_chain(module)
            .find_map(|node| self.module(self.module(node).non_included()).constant(name));
        if found.is_some() || self.module(module).is_class() {
            return found;
        }
        self.superclass_chain(self.core().object)
            .find_map(|node| self.module(self.module(node).non_included()).constant(name))
    }

    fn name_module(&self, id: ModuleId, outer: ModuleId, name: &str) {
        let record = self.module(id);
        if record.has_name() || record.is_singleton() || record.is_included() {
            return;
        }
        let full = if outer == self.core().object {
            name.to_string()
        } else {
            match self.module(outer).name() {
                Some(outer) => format!("{outer}::{name}"),
                None => return,
            }
        };
        record.set_name(full);
        record.set_lexical_parent(outer);
    }

    fn constant_path(&self, module: ModuleId, name: &str) -> String {
        if module == self.core().object {
            name.to_string()
        } else {
            format!("{}::{}", self.module_name(module), name)
        }
    }

    /// Read a class variable (`@@name`) visible from `module`.
    pub fn class_variable_get(&self, module: ModuleId, name: &str) -> RuntimeResult<Value> {
        check_class_variable_name(name)?;
        self.symbols()
            .get(name)
            .and_then(|sym| {
                let owner = self.class_variable_owner(module, sym)?;
                self.variable_get(self.module(owner).object(), sym)
            })
            .ok_or_else(|| {
                RuntimeError::Name(format!(
                    "uninitialized class variable {name} in {}",
                    self.module_name(module)
                ))
            })
    }

    /// Write a class variable, to the first module along the chain already holding it.
    pub fn class_variable_set(&self, module: ModuleId, name: &str, value: Value) -> RuntimeResult<()> {
        check_class_variable_name(name)?;
        let sym = self.intern(name);
        let owner = self
            .class_variable_owner(module, sym)
            .unwrap_or_else(|| self.module(module).non_included());
        self.check_module_writable(owner, "modify class variable")?;
        self.variable_store(self.module(owner).object(), sym, value);
        Ok(())
    }

    pub fn class_variable_defined(&self, module: ModuleId, name: &str) -> RuntimeResult<bool> {
        check_class_variable_name(name)?;
        Ok(self
            .symbols()
            .get(name)
            .is_some_and(|sym| self.class_variable_owner(module, sym).is_some()))
    }

    /// Remove a class variable defined directly in `module`.
    pub fn remove_class_variable(&self, module: ModuleId, name: &str) -> RuntimeResult<Value> {
        check_class_variable_name(name)?;
        self.check_module_writable(module, "remove class variable")?;
        let module_name = self.module_name(module);
        let Some(sym) = self.symbols().get(name) else {
            return Err(RuntimeError::Name(format!(
                "class variable {name} not defined for {module_name}"
            )));
        };

        if let Some(value) = self.variable_take(self.module(module).object(), sym) {
            return Ok(value);
        }
        if self.class_variable_owner(module, sym).is_some() {
            return Err(RuntimeError::Name(format!(
                "cannot remove {name} for {module_name}"
            )));
        }
        Err(RuntimeError::Name(format!(
            "class variable {name} not defined for {module_name}"
        )))
    }

    /// The names of every class variable visible from `module`.
    pub fn class_variables(&self, module: ModuleId) -> Vec<String> {
        let mut names = IndexSet::new();
        for node in self.superclass_chain(module) {
            let owner = self.module(self.module(node).non_included());
            for (name, _) in self.variable_entries(owner.object()) {
                names.insert(name);
            }
        }
        names
            .into_iter()
            .map(|name| self.symbol_name(name).to_string())
            .filter(|name| is_class_variable_name(name))
            .collect()
    }

    fn class_variable_owner(&self, module: ModuleId, name: Interned) -> Option<ModuleId> {
        self.superclass_chain(module)
            .map(|node| self.module(node).non_included())
            .find(|owner| self.variable_get(self.module(*owner).object(), name).is_some())
    }
}

fn check_class_variable_name(name: &str) -> RuntimeResult<()> {
    if is_class_variable_name(name) {
        Ok(())
    } else {
        Err(RuntimeError::Name(format!(
            "'{name}' is not allowed as a class variable name"
        )))
    }
}
