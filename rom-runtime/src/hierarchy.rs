//!
//! The module graph: superclass chains, mixin splicing and linearization.
//!
//! A module's ancestor chain is its superclass linked list. Including a module
//! splices one [`Included`](crate::module::ModuleKind::Included) wrapper per mixed-in
//! module right above the receiver, so the chain doubles as the method resolution
//! order.
//!

use rom_core::{ModuleId, RuntimeError, RuntimeResult};

use crate::module::ModuleKind;
use crate::runtime::Runtime;
use crate::value::Value;

/// Iterates over a superclass chain, starting with the given module itself.
pub struct SuperclassChain<'a> {
    runtime: &'a Runtime,
    next: Option<ModuleId>,
}

impl Iterator for SuperclassChain<'_> {
    type Item = ModuleId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.runtime.module(current).superclass();
        Some(current)
    }
}

impl Runtime {
    /// Walk the superclass chain from `start` (inclusive).
    pub fn superclass_chain(&self, start: ModuleId) -> SuperclassChain<'_> {
        SuperclassChain {
            runtime: self,
            next: Some(start),
        }
    }

    /// The superclass as the language sees it: wrappers are skipped.
    pub fn real_superclass(&self, id: ModuleId) -> Option<ModuleId> {
        self.superclass_chain(id)
            .skip(1)
            .find(|it| !self.module(*it).is_included())
    }

    /// The first node from `id` upwards that is neither a singleton class nor a wrapper.
    pub fn real_class(&self, id: ModuleId) -> ModuleId {
        self.superclass_chain(id)
            .find(|it| {
                let record = self.module(*it);
                !record.is_singleton() && !record.is_included()
            })
            .unwrap_or(id)
    }

    /// Mix `module` (and everything it already includes) into `target`.
    ///
    /// Modules already present in `target`'s chain are not spliced again. When one
    /// is found below the current splice point but above every real superclass, the
    /// splice point moves past it, so later modules keep their relative order.
    pub fn include_module(&self, target: ModuleId, module: ModuleId) -> RuntimeResult<()> {
        let module_record = self.module(module);
        if !module_record.is_module() {
            return Err(RuntimeError::Type(format!(
                "wrong argument type {} (expected Module)",
                self.module_name(module)
            )));
        }
        if target == self.core().object {
            self.secure(4)?;
        }
        self.check_module_writable(target, "include module")?;

        let _guard = self.hierarchy_lock();

        let identity = self.module(target).non_included();
        let modules: Vec<ModuleId> = self.superclass_chain(module).collect();
        if modules
            .iter()
            .any(|it| self.module(*it).non_included() == identity)
        {
            return Err(RuntimeError::CyclicInclude {
                module: self.module_name(target),
            });
        }

        let mut changed = false;
        let mut splice = target;
        for node in modules {
            let included = self.module(node).non_included();

            let mut superclass_seen = false;
            let mut present = false;
            for existing in self.superclass_chain(target).skip(1) {
                let record = self.module(existing);
                if record.is_included() {
                    if record.non_included() == included {
                        if !superclass_seen {
                            splice = existing;
                        }
                        present = true;
                        break;
                    }
                } else if record.is_class() {
                    superclass_seen = true;
                }
            }
            if present {
                continue;
            }

            let splice_record = self.module(splice);
            let wrapper = self.create_record(
                ModuleKind::Included { module: included },
                splice_record.superclass(),
            );
            splice_record.set_superclass(Some(wrapper));
            log::debug!(
                "spliced {} into {} above {}",
                self.module_name(included),
                self.module_name(target),
                self.module_name(splice)
            );
            splice = wrapper;
            changed = true;
        }

        if changed {
            self.cache()
                .invalidate_classes(|class| self.superclass_chain(class).any(|it| it == target));
        }
        Ok(())
    }

    /// The method resolution order of `id`, wrappers resolved to their modules.
    pub fn ancestors(&self, id: ModuleId) -> Vec<ModuleId> {
        self.superclass_chain(id)
            .filter_map(|node| {
                let record = self.module(node);
                if record.is_singleton() {
                    None
                } else {
                    Some(record.non_included())
                }
            })
            .collect()
    }

    /// The modules mixed into `id` or any of its superclasses.
    pub fn included_modules(&self, id: ModuleId) -> Vec<ModuleId> {
        self.superclass_chain(id)
            .filter_map(|node| self.module(node).included_module())
            .collect()
    }

    /// Whether `module` is mixed into `id`'s chain.
    pub fn includes_module(&self, id: ModuleId, module: ModuleId) -> bool {
        self.superclass_chain(id)
            .any(|node| self.module(node).included_module() == Some(module))
    }

    /// Whether `class`'s chain passes through `module`, directly or through a wrapper.
    pub fn inherits_from(&self, class: ModuleId, module: ModuleId) -> bool {
        self.superclass_chain(class)
            .any(|node| self.module(node).non_included() == module)
    }

    /// Whether `value` is an instance of `module` or of one of its descendants.
    pub fn is_kind_of(&self, value: &Value, module: ModuleId) -> bool {
        self.inherits_from(self.class_of(value), module)
    }
}
