use rom_core::{RuntimeError, RuntimeResult};

use crate::runtime::Runtime;
use crate::value::Value;
use crate::ObjRef;

/// The persistent shape of an object: its class path and named variables.
///
/// Slot indices never appear here, so an image can be loaded into a runtime whose
/// schemas assigned indices in a different order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectImage {
    /// The path of the object's real class (eg. `Outer::Inner`).
    pub class_name: String,
    /// Every named variable holding a value, in slot order.
    pub variables: Vec<(String, Value)>,
}

impl Runtime {
    /// Capture an object's class path and variables.
    pub fn dump_object(&self, obj: &ObjRef) -> RuntimeResult<ObjectImage> {
        let singleton = self.module(obj.class());
        if singleton.is_attached_to(obj) {
            let extended = singleton
                .superclass()
                .is_some_and(|it| self.module(it).is_included());
            if extended || !singleton.methods().is_empty() {
                return Err(RuntimeError::Type("singleton can't be dumped".to_string()));
            }
        }

        let real_class = obj.real_class();
        let class_name = self.module(real_class).name().ok_or_else(|| {
            RuntimeError::Type(format!(
                "can't dump anonymous class {}",
                self.module_name(real_class)
            ))
        })?;

        let variables = self
            .variable_entries(obj)
            .into_iter()
            .map(|(name, value)| (self.symbol_name(name).to_string(), value))
            .collect();

        Ok(ObjectImage {
            class_name,
            variables,
        })
    }

    /// Rebuild an object from an image, resolving its class by path.
    pub fn load_object(&self, image: &ObjectImage) -> RuntimeResult<ObjRef> {
        let class = self.resolve_path(&image.class_name)?;
        let obj = self.allocate(class)?;
        for (name, value) in &image.variables {
            self.set_variable(&obj, name, value.clone())?;
        }
        log::debug!(
            "loaded {} with {} variables",
            image.class_name,
            image.variables.len()
        );
        Ok(obj)
    }
}
