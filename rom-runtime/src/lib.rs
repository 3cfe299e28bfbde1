//!
//! This is the object model core of a dynamic, class-based, mixin-capable language runtime.
//!
//! It represents classes and modules, resolves method calls across the inheritance/mixin
//! graph through a coherent dispatch cache, and stores per-object state safely under
//! concurrent access from multiple native threads.
//!

use std::sync::Arc;

/// The process-wide method dispatch cache.
pub mod cache;
/// Runtime configuration.
pub mod config;
/// Constants and class variables.
pub mod constants;
/// Method definition, removal, aliasing, resolution and invocation.
pub mod dispatch;
/// Splicing mixins into, and linearizing, the module graph.
pub mod hierarchy;
/// Dumping objects to, and loading them from, name-based images.
pub mod marshal;
/// Facilities for manipulating methods and method tables.
pub mod method;
/// Facilities for manipulating modules and classes.
pub mod module;
/// Facilities for manipulating objects.
pub mod object;
/// Definitions for all supported primitives.
pub mod primitives;
/// The runtime context holding every module and cache.
pub mod runtime;
/// Per-class variable schemas.
pub mod schema;
/// Singleton classes, `dup` and `clone`.
pub mod singleton;
/// Facilities for manipulating values.
pub mod value;
/// Per-object variable storage.
pub mod variables;

pub use rom_core::{
    CallType, ErrorKind, Interned, MethodSerial, ModuleId, ObjectFlags, RuntimeError,
    RuntimeResult, Visibility,
};

pub use crate::cache::{CacheEntry, CacheStats};
pub use crate::config::{RuntimeConfig, TableStrategy};
pub use crate::marshal::ObjectImage;
pub use crate::method::{Callable, DynamicMethod, NativeFn};
pub use crate::object::RObject;
pub use crate::runtime::Runtime;
pub use crate::value::Value;

/// A strong and shared reference to an object.
pub type ObjRef = Arc<RObject>;
