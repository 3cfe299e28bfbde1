//!
//! This crate contains the vocabulary shared by every consumer of the object model:
//! identifiers, symbols, flags, visibilities and the error taxonomy.
//!

/// The error kinds raised by object model operations.
pub mod error;
/// Object flags, method visibilities and call types.
pub mod flags;
/// Identifiers for modules and methods.
pub mod ids;
/// Facilities for string interning.
pub mod interner;

pub use error::{ErrorKind, RuntimeError, RuntimeResult};
pub use flags::{CallType, ObjectFlags, Visibility};
pub use ids::{MethodSerial, ModuleId};
pub use interner::{Interned, Interner, SymbolTable};
