use std::fmt;
use std::sync::Arc;

use rom_core::{Interned, ModuleId};

use crate::ObjRef;

/// Represents a value handled by the object model.
///
/// `nil`, booleans, integers and symbols are immediates: they carry no variable
/// table and cannot hold singleton methods. Strings and arrays are immutable
/// payloads handed back by primitives. Everything else is a heap object,
/// compared by identity.
#[derive(Clone)]
pub enum Value {
    /// The **nil** value.
    Nil,
    /// A boolean value (**true** or **false**).
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// An interned symbol value.
    Symbol(Interned),
    /// An immutable string value.
    String(Arc<str>),
    /// An immutable array value.
    Array(Arc<[Value]>),
    /// An instance of some class.
    Object(ObjRef),
    /// A module or class, used as a value.
    Module(ModuleId),
}

impl Value {
    /// The **nil** value.
    pub const NIL: Self = Self::Nil;

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Everything except `nil` and `false` is truthy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Boolean(false))
    }

    /// Whether this value lives without an object header.
    #[inline]
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            Self::Nil | Self::Boolean(_) | Self::Integer(_) | Self::Symbol(_)
        )
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<ModuleId> {
        match self {
            Self::Module(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Interned> {
        match self {
            Self::Symbol(sym) => Some(*sym),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Build an array value.
    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Array(values.into_iter().collect())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Self::Object(obj)
    }
}

impl From<ModuleId> for Value {
    fn from(id: ModuleId) -> Self {
        Self::Module(id)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a.eq(b),
            (Self::Integer(a), Self::Integer(b)) => a.eq(b),
            (Self::Symbol(a), Self::Symbol(b)) => a.eq(b),
            (Self::String(a), Self::String(b)) => a.eq(b),
            (Self::Array(a), Self::Array(b)) => a.eq(b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Module(a), Self::Module(b)) => a.eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.debug_tuple("Nil").finish(),
            Self::Boolean(val) => f.debug_tuple("Boolean").field(val).finish(),
            Self::Integer(val) => f.debug_tuple("Integer").field(val).finish(),
            Self::Symbol(val) => f.debug_tuple("Symbol").field(val).finish(),
            Self::String(val) => f.debug_tuple("String").field(val).finish(),
            Self::Array(val) => f.debug_tuple("Array").field(val).finish(),
            Self::Object(obj) => f
                .debug_tuple("Object")
                .field(&Arc::as_ptr(obj))
                .field(&obj.class())
                .finish(),
            Self::Module(id) => f.debug_tuple("Module").field(id).finish(),
        }
    }
}
