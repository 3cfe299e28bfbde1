use std::fmt;

bitflags::bitflags! {
    /// Per-object flags.
    ///
    /// The low byte holds the flags the object model itself checks; the `USER*`
    /// bits are reserved for value types built on top of it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        const NIL = 1 << 0;
        const FALSE = 1 << 1;
        const FROZEN = 1 << 2;
        const TAINTED = 1 << 3;
        const UNTRUSTED = 1 << 4;

        const USER0 = 1 << 8;
        const USER1 = 1 << 9;
        const USER2 = 1 << 10;
        const USER3 = 1 << 11;
        const USER4 = 1 << 12;
        const USER5 = 1 << 13;
        const USER6 = 1 << 14;
        const USER7 = 1 << 15;
    }
}

impl Default for ObjectFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// The visibility carried by a method table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
    /// Private in the module, with a public copy on the module's singleton class.
    ModuleFunction,
}

impl Visibility {
    /// Module functions are private as far as instance dispatch is concerned.
    #[inline]
    pub fn is_private(self) -> bool {
        matches!(self, Self::Private | Self::ModuleFunction)
    }

    #[inline]
    pub fn is_protected(self) -> bool {
        self == Self::Protected
    }

    #[inline]
    pub fn is_public(self) -> bool {
        self == Self::Public
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
            Self::ModuleFunction => "module_function",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a call site invoked a method, which decides whether private and
/// protected methods may be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// `receiver.name(...)`
    Normal,
    /// `name(...)`, with an implicit `self` receiver.
    Functional,
    /// A bare identifier that could also have been a local variable.
    Variable,
    /// A `super` call.
    Super,
}

impl CallType {
    #[inline]
    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_function_counts_as_private() {
        assert!(Visibility::ModuleFunction.is_private());
        assert!(Visibility::Private.is_private());
        assert!(!Visibility::Protected.is_private());
        assert!(Visibility::Public.is_public());
    }

    #[test]
    fn user_flags_do_not_overlap_core_flags() {
        let core = ObjectFlags::NIL
            | ObjectFlags::FALSE
            | ObjectFlags::FROZEN
            | ObjectFlags::TAINTED
            | ObjectFlags::UNTRUSTED;
        assert!((core & ObjectFlags::USER0).is_empty());
        assert!((core & ObjectFlags::USER7).is_empty());
    }
}
