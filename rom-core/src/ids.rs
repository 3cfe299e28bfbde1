use std::fmt;

/// The identity of a module, class, singleton class or include wrapper.
///
/// Ids are indices into the runtime's module arena. They are handed out once,
/// in creation order, and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    /// The position of this module within the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<module:{}>", self.0)
    }
}

/// The identity of one method table entry.
///
/// Every definition, alias or visibility change produces a fresh serial, so two
/// entries sharing a callable are still told apart by the dispatch cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSerial(pub u64);
