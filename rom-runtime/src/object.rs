use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};

use rom_core::{ModuleId, ObjectFlags};

use crate::variables::VariableTable;

/// Represents a heap object.
///
/// The class reference is replaced wholesale when a singleton class is spliced in,
/// while the real class (the one whose variable schema the object uses) never changes
/// after allocation.
pub struct RObject {
    class: AtomicU32,
    real_class: AtomicU32,
    flags: AtomicU32,
    variables: VariableTable,
    lock: Mutex<()>,
}

impl RObject {
    /// Construct an object whose class is also its real class.
    pub(crate) fn new(class: ModuleId, flags: ObjectFlags) -> Self {
        Self {
            class: AtomicU32::new(class.0),
            real_class: AtomicU32::new(class.0),
            flags: AtomicU32::new(flags.bits()),
            variables: VariableTable::new(),
            lock: Mutex::new(()),
        }
    }

    /// Get the current class of this object, which may be a singleton class.
    #[inline]
    pub fn class(&self) -> ModuleId {
        ModuleId(self.class.load(Ordering::Acquire))
    }

    /// Retarget this object to another class.
    pub(crate) fn set_class(&self, class: ModuleId) {
        self.class.store(class.0, Ordering::Release);
    }

    /// Get the class this object was allocated from.
    #[inline]
    pub fn real_class(&self) -> ModuleId {
        ModuleId(self.real_class.load(Ordering::Acquire))
    }

    #[inline]
    pub fn flags(&self) -> ObjectFlags {
        ObjectFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    pub fn get_flag(&self, flag: ObjectFlags) -> bool {
        self.flags().contains(flag)
    }

    /// Sets or unsets a flag on this object.
    pub fn set_flag(&self, flag: ObjectFlags, set: bool) {
        if set {
            self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
        }
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.get_flag(ObjectFlags::FROZEN)
    }

    #[inline]
    pub fn is_tainted(&self) -> bool {
        self.get_flag(ObjectFlags::TAINTED)
    }

    #[inline]
    pub fn is_untrusted(&self) -> bool {
        self.get_flag(ObjectFlags::UNTRUSTED)
    }

    /// Get this object's variable slots.
    #[inline]
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Take this object's own exclusive lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

impl fmt::Debug for RObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RObject")
            .field("class", &self.class())
            .field("real_class", &self.real_class())
            .field("flags", &self.flags())
            .field("slots", &self.variables.len())
            .finish()
    }
}
