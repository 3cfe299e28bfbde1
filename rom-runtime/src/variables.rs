//!
//! Per-object variable storage.
//!
//! Each object owns a lazily allocated, monotonically growing array of slots whose
//! indices come from its real class's [`VariableSchema`](crate::schema::VariableSchema).
//! Two synchronization strategies are supported (see [`TableStrategy`]):
//!
//! - `Synchronized`: every access takes the object's own lock.
//! - `Stamped`: a per-object stamp is even while quiescent and odd while the array is
//!   being replaced by a larger one. In-place writes store into the current array,
//!   issue a full fence and retry if the stamp moved underneath them. Reads are
//!   plain acquire loads of the published array.
//!

use std::fmt;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use rom_core::{Interned, RuntimeError, RuntimeResult};

use crate::config::TableStrategy;
use crate::object::RObject;
use crate::runtime::Runtime;
use crate::value::Value;

struct SlotArray {
    slots: Box<[ArcSwapOption<Value>]>,
}

impl SlotArray {
    /// Build an array of `len` slots, carrying over whatever `previous` holds.
    fn grown_from(previous: Option<&SlotArray>, len: usize) -> Self {
        let slots = (0..len)
            .map(|idx| {
                let value = previous
                    .and_then(|prev| prev.slots.get(idx))
                    .and_then(|slot| slot.load_full());
                ArcSwapOption::new(value)
            })
            .collect();
        Self { slots }
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// The variable slots of one object.
pub struct VariableTable {
    stamp: AtomicU64,
    slots: ArcSwapOption<SlotArray>,
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTable {
    /// Create an empty table; no array is allocated until the first write.
    pub fn new() -> Self {
        Self {
            stamp: AtomicU64::new(0),
            slots: ArcSwapOption::new(None),
        }
    }

    /// Read the slot at the given index, if it is in bounds and holds a value.
    pub fn get(&self, index: usize) -> Option<Value> {
        let guard = self.slots.load();
        let array = guard.as_deref()?;
        let slot = array.slots.get(index)?;
        let value = slot.load();
        value.as_deref().cloned()
    }

    /// The current length of the slot array.
    pub fn len(&self) -> usize {
        self.slots.load().as_deref().map_or(0, SlotArray::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current generation stamp (odd while a grow is in progress).
    pub fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    /// Whether any slot currently holds a value.
    pub fn has_values(&self) -> bool {
        let guard = self.slots.load();
        guard
            .as_deref()
            .is_some_and(|array| array.slots.iter().any(|slot| slot.load().is_some()))
    }

    /// Every slot's value, in index order.
    pub fn snapshot(&self) -> Vec<Option<Value>> {
        let guard = self.slots.load();
        match guard.as_deref() {
            Some(array) => array
                .slots
                .iter()
                .map(|slot| slot.load().as_deref().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Store into a slot following the stamped protocol.
    ///
    /// `required_len` is the schema's length at the time of the call; a grow sizes
    /// the new array to cover it.
    pub(crate) fn store_stamped(&self, index: usize, value: Option<Value>, required_len: usize) {
        let value = value.map(Arc::new);
        loop {
            let stamp = self.stamp.load(Ordering::Acquire);
            if stamp & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let current = self.slots.load_full();
            match current.as_deref() {
                Some(array) if index < array.len() => {
                    array.slots[index].store(value.clone());
                    fence(Ordering::SeqCst);
                    if self.stamp.load(Ordering::Acquire) == stamp {
                        return;
                    }
                }
                _ => {
                    if value.is_none() {
                        return;
                    }
                    if self
                        .stamp
                        .compare_exchange(stamp, stamp + 1, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        continue;
                    }

                    let grown =
                        SlotArray::grown_from(current.as_deref(), required_len.max(index + 1));
                    grown.slots[index].store(value.clone());
                    self.slots.store(Some(Arc::new(grown)));
                    self.stamp.store(stamp + 2, Ordering::Release);
                    return;
                }
            }
        }
    }

    /// Store into a slot; the caller holds the owning object's lock.
    pub(crate) fn store_exclusive(&self, index: usize, value: Option<Value>, required_len: usize) {
        let value = value.map(Arc::new);
        let current = self.slots.load_full();
        match current.as_deref() {
            Some(array) if index < array.len() => array.slots[index].store(value),
            _ => {
                if value.is_none() {
                    return;
                }
                let grown = SlotArray::grown_from(current.as_deref(), required_len.max(index + 1));
                grown.slots[index].store(value);
                self.slots.store(Some(Arc::new(grown)));
                self.stamp.fetch_add(2, Ordering::AcqRel);
            }
        }
    }

    /// Drop the whole array once nothing is left in it.
    pub(crate) fn discard_if_empty(&self) {
        if self.stamp() & 1 == 0 && !self.is_empty() && !self.has_values() {
            let stamp = self.stamp();
            if self
                .stamp
                .compare_exchange(stamp, stamp + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if !self.has_values() {
                    self.slots.store(None);
                }
                self.stamp.store(stamp + 2, Ordering::Release);
            }
        }
    }
}

impl fmt::Debug for VariableTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableTable")
            .field("stamp", &self.stamp())
            .field("slots", &self.snapshot())
            .finish()
    }
}

/// Whether `name` is a valid instance variable name (`@ident`).
pub fn is_instance_variable_name(name: &str) -> bool {
    name.strip_prefix('@')
        .is_some_and(|rest| !rest.starts_with('@') && is_identifier(rest))
}

/// Whether `name` is a valid class variable name (`@@ident`).
pub fn is_class_variable_name(name: &str) -> bool {
    name.strip_prefix("@@").is_some_and(is_identifier)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch == '_' || ch.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|ch| ch == '_' || ch.is_alphanumeric())
}

impl Runtime {
    /// Read a variable by name, without validating the name's shape.
    ///
    /// This is the raw store used by value types for their auxiliary fields.
    pub fn get_variable(&self, obj: &RObject, name: &str) -> Option<Value> {
        let name = self.symbols().get(name)?;
        self.variable_get(obj, name)
    }

    /// Store a variable by name, without validating the name's shape.
    pub fn set_variable(&self, obj: &RObject, name: &str, value: Value) -> RuntimeResult<()> {
        let name = self.intern(name);
        self.variable_set(obj, name, value)
    }

    /// Clear a variable by name, returning its previous value.
    pub fn remove_variable(&self, obj: &RObject, name: &str) -> RuntimeResult<Option<Value>> {
        self.check_variables_writable(obj)?;
        let Some(name) = self.symbols().get(name) else {
            return Ok(None);
        };
        Ok(self.variable_take(obj, name))
    }

    pub(crate) fn variable_get(&self, obj: &RObject, name: Interned) -> Option<Value> {
        let record = self.module(obj.real_class());
        let index = record.schema().index_for_read(name)?;
        self.load_slot(obj, index)
    }

    pub(crate) fn variable_set(&self, obj: &RObject, name: Interned, value: Value) -> RuntimeResult<()> {
        self.check_variables_writable(obj)?;
        self.variable_store(obj, name, value);
        Ok(())
    }

    /// Store without frozen or security checks.
    pub(crate) fn variable_store(&self, obj: &RObject, name: Interned, value: Value) {
        let record = self.module(obj.real_class());
        let schema = record.schema();
        let index = schema.index_for_write(name);
        self.store_slot(obj, index, Some(value), schema.len());
    }

    /// Clear a slot without frozen or security checks.
    pub(crate) fn variable_take(&self, obj: &RObject, name: Interned) -> Option<Value> {
        let record = self.module(obj.real_class());
        let schema = record.schema();
        let index = schema.index_for_read(name)?;

        let _guard = obj.lock();
        let previous = obj.variables().get(index);
        if previous.is_some() {
            self.store_slot_locked(obj, index, None, schema.len());
            obj.variables().discard_if_empty();
        }
        previous
    }

    /// Every named variable currently holding a value, in slot order.
    pub fn variable_entries(&self, obj: &RObject) -> Vec<(Interned, Value)> {
        let record = self.module(obj.real_class());
        record
            .schema()
            .variables()
            .into_iter()
            .filter_map(|(index, name)| Some((name, self.load_slot(obj, index)?)))
            .collect()
    }

    /// Read an instance variable (`@name`).
    pub fn instance_variable_get(&self, obj: &RObject, name: &str) -> RuntimeResult<Option<Value>> {
        check_instance_variable_name(name)?;
        Ok(self.get_variable(obj, name))
    }

    /// Write an instance variable (`@name`).
    pub fn instance_variable_set(&self, obj: &RObject, name: &str, value: Value) -> RuntimeResult<()> {
        check_instance_variable_name(name)?;
        self.set_variable(obj, name, value)
    }

    pub fn instance_variable_defined(&self, obj: &RObject, name: &str) -> RuntimeResult<bool> {
        Ok(self.instance_variable_get(obj, name)?.is_some())
    }

    /// Remove an instance variable, returning its value.
    pub fn remove_instance_variable(&self, obj: &RObject, name: &str) -> RuntimeResult<Value> {
        check_instance_variable_name(name)?;
        self.remove_variable(obj, name)?
            .ok_or_else(|| RuntimeError::Name(format!("instance variable {name} not defined")))
    }

    /// The names of every instance variable holding a value.
    pub fn instance_variable_names(&self, obj: &RObject) -> Vec<String> {
        self.variable_entries(obj)
            .into_iter()
            .map(|(name, _)| self.symbol_name(name))
            .filter(|name| is_instance_variable_name(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Get the object's id, assigning a fresh one on first request.
    pub fn object_id(&self, obj: &RObject) -> i64 {
        let record = self.module(obj.real_class());
        let schema = record.schema();

        if let Some(index) = schema.object_id_index_for_read() {
            if let Some(Value::Integer(id)) = self.load_slot(obj, index) {
                return id;
            }
        }

        let _guard = obj.lock();
        let index = schema.object_id_index();
        if let Some(Value::Integer(id)) = obj.variables().get(index) {
            return id;
        }

        let id = self.next_object_id();
        self.store_slot_locked(obj, index, Some(Value::Integer(id)), schema.len());
        log::trace!("assigned object id {} to {:?}", id, obj);
        id
    }

    /// Copy every named variable of `from` onto `to`; the object id is not copied.
    pub(crate) fn copy_variables(&self, from: &RObject, to: &RObject) {
        for (name, value) in self.variable_entries(from) {
            self.variable_store(to, name, value);
        }
    }

    pub(crate) fn check_variables_writable(&self, obj: &RObject) -> RuntimeResult<()> {
        if self.safe_level() >= 4 && !obj.is_tainted() {
            return Err(RuntimeError::insecure("modify instance variable"));
        }
        if obj.is_frozen() {
            return Err(RuntimeError::frozen(self.module_name(obj.real_class())));
        }
        Ok(())
    }

    fn load_slot(&self, obj: &RObject, index: usize) -> Option<Value> {
        match self.config().variable_strategy {
            TableStrategy::Synchronized => {
                let _guard = obj.lock();
                obj.variables().get(index)
            }
            TableStrategy::Stamped => obj.variables().get(index),
        }
    }

    fn store_slot(&self, obj: &RObject, index: usize, value: Option<Value>, required_len: usize) {
        match self.config().variable_strategy {
            TableStrategy::Synchronized => {
                let _guard = obj.lock();
                obj.variables().store_exclusive(index, value, required_len);
            }
            TableStrategy::Stamped => obj.variables().store_stamped(index, value, required_len),
        }
    }

    // The caller holds `obj.lock()`.
    fn store_slot_locked(&self, obj: &RObject, index: usize, value: Option<Value>, required_len: usize) {
        match self.config().variable_strategy {
            TableStrategy::Synchronized => obj.variables().store_exclusive(index, value, required_len),
            TableStrategy::Stamped => obj.variables().store_stamped(index, value, required_len),
        }
    }
}

fn check_instance_variable_name(name: &str) -> RuntimeResult<()> {
    if is_instance_variable_name(name) {
        Ok(())
    } else {
        Err(RuntimeError::Name(format!(
            "'{name}' is not allowed as an instance variable name"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_reads_nothing() {
        let table = VariableTable::new();
        assert_eq!(table.get(0), None);
        assert_eq!(table.len(), 0);
        assert!(!table.has_values());
    }

    #[test]
    fn stamped_grow_preserves_existing_slots() {
        let table = VariableTable::new();
        table.store_stamped(0, Some(Value::Integer(1)), 1);
        assert_eq!(table.stamp(), 2);

        table.store_stamped(3, Some(Value::Integer(4)), 2);
        assert_eq!(table.len(), 4);
        assert_eq!(table.stamp(), 4);
        assert_eq!(table.get(0), Some(Value::Integer(1)));
        assert_eq!(table.get(1), None);
        assert_eq!(table.get(3), Some(Value::Integer(4)));

        table.store_stamped(0, Some(Value::Integer(10)), 4);
        assert_eq!(table.stamp(), 4, "in-place writes leave the stamp alone");
        assert_eq!(table.get(0), Some(Value::Integer(10)));
    }

    #[test]
    fn clearing_an_absent_slot_does_not_grow() {
        let table = VariableTable::new();
        table.store_stamped(5, None, 6);
        table.store_exclusive(5, None, 6);
        assert!(table.is_empty());
    }

    #[test]
    fn empty_arrays_are_discarded() {
        let table = VariableTable::new();
        table.store_exclusive(1, Some(Value::Nil), 2);
        table.store_exclusive(1, None, 2);
        table.discard_if_empty();
        assert!(table.is_empty());
        assert_eq!(table.stamp() & 1, 0);
    }

    #[test]
    fn concurrent_stamped_writes_all_land() {
        let table = VariableTable::new();
        std::thread::scope(|scope| {
            for idx in 0..8usize {
                let table = &table;
                scope.spawn(move || {
                    for round in 0..100i64 {
                        table.store_stamped(idx, Some(Value::Integer(round)), idx + 1);
                    }
                });
            }
        });

        for idx in 0..8 {
            assert_eq!(table.get(idx), Some(Value::Integer(99)));
        }
        assert_eq!(table.stamp() & 1, 0);
    }

    #[test]
    fn variable_names_are_validated() {
        assert!(is_instance_variable_name("@foo"));
        assert!(is_instance_variable_name("@_bar2"));
        assert!(!is_instance_variable_name("foo"));
        assert!(!is_instance_variable_name("@@foo"));
        assert!(!is_instance_variable_name("@1x"));
        assert!(!is_instance_variable_name("@"));

        assert!(is_class_variable_name("@@count"));
        assert!(!is_class_variable_name("@count"));
        assert!(!is_class_variable_name("@@"));
    }
}
