//! Engine value records and the per-handle value table
//!
//! A [`JsValue`] is a fixed 16-byte record that crosses the C boundary by
//! value. Primitives are encoded inline; everything that lives on the engine
//! heap (objects, strings, symbols, bigints) is stored in the handle's
//! [`ValueTable`] and the record carries a generational [`ValueId`], so a
//! record used after it was released is detected instead of aliasing a
//! recycled slot.

use crate::error::{Result, ShimError};

/// Pinned discriminant of a [`JsValue`] record
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    BigInt = -9,
    Symbol = -8,
    String = -7,
    Object = -1,
    Int = 0,
    Bool = 1,
    Null = 2,
    Undefined = 3,
    Exception = 6,
    Float64 = 7,
}

impl ValueTag {
    /// Whether values with this tag are stored in the value table
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            ValueTag::BigInt | ValueTag::Symbol | ValueTag::String | ValueTag::Object
        )
    }
}

impl TryFrom<i64> for ValueTag {
    type Error = ShimError;

    fn try_from(tag: i64) -> Result<Self> {
        Ok(match tag {
            -9 => ValueTag::BigInt,
            -8 => ValueTag::Symbol,
            -7 => ValueTag::String,
            -1 => ValueTag::Object,
            0 => ValueTag::Int,
            1 => ValueTag::Bool,
            2 => ValueTag::Null,
            3 => ValueTag::Undefined,
            6 => ValueTag::Exception,
            7 => ValueTag::Float64,
            _ => return Err(ShimError::InvalidTag { tag }),
        })
    }
}

/// Engine value record passed by value across the FFI boundary.
///
/// Layout is `{ u64 payload, i64 tag }`: 16 bytes, 8-byte aligned, no
/// padding, identical on every supported target.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JsValue {
    pub payload: u64,
    pub tag: i64,
}

const _: () = assert!(std::mem::size_of::<JsValue>() == 16);
const _: () = assert!(std::mem::align_of::<JsValue>() == 8);

impl JsValue {
    pub const UNDEFINED: JsValue = JsValue::inline(ValueTag::Undefined, 0);
    pub const NULL: JsValue = JsValue::inline(ValueTag::Null, 0);
    pub const TRUE: JsValue = JsValue::inline(ValueTag::Bool, 1);
    pub const FALSE: JsValue = JsValue::inline(ValueTag::Bool, 0);
    pub const EXCEPTION: JsValue = JsValue::inline(ValueTag::Exception, 0);

    const fn inline(tag: ValueTag, payload: u64) -> Self {
        Self {
            payload,
            tag: tag as i64,
        }
    }

    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    pub fn from_i32(i: i32) -> Self {
        Self::inline(ValueTag::Int, i as i64 as u64)
    }

    pub fn from_f64(f: f64) -> Self {
        Self::inline(ValueTag::Float64, f.to_bits())
    }

    pub(crate) fn from_id(tag: ValueTag, id: ValueId) -> Self {
        debug_assert!(tag.is_reference());
        Self::inline(tag, id.to_bits())
    }

    /// Decode the tag, rejecting records that were not produced by this crate
    pub fn kind(&self) -> Result<ValueTag> {
        ValueTag::try_from(self.tag)
    }

    pub fn is_exception(&self) -> bool {
        self.tag == ValueTag::Exception as i64
    }

    /// Table slot referenced by this record, if it is a reference value
    pub fn id(&self) -> Option<ValueId> {
        match self.kind() {
            Ok(tag) if tag.is_reference() => Some(ValueId::from_bits(self.payload)),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        (self.tag == ValueTag::Int as i64).then_some(self.payload as u32 as i32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        (self.tag == ValueTag::Bool as i64).then_some(self.payload != 0)
    }

    pub fn as_f64(&self) -> Option<f64> {
        (self.tag == ValueTag::Float64 as i64).then_some(f64::from_bits(self.payload))
    }
}

/// Generational index into a [`ValueTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId {
    index: u32,
    generation: u32,
}

impl ValueId {
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slab of live engine values owned by one handle
pub struct ValueTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> ValueTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> ValueId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ValueId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        ValueId {
            index,
            generation: 1,
        }
    }

    fn slot(&self, id: ValueId) -> Result<&Slot<T>> {
        let slot = self
            .slots
            .get(id.index as usize)
            .ok_or(ShimError::UnknownValue { id: id.to_bits() })?;
        if id.generation == 0 || id.generation > slot.generation {
            return Err(ShimError::UnknownValue { id: id.to_bits() });
        }
        if slot.generation != id.generation || slot.value.is_none() {
            return Err(ShimError::ReleasedValue { id: id.to_bits() });
        }
        Ok(slot)
    }

    pub fn get(&self, id: ValueId) -> Result<&T> {
        let slot = self.slot(id)?;
        slot.value
            .as_ref()
            .ok_or(ShimError::ReleasedValue { id: id.to_bits() })
    }

    pub fn remove(&mut self, id: ValueId) -> Result<T> {
        self.slot(id)?;
        let slot = &mut self.slots[id.index as usize];
        let value = slot
            .value
            .take()
            .ok_or(ShimError::ReleasedValue { id: id.to_bits() })?;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(value)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}

impl<T> Default for ValueTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
