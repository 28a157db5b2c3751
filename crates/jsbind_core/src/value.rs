//! Engine value representation.
//!
//! A `Value` is a NaN-boxed handle: every bit pattern that is not a tagged
//! quiet NaN is an `f64`, everything else carries a 3-bit tag and a 48-bit
//! payload. Heap-backed values (strings, objects) carry a slot id; copying a
//! `Value` does not copy the slot, so each copy that is kept must be released
//! on its own.

use crate::heap::SlotId;
use std::fmt;

// NaN-Boxing constants
pub const QNAN: u64 = 0x7ff8000000000000;
pub const TAG_BASE: u64 = 0xfff8000000000000;
pub const TAG_MASK: u64 = 0x0007000000000000;
pub const PAYLOAD_MASK: u64 = 0x0000ffffffffffff;

pub const TAG_INT: u64 = 0x0001;
pub const TAG_BOOL: u64 = 0x0002;
pub const TAG_NULL: u64 = 0x0003;
pub const TAG_UNDEFINED: u64 = 0x0004;
pub const TAG_EXCEPTION: u64 = 0x0005;
pub const TAG_STRING: u64 = 0x0006;
pub const TAG_OBJECT: u64 = 0x0007;

/// Decoded tag of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Int,
    Bool,
    Null,
    Undefined,
    Float64,
    String,
    Object,
    Exception,
}

/// Engine value. Equality is tag + payload equality, never structural.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Default for Value {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl Value {
    pub const UNDEFINED: Value = Value(TAG_BASE | (TAG_UNDEFINED << 48));
    pub const NULL: Value = Value(TAG_BASE | (TAG_NULL << 48));
    pub const TRUE: Value = Value(TAG_BASE | (TAG_BOOL << 48) | 1);
    pub const FALSE: Value = Value(TAG_BASE | (TAG_BOOL << 48));
    /// Sentinel returned by low-level calls when a script exception is pending.
    pub const EXCEPTION: Value = Value(TAG_BASE | (TAG_EXCEPTION << 48));

    #[inline(always)]
    pub fn from_f64(f: f64) -> Self {
        // Every NaN collapses to one pattern so it never aliases a tag
        if f.is_nan() {
            return Self(QNAN);
        }
        Self(f.to_bits())
    }

    #[inline(always)]
    pub fn from_i32(i: i32) -> Self {
        Self(TAG_BASE | (TAG_INT << 48) | (i as u32 as u64))
    }

    #[inline(always)]
    pub fn from_bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    /// Integer when the number is an exact i32 (and not -0), float otherwise.
    pub fn from_number(f: f64) -> Self {
        if f.fract() == 0.0
            && f >= i32::MIN as f64
            && f <= i32::MAX as f64
            && !(f == 0.0 && f.is_sign_negative())
        {
            Self::from_i32(f as i32)
        } else {
            Self::from_f64(f)
        }
    }

    #[inline(always)]
    fn from_slot(tag: u64, id: SlotId) -> Self {
        Self(TAG_BASE | (tag << 48) | (id.0 & PAYLOAD_MASK))
    }

    pub fn string(id: SlotId) -> Self {
        Self::from_slot(TAG_STRING, id)
    }

    pub fn object(id: SlotId) -> Self {
        Self::from_slot(TAG_OBJECT, id)
    }

    /// Raw bits, as passed across the native boundary.
    #[inline(always)]
    pub fn to_bits(self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub fn is_f64(&self) -> bool {
        (self.0 & TAG_BASE) != TAG_BASE || self.raw_tag() == 0
    }

    #[inline(always)]
    fn raw_tag(&self) -> u64 {
        (self.0 & TAG_MASK) >> 48
    }

    #[inline(always)]
    fn has_tag(&self, tag: u64) -> bool {
        (self.0 & TAG_BASE) == TAG_BASE && self.raw_tag() == tag
    }

    pub fn tag(&self) -> Tag {
        if self.is_f64() {
            return Tag::Float64;
        }
        match self.raw_tag() {
            TAG_INT => Tag::Int,
            TAG_BOOL => Tag::Bool,
            TAG_NULL => Tag::Null,
            TAG_UNDEFINED => Tag::Undefined,
            TAG_EXCEPTION => Tag::Exception,
            TAG_STRING => Tag::String,
            _ => Tag::Object,
        }
    }

    #[inline(always)]
    pub fn is_int(&self) -> bool {
        self.has_tag(TAG_INT)
    }
    #[inline(always)]
    pub fn is_bool(&self) -> bool {
        self.has_tag(TAG_BOOL)
    }
    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.has_tag(TAG_NULL)
    }
    #[inline(always)]
    pub fn is_undefined(&self) -> bool {
        self.has_tag(TAG_UNDEFINED)
    }
    #[inline(always)]
    pub fn is_nullish(&self) -> bool {
        self.is_null() || self.is_undefined()
    }
    #[inline(always)]
    pub fn is_exception(&self) -> bool {
        self.has_tag(TAG_EXCEPTION)
    }
    #[inline(always)]
    pub fn is_string(&self) -> bool {
        self.has_tag(TAG_STRING)
    }
    #[inline(always)]
    pub fn is_object(&self) -> bool {
        self.has_tag(TAG_OBJECT)
    }
    #[inline(always)]
    pub fn is_number(&self) -> bool {
        self.is_int() || self.is_f64()
    }

    /// True for values that address a heap slot and need dup/free pairing.
    #[inline(always)]
    pub fn has_ref_count(&self) -> bool {
        self.is_string() || self.is_object()
    }

    #[inline(always)]
    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    #[inline(always)]
    pub fn as_i32(&self) -> i32 {
        (self.0 & 0xffff_ffff) as u32 as i32
    }

    #[inline(always)]
    pub fn as_bool(&self) -> bool {
        (self.0 & 1) != 0
    }

    /// Numeric view of an int or float value.
    pub fn as_number(&self) -> Option<f64> {
        if self.is_int() {
            Some(self.as_i32() as f64)
        } else if self.is_f64() {
            Some(self.as_f64())
        } else {
            None
        }
    }

    pub fn slot(&self) -> Option<SlotId> {
        if self.has_ref_count() {
            Some(SlotId(self.0 & PAYLOAD_MASK))
        } else {
            None
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.tag() {
            Tag::Int | Tag::Float64 => "number",
            Tag::Bool => "boolean",
            Tag::Null => "null",
            Tag::Undefined => "undefined",
            Tag::String => "string",
            Tag::Object => "object",
            Tag::Exception => "exception",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag() {
            Tag::Float64 => write!(f, "Float({})", self.as_f64()),
            Tag::Int => write!(f, "Int({})", self.as_i32()),
            Tag::Bool => write!(f, "Bool({})", self.as_bool()),
            Tag::Null => write!(f, "Null"),
            Tag::Undefined => write!(f, "Undefined"),
            Tag::Exception => write!(f, "Exception"),
            Tag::String => write!(f, "String(slot={})", (self.0 & PAYLOAD_MASK)),
            Tag::Object => write!(f, "Object(slot={})", (self.0 & PAYLOAD_MASK)),
        }
    }
}
