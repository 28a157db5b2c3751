//! Native-side object model stored in the context heap.

use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use jsbind_core::Value;

use crate::atoms::Atom;
use crate::context::Context;

bitflags! {
    /// Property attribute bits plus the "has X" presence bits used by
    /// `define_property` to tell which attributes the caller supplied.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PropFlags: u32 {
        const CONFIGURABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const ENUMERABLE = 1 << 2;
        const C_W_E = Self::CONFIGURABLE.bits() | Self::WRITABLE.bits() | Self::ENUMERABLE.bits();

        const HAS_CONFIGURABLE = 1 << 8;
        const HAS_WRITABLE = 1 << 9;
        const HAS_ENUMERABLE = 1 << 10;
        const HAS_GET = 1 << 11;
        const HAS_SET = 1 << 12;
        const HAS_VALUE = 1 << 13;
    }
}

impl PropFlags {
    pub(crate) fn attributes(self) -> PropFlags {
        self & PropFlags::C_W_E
    }
}

/// Host callable: `(ctx, this, args) -> value`. Arguments and `this` are
/// borrowed; the returned value is owned by the caller. Returning
/// `Value::EXCEPTION` means an exception is pending on the context.
pub type HostFn = Rc<dyn Fn(&mut Context, Value, &[Value]) -> Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// An ordinary script-level function or class.
    Plain,
    /// A constructor backed by a host type; instances carry host payloads.
    NativeType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BridgeKind {
    Object,
    ScriptInstance,
}

/// Opaque identifier a bridge object carries back to its managed object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PayloadHeader {
    pub kind: BridgeKind,
    pub object_id: u32,
}

pub enum ObjectClass {
    Plain,
    Array(Vec<Value>),
    Error,
    Function {
        name: Rc<str>,
        func: HostFn,
        kind: FunctionKind,
    },
    Bridge(PayloadHeader),
}

pub enum Property {
    Data { value: Value, flags: PropFlags },
    Accessor {
        getter: Value,
        setter: Value,
        flags: PropFlags,
    },
}

impl Property {
    pub fn flags(&self) -> PropFlags {
        match self {
            Property::Data { flags, .. } | Property::Accessor { flags, .. } => *flags,
        }
    }

    pub(crate) fn values(&self) -> [Value; 2] {
        match self {
            Property::Data { value, .. } => [*value, Value::UNDEFINED],
            Property::Accessor { getter, setter, .. } => [*getter, *setter],
        }
    }
}

pub struct JsObject {
    pub(crate) class: ObjectClass,
    pub(crate) proto: Value,
    pub(crate) props: IndexMap<Atom, Property, ahash::RandomState>,
}

impl JsObject {
    pub(crate) fn new(class: ObjectClass, proto: Value) -> Self {
        Self {
            class,
            proto,
            props: IndexMap::with_hasher(jsbind_core::fast_hasher()),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.class, ObjectClass::Function { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self.class, ObjectClass::Array(_))
    }

    pub fn payload_header(&self) -> Option<PayloadHeader> {
        match self.class {
            ObjectClass::Bridge(h) => Some(h),
            _ => None,
        }
    }

    /// Every value this object holds a reference to.
    pub(crate) fn owned_values(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.props.len() + 1);
        out.push(self.proto);
        if let ObjectClass::Array(items) = &self.class {
            out.extend(items.iter().copied());
        }
        for prop in self.props.values() {
            out.extend(prop.values());
        }
        out
    }
}

/// Payload of an engine heap slot.
pub enum HeapObject {
    String(Rc<str>),
    Object(JsObject),
}
