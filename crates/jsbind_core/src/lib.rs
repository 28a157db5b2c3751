//! Core types for the jsbind bridge.
//!
//! This crate contains the fundamental types that carry no engine semantics:
//! - `Value` - NaN-boxed engine value handle
//! - `RcHeap` - refcounted slot arena shared by values and atoms
//! - `Capabilities` - host capability traits (FileSystem, PathResolver, Clock)

#![allow(clippy::new_without_default)]

pub mod capabilities;
pub mod heap;
pub mod value;

pub use capabilities::{
    Capabilities, Clock, FileSystem, PathResolver, SearchPathResolver, StdFileSystem, SystemClock,
};
pub use heap::{FastHashMap, HeapError, RcHeap, RefOutcome, SlotId, fast_hasher, fast_map_new};
pub use value::{Tag, Value};
