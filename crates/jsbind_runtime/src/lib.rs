//! jsbind runtime: the bridge between a host application and an embedded
//! script engine.
//!
//! The bridge owns the value heap, the atom table, the object cache and the
//! CommonJS module system of every context. Script compilation is delegated
//! to a pluggable `Frontend`.

#![allow(clippy::collapsible_if)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::unnecessary_cast)]

pub mod atoms;
pub mod binding;
mod builtins;
pub mod config;
pub mod context;
pub mod errors;
pub mod frontend;
pub mod jobs;
pub mod modules;
pub mod object;
pub mod object_cache;
pub mod registry;
pub mod scope;
mod timers;

pub use atoms::{Atom, AtomCache, AtomTable, WellKnownAtoms};
pub use binding::{Hook, ScriptInstance};
pub use builtins::CachedConstructors;
pub use config::{EngineCapabilities, EngineKind, RuntimeConfig};
pub use context::{Context, ContextState, ErrorKind, HeapStats};
pub use errors::{BridgeError, JsError, JsResult, Thrown};
pub use frontend::{Frontend, decode_bytecode, encode_bytecode};
pub use jobs::{JobId, JobSender, PumpStats};
pub use modules::{ModuleIndex, ModuleResolver, ModuleState, ReloadReport};
pub use object::{BridgeKind, FunctionKind, HostFn, PayloadHeader, PropFlags};
pub use registry::{ContextId, FinalizerCallback, Registry, RuntimeId, RuntimeState};
pub use scope::Scope;

pub use jsbind_core::{Capabilities, Clock, FileSystem, PathResolver, Value};
