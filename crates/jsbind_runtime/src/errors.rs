//! Error types and common error message constants used throughout the runtime.

use jsbind_core::HeapError;

use crate::registry::{ContextId, RuntimeId};

pub mod messages {
    pub const NOT_A_FUNCTION: &str = "not a function";
    pub const NOT_AN_OBJECT: &str = "not an object";
    pub const NOT_A_CONSTRUCTOR: &str = "not a constructor";
    pub const READ_OF_NULLISH: &str = "cannot read property of null or undefined";
    pub const WRITE_OF_NULLISH: &str = "cannot set property of null or undefined";
    pub const READ_ONLY: &str = "property is read-only";
    pub const NOT_CONFIGURABLE: &str = "property is not configurable";
    pub const PROTOTYPE_CYCLE: &str = "cyclic prototype chain";
    pub const STACK_OVERFLOW: &str = "Maximum call stack size exceeded";
    pub const INTERRUPTED: &str = "interrupted";
    pub const FRONTEND_MISSING: &str = "Runtime frontend is not configured";
    pub const BYTECODE_UNSUPPORTED: &str = "bytecode is not supported by this frontend";
    pub const DYNAMIC_FUNCTION: &str = "dynamic function compilation is not supported";
    pub const PROXY_UNSUPPORTED: &str = "Proxy is not supported by this backend";
    pub const ARRAY_TOO_LARGE: &str = "array length exceeds dense storage limit";
    pub const DETACHED_HANDLE: &str = "handle is no longer live";
}

/// Marker for "a script exception is pending on the context".
///
/// This is the Rust spelling of returning the tagged exception value: the
/// thrown value itself stays on the context until it is taken or caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown;

pub type JsResult<T> = Result<T, Thrown>;

/// A script exception converted for host-side callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct JsError {
    pub name: String,
    pub message: String,
    pub stack: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("invalid runtime id {0}")]
    InvalidRuntime(RuntimeId),
    #[error("invalid context id {0}")]
    InvalidContext(ContextId),
    #[error("runtime {0} is disposing")]
    RuntimeDisposed(RuntimeId),
    #[error("Cannot find module '{id}' (from '{parent}')")]
    ModuleNotFound { parent: String, id: String },
    #[error("invalid module '{id}': {reason}")]
    InvalidModule { id: String, reason: String },
    #[error("{0}: {FRONTEND_MISSING}", FRONTEND_MISSING = messages::FRONTEND_MISSING)]
    FrontendMissing(RuntimeId),
    #[error("invalid config: {0}")]
    Config(String),
    #[error(transparent)]
    Script(#[from] JsError),
}

impl BridgeError {
    /// Script-side stack trace, when the error came from a script exception.
    pub fn stack(&self) -> Option<&str> {
        match self {
            BridgeError::Script(e) => Some(e.stack.as_str()),
            _ => None,
        }
    }
}
