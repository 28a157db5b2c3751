use jsbind_core::Value;

use super::Context;
use crate::atoms::Atom;
use crate::errors::{BridgeError, JsError, JsResult, Thrown};
use crate::object::{ObjectClass, PropFlags};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    InternalError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl Context {
    /// Makes `value` (owned) the pending exception.
    pub fn throw(&mut self, value: Value) -> Thrown {
        if let Some(prev) = self.pending_exception.replace(value) {
            self.free_value(prev);
        }
        Thrown
    }

    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Thrown {
        let err = self.new_error(kind, message);
        self.throw(err)
    }

    /// Error object carrying `name`, `message` and the current script stack.
    pub fn new_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let proto = self.dup_value(self.builtins.error_proto);
        let err = self.alloc_object(ObjectClass::Error, proto);
        let flags = PropFlags::CONFIGURABLE | PropFlags::WRITABLE;
        let name = self.new_string(kind.name());
        self.put_own(err, self.names.name, name, flags);
        let message = self.new_string(message);
        self.put_own(err, self.names.message, message, flags);
        let stack = self.stack_trace();
        let stack = self.new_string(&stack);
        self.put_own(err, self.names.stack, stack, flags);
        err
    }

    fn stack_trace(&self) -> String {
        let mut out = String::new();
        for frame in self.call_stack.iter().rev() {
            out.push_str("    at ");
            out.push_str(if frame.is_empty() { "<anonymous>" } else { frame });
            out.push('\n');
        }
        out
    }

    pub fn has_exception(&self) -> bool {
        self.pending_exception.is_some()
    }

    /// Owned pending exception, or null when nothing is pending.
    pub fn take_exception(&mut self) -> Value {
        self.pending_exception.take().unwrap_or(Value::NULL)
    }

    /// Converts the tagged exception sentinel back into a `JsResult`.
    pub fn check(&mut self, v: Value) -> JsResult<Value> {
        if v.is_exception() { Err(Thrown) } else { Ok(v) }
    }

    /// Takes the pending exception as a host error.
    pub fn catch(&mut self, _thrown: Thrown) -> BridgeError {
        match self.take_js_error() {
            Some(e) => BridgeError::Script(e),
            None => BridgeError::Script(JsError {
                name: "InternalError".to_string(),
                message: "no exception pending".to_string(),
                stack: String::new(),
            }),
        }
    }

    pub fn take_js_error(&mut self) -> Option<JsError> {
        let exc = self.pending_exception.take()?;
        let err = self.error_from_value(exc);
        self.free_value(exc);
        Some(err)
    }

    /// Reads name, message and stack off a thrown value. Stack text goes
    /// through the source-map hook when one is installed.
    pub(crate) fn error_from_value(&mut self, v: Value) -> JsError {
        let saved = self.pending_exception.take();
        let err = if v.is_object() {
            let name = self.read_string_prop(v, self.names.name);
            let message = self.read_string_prop(v, self.names.message);
            let stack = self.read_string_prop(v, self.names.stack);
            JsError {
                name: name.unwrap_or_else(|| "Error".to_string()),
                message: message.unwrap_or_default(),
                stack: self.map_stack(&stack.unwrap_or_default()),
            }
        } else {
            JsError {
                name: "Error".to_string(),
                message: self.to_rust_string(v).unwrap_or_default(),
                stack: String::new(),
            }
        };
        // Errors raised while reading the error are dropped.
        if let Some(nested) = self.pending_exception.take() {
            self.free_value(nested);
        }
        self.pending_exception = saved;
        err
    }

    fn read_string_prop(&mut self, obj: Value, atom: Atom) -> Option<String> {
        let v = self.get_property(obj, atom).ok()?;
        let s = if v.is_undefined() {
            None
        } else {
            self.to_rust_string(v).ok()
        };
        self.free_value(v);
        s
    }
}
