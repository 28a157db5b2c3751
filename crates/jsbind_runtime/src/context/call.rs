use std::rc::Rc;

use jsbind_core::Value;

use super::{Context, ErrorKind};
use crate::errors::{BridgeError, JsResult, messages};
use crate::object::{FunctionKind, HostFn, ObjectClass, PropFlags};

impl Context {
    pub fn new_function(
        &mut self,
        name: &str,
        func: impl Fn(&mut Context, Value, &[Value]) -> Value + 'static,
    ) -> Value {
        self.new_function_with_kind(name, Rc::new(func), FunctionKind::Plain)
    }

    /// Constructor backed by a host type. Gets a fresh `prototype` object
    /// whose `constructor` points back at the function.
    pub fn new_native_constructor(
        &mut self,
        name: &str,
        func: impl Fn(&mut Context, Value, &[Value]) -> Value + 'static,
    ) -> Value {
        let ctor = self.new_function_with_kind(name, Rc::new(func), FunctionKind::NativeType);
        self.attach_prototype(ctor);
        ctor
    }

    /// Script-style class: a plain function with its own `prototype` object.
    pub fn new_class(
        &mut self,
        name: &str,
        func: impl Fn(&mut Context, Value, &[Value]) -> Value + 'static,
    ) -> Value {
        let ctor = self.new_function_with_kind(name, Rc::new(func), FunctionKind::Plain);
        self.attach_prototype(ctor);
        ctor
    }

    pub(crate) fn new_function_with_kind(&mut self, name: &str, func: HostFn, kind: FunctionKind) -> Value {
        let proto = self.dup_value(self.builtins.function_proto);
        self.alloc_object(
            ObjectClass::Function {
                name: Rc::from(name),
                func,
                kind,
            },
            proto,
        )
    }

    fn attach_prototype(&mut self, ctor: Value) {
        let proto = self.new_object();
        let back = self.dup_value(ctor);
        self.put_own(proto, self.names.constructor, back, PropFlags::CONFIGURABLE | PropFlags::WRITABLE);
        self.put_own(ctor, self.names.prototype, proto, PropFlags::WRITABLE);
    }

    /// Engine-level call. Returns an owned value or `Value::EXCEPTION` with
    /// the exception pending on the context.
    pub fn call_raw(&mut self, func: Value, this: Value, args: &[Value]) -> Value {
        let (name, body) = match self.obj(func).map(|o| &o.class) {
            Some(ObjectClass::Function { name, func, .. }) => (name.clone(), func.clone()),
            _ => {
                self.throw_error(ErrorKind::TypeError, messages::NOT_A_FUNCTION);
                return Value::EXCEPTION;
            }
        };
        if self.poll_interrupt() {
            self.throw_error(ErrorKind::InternalError, messages::INTERRUPTED);
            return Value::EXCEPTION;
        }
        if self.call_stack.len() >= self.shared.config.max_call_depth {
            self.throw_error(ErrorKind::RangeError, messages::STACK_OVERFLOW);
            return Value::EXCEPTION;
        }
        self.call_stack.push(name.clone());
        let result = body(self, this, args);
        self.call_stack.pop();
        if result.is_exception() && self.pending_exception.is_none() {
            let msg = format!("{name} returned an exception without throwing");
            self.throw_error(ErrorKind::InternalError, &msg);
        }
        result
    }

    pub fn call(&mut self, func: Value, this: Value, args: &[Value]) -> JsResult<Value> {
        let r = self.call_raw(func, this, args);
        self.check(r)
    }

    /// `new ctor(...args)`. The instance inherits from `ctor.prototype`.
    pub fn call_constructor(&mut self, ctor: Value, args: &[Value]) -> JsResult<Value> {
        if !self.is_function(ctor) {
            return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_A_CONSTRUCTOR));
        }
        let proto = self.get_property(ctor, self.names.prototype)?;
        let instance = self.new_object_with_proto(if proto.is_object() {
            proto
        } else {
            self.builtins.object_proto
        });
        self.free_value(proto);
        let r = match self.call(ctor, instance, args) {
            Ok(r) => r,
            Err(t) => {
                self.free_value(instance);
                return Err(t);
            }
        };
        if r.is_object() {
            self.free_value(instance);
            Ok(r)
        } else {
            self.free_value(r);
            Ok(instance)
        }
    }

    /// Current script call depth.
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Compiles and runs a standalone script with `this` bound to the global
    /// object. Returns the owned completion value.
    pub fn eval_script(&mut self, filename: &str, source: &str) -> Result<Value, BridgeError> {
        let Some(frontend) = self.frontend() else {
            return Err(BridgeError::FrontendMissing(self.runtime_id()));
        };
        let body = frontend
            .compile_module(self, filename, source)
            .map_err(|t| self.catch(t))?;
        let global = self.global_object();
        let r = self.call(body, global, &[]);
        self.free_value(body);
        r.map_err(|t| self.catch(t))
    }
}
