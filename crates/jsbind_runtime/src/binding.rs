//! Host component <-> script instance binding with hot-reload rebind.

use std::any::Any;
use std::rc::Rc;

use jsbind_core::Value;

use crate::atoms::{Atom, WellKnownAtoms};
use crate::context::{Context, ErrorKind};
use crate::errors::{BridgeError, JsResult, messages};
use crate::object::{BridgeKind, FunctionKind};

/// Optional lifecycle methods looked up on the bound instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeSerialize,
    AfterDeserialize,
    BeforeScriptReload,
    AfterScriptReload,
    Reset,
}

impl Hook {
    pub const ALL: [Hook; 5] = [
        Hook::BeforeSerialize,
        Hook::AfterDeserialize,
        Hook::BeforeScriptReload,
        Hook::AfterScriptReload,
        Hook::Reset,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    fn atom(self, names: &WellKnownAtoms) -> Atom {
        match self {
            Hook::BeforeSerialize => names.before_serialize,
            Hook::AfterDeserialize => names.after_deserialize,
            Hook::BeforeScriptReload => names.before_script_reload,
            Hook::AfterScriptReload => names.after_script_reload,
            Hook::Reset => names.reset,
        }
    }
}

type Hooks = [Value; 5];

const NO_HOOKS: Hooks = [Value::UNDEFINED; 5];

/// A managed host component and the script object constructed for it.
pub struct ScriptInstance {
    managed: Rc<dyn Any>,
    this_obj: Value,
    hooks: Hooks,
}

impl ScriptInstance {
    pub fn new(managed: Rc<dyn Any>) -> Self {
        Self {
            managed,
            this_obj: Value::UNDEFINED,
            hooks: NO_HOOKS,
        }
    }

    pub fn managed(&self) -> &Rc<dyn Any> {
        &self.managed
    }

    /// Borrowed instance handle; undefined while unbound.
    pub fn instance(&self) -> Value {
        self.this_obj
    }

    pub fn is_bound(&self) -> bool {
        self.this_obj.is_object()
    }

    pub fn has_hook(&self, hook: Hook) -> bool {
        self.hooks[hook.slot()].is_object()
    }

    /// Constructs `ctor` against a bridge object tied to the managed
    /// component and returns an owned handle to it. Native-type constructors
    /// are not bound: the result is `undefined`.
    pub fn set_script_instance(&mut self, ctx: &mut Context, ctor: Value) -> Result<Value, BridgeError> {
        if !ctx.is_function(ctor) {
            let t = ctx.throw_error(ErrorKind::TypeError, messages::NOT_A_CONSTRUCTOR);
            return Err(ctx.catch(t));
        }
        if ctx.function_kind(ctor) == Some(FunctionKind::NativeType) {
            return Ok(Value::UNDEFINED);
        }
        if self.is_bound() {
            self.release(ctx);
        }
        let proto = ctx
            .get_property(ctor, ctx.well_known().prototype)
            .map_err(|t| ctx.catch(t))?;
        let handle = ctx.bind_bridge_object(&self.managed, proto, BridgeKind::ScriptInstance);
        ctx.free_value(proto);

        let hooks = match ctx.call(ctor, handle, &[]).and_then(|r| {
            ctx.free_value(r);
            collect_hooks(ctx, handle, None)
        }) {
            Ok(hooks) => hooks,
            Err(t) => {
                let err = ctx.catch(t);
                ctx.remove_managed(&self.managed);
                ctx.free_value(handle);
                return Err(err);
            }
        };
        self.this_obj = handle;
        self.hooks = hooks;
        Ok(ctx.dup_value(handle))
    }

    /// Invokes `hook` on the instance. `Ok(false)` when it is not defined.
    pub fn call_hook(&self, ctx: &mut Context, hook: Hook) -> Result<bool, BridgeError> {
        let f = self.hooks[hook.slot()];
        if !self.is_bound() || !f.is_object() {
            return Ok(false);
        }
        let r = ctx.call(f, self.this_obj, &[]).map_err(|t| ctx.catch(t))?;
        ctx.free_value(r);
        Ok(true)
    }

    /// Swaps the instance's prototype to `new_ctor.prototype` after a script
    /// reload, keeping the object's identity and bridge handle. Every check
    /// runs before anything is mutated; on failure the old binding is kept.
    pub fn rebind_on_reload(&mut self, ctx: &mut Context, new_ctor: Value) -> Result<bool, BridgeError> {
        if !self.is_bound() {
            return Ok(false);
        }
        match self.try_rebind(ctx, new_ctor) {
            Ok(()) => Ok(true),
            Err(t) => {
                let err = ctx.catch(t);
                log::error!("{}: script instance rebind failed: {err}", ctx.id());
                Err(err)
            }
        }
    }

    fn try_rebind(&mut self, ctx: &mut Context, new_ctor: Value) -> JsResult<()> {
        if !ctx.is_live(self.this_obj) {
            return Err(ctx.throw_error(ErrorKind::ReferenceError, messages::DETACHED_HANDLE));
        }
        if ctx.function_kind(new_ctor) != Some(FunctionKind::Plain) {
            return Err(ctx.throw_error(ErrorKind::TypeError, messages::NOT_A_CONSTRUCTOR));
        }
        let proto = ctx.get_property(new_ctor, ctx.well_known().prototype)?;
        if !proto.is_object() {
            ctx.free_value(proto);
            return Err(ctx.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT));
        }
        if let Err(t) = ctx.check_prototype(self.this_obj, proto) {
            ctx.free_value(proto);
            return Err(t);
        }
        let hooks = match collect_hooks(ctx, self.this_obj, Some(proto)) {
            Ok(h) => h,
            Err(t) => {
                ctx.free_value(proto);
                return Err(t);
            }
        };
        if let Err(t) = self.call_raw_hook(ctx, Hook::BeforeScriptReload) {
            ctx.free_values(&hooks);
            ctx.free_value(proto);
            return Err(t);
        }

        let swapped = ctx.set_prototype(self.this_obj, proto);
        ctx.free_value(proto);
        if let Err(t) = swapped {
            ctx.free_values(&hooks);
            return Err(t);
        }
        let old = std::mem::replace(&mut self.hooks, hooks);
        ctx.free_values(&old);

        if let Err(t) = self.call_raw_hook(ctx, Hook::AfterScriptReload) {
            let err = ctx.catch(t);
            log::error!("{}: {:?} hook failed: {err}", ctx.id(), Hook::AfterScriptReload);
        }
        Ok(())
    }

    fn call_raw_hook(&self, ctx: &mut Context, hook: Hook) -> JsResult<()> {
        let f = self.hooks[hook.slot()];
        if f.is_object() {
            let r = ctx.call(f, self.this_obj, &[])?;
            ctx.free_value(r);
        }
        Ok(())
    }

    /// The host component is going away: detach it from the object cache and
    /// drop this binding's references.
    pub fn release(&mut self, ctx: &mut Context) {
        let hooks = std::mem::replace(&mut self.hooks, NO_HOOKS);
        ctx.free_values(&hooks);
        if self.is_bound() {
            ctx.remove_managed(&self.managed);
            let handle = std::mem::replace(&mut self.this_obj, Value::UNDEFINED);
            ctx.free_value(handle);
        }
    }
}

/// Owned callable hooks. With `proto`, names are looked up as they will be
/// once `proto` is installed: own properties of `obj` first, then `proto`.
fn collect_hooks(ctx: &mut Context, obj: Value, proto: Option<Value>) -> JsResult<Hooks> {
    let names = *ctx.well_known();
    let mut hooks = NO_HOOKS;
    for hook in Hook::ALL {
        let atom = hook.atom(&names);
        let source = match proto {
            Some(p) if !ctx.has_own_property(obj, atom) => p,
            _ => obj,
        };
        let v = match ctx.get_property(source, atom) {
            Ok(v) => v,
            Err(t) => {
                ctx.free_values(&hooks);
                return Err(t);
            }
        };
        if ctx.is_function(v) {
            hooks[hook.slot()] = v;
        } else {
            ctx.free_value(v);
        }
    }
    Ok(hooks)
}
