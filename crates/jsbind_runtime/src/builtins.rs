//! Intrinsics every context gets: prototypes, cached constructors, the global
//! object and the host polyfills (`define`, timers, console, JSON).

use jsbind_core::Value;

use crate::config::EngineCapabilities;
use crate::context::{Context, ErrorKind};
use crate::errors::messages;
use crate::modules::DefinedModule;
use crate::object::{FunctionKind, ObjectClass, PropFlags};

/// Constructors cached at context creation so hosts can type-check values
/// without a global lookup.
#[derive(Clone, Copy, Debug)]
pub struct CachedConstructors {
    pub object: Value,
    pub number: Value,
    pub string: Value,
    pub function: Value,
    pub proxy: Value,
    pub array: Value,
    pub error: Value,
}

pub(crate) struct Builtins {
    pub(crate) object_proto: Value,
    pub(crate) function_proto: Value,
    pub(crate) array_proto: Value,
    pub(crate) error_proto: Value,
    pub(crate) global: Value,
    pub(crate) ctors: CachedConstructors,
}

impl Builtins {
    pub(crate) fn empty() -> Self {
        let u = Value::UNDEFINED;
        Self {
            object_proto: u,
            function_proto: u,
            array_proto: u,
            error_proto: u,
            global: u,
            ctors: CachedConstructors {
                object: u,
                number: u,
                string: u,
                function: u,
                proxy: u,
                array: u,
                error: u,
            },
        }
    }

    pub(crate) fn owned_values(&self) -> Vec<Value> {
        let c = &self.ctors;
        vec![
            c.object,
            c.number,
            c.string,
            c.function,
            c.proxy,
            c.array,
            c.error,
            self.global,
            self.error_proto,
            self.array_proto,
            self.function_proto,
            self.object_proto,
        ]
    }
}

const HIDDEN: PropFlags = PropFlags::CONFIGURABLE.union(PropFlags::WRITABLE);

pub(crate) fn install(ctx: &mut Context) {
    let object_proto = ctx.alloc_object(ObjectClass::Plain, Value::NULL);
    ctx.builtins.object_proto = object_proto;
    let function_proto = ctx.new_object();
    ctx.builtins.function_proto = function_proto;
    let array_proto = ctx.new_object();
    ctx.builtins.array_proto = array_proto;
    let error_proto = ctx.new_object();
    ctx.builtins.error_proto = error_proto;
    let name = ctx.new_string("Error");
    ctx.put_own(error_proto, ctx.names.name, name, HIDDEN);
    let message = ctx.new_string("");
    ctx.put_own(error_proto, ctx.names.message, message, HIDDEN);

    let global = ctx.new_object();
    ctx.builtins.global = global;

    let object = constructor(ctx, "Object", Some(object_proto), |ctx, _this, args| {
        match args.first() {
            Some(v) if v.is_object() => ctx.dup_value(*v),
            _ => ctx.new_object(),
        }
    });
    let number_proto = ctx.new_object();
    let number = constructor(ctx, "Number", Some(number_proto), |ctx, _this, args| {
        let Some(v) = args.first() else {
            return Value::from_i32(0);
        };
        match ctx.to_number(*v) {
            Ok(n) => Value::from_number(n),
            Err(_) => Value::EXCEPTION,
        }
    });
    ctx.free_value(number_proto);
    let string_proto = ctx.new_object();
    let string = constructor(ctx, "String", Some(string_proto), |ctx, _this, args| {
        let text = match args.first() {
            Some(v) => match ctx.to_rust_string(*v) {
                Ok(s) => s,
                Err(_) => return Value::EXCEPTION,
            },
            None => String::new(),
        };
        ctx.new_string(&text)
    });
    ctx.free_value(string_proto);
    let function = constructor(ctx, "Function", Some(function_proto), |ctx, _this, _args| {
        ctx.throw_error(ErrorKind::SyntaxError, messages::DYNAMIC_FUNCTION);
        Value::EXCEPTION
    });
    let proxy = constructor(ctx, "Proxy", None, |ctx, _this, _args| {
        ctx.throw_error(ErrorKind::TypeError, messages::PROXY_UNSUPPORTED);
        Value::EXCEPTION
    });
    let array = constructor(ctx, "Array", Some(array_proto), |ctx, _this, args| {
        let items = args.iter().map(|v| ctx.dup_value(*v)).collect();
        ctx.new_array_from(items)
    });
    let error = constructor(ctx, "Error", Some(error_proto), |ctx, _this, args| {
        let message = match args.first() {
            Some(v) if !v.is_undefined() => match ctx.to_rust_string(*v) {
                Ok(s) => s,
                Err(_) => return Value::EXCEPTION,
            },
            _ => String::new(),
        };
        ctx.new_error(ErrorKind::Error, &message)
    });
    ctx.builtins.ctors = CachedConstructors {
        object,
        number,
        string,
        function,
        proxy,
        array,
        error,
    };
    for (name, ctor) in [
        ("Object", object),
        ("Number", number),
        ("String", string),
        ("Function", function),
        ("Proxy", proxy),
        ("Array", array),
        ("Error", error),
    ] {
        let atom = ctx.get_atom(name);
        let ctor = ctx.dup_value(ctor);
        ctx.put_own(global, atom, ctor, HIDDEN);
    }
    let atom = ctx.get_atom("globalThis");
    let self_ref = ctx.dup_value(global);
    ctx.put_own(global, atom, self_ref, HIDDEN);

    install_define(ctx, global);
    install_json(ctx, global);
    if !ctx.config().provides(EngineCapabilities::TIMERS) {
        install_timers(ctx, global);
    }
    if !ctx.config().provides(EngineCapabilities::CONSOLE) {
        install_console(ctx, global);
    }
}

/// Native-type constructor wired to `proto` (borrowed) in both directions.
fn constructor(
    ctx: &mut Context,
    name: &str,
    proto: Option<Value>,
    func: impl Fn(&mut Context, Value, &[Value]) -> Value + 'static,
) -> Value {
    let ctor = ctx.new_function_with_kind(name, std::rc::Rc::new(func), FunctionKind::NativeType);
    if let Some(proto) = proto {
        let p = ctx.dup_value(proto);
        ctx.put_own(ctor, ctx.names.prototype, p, PropFlags::empty());
        let back = ctx.dup_value(ctor);
        ctx.put_own(proto, ctx.names.constructor, back, HIDDEN);
    }
    ctor
}

fn method(
    ctx: &mut Context,
    target: Value,
    name: &str,
    func: impl Fn(&mut Context, Value, &[Value]) -> Value + 'static,
) {
    let f = ctx.new_function(name, func);
    let atom = ctx.get_atom(name);
    ctx.put_own(target, atom, f, HIDDEN);
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).copied().unwrap_or(Value::UNDEFINED)
}

/// AMD-style `define(id, [deps], factory)`; the module is materialized on
/// first `require(id)`.
fn install_define(ctx: &mut Context, global: Value) {
    method(ctx, global, "define", |ctx, _this, args| {
        let (id, deps, factory) = match args.len() {
            0 | 1 => {
                ctx.throw_error(ErrorKind::TypeError, "define(id, [deps], factory): missing arguments");
                return Value::EXCEPTION;
            }
            2 => (args[0], Value::UNDEFINED, args[1]),
            _ => (args[0], args[1], args[2]),
        };
        let id = match ctx.to_rust_string(id) {
            Ok(s) => s,
            Err(_) => return Value::EXCEPTION,
        };
        let mut dep_ids = Vec::new();
        if let Some(len) = ctx.array_len(deps) {
            for i in 0..len {
                let item = match ctx.get_index(deps, i) {
                    Ok(v) => v,
                    Err(_) => return Value::EXCEPTION,
                };
                let s = ctx.to_rust_string(item);
                ctx.free_value(item);
                match s {
                    Ok(s) => dep_ids.push(s),
                    Err(_) => return Value::EXCEPTION,
                }
            }
        }
        let factory = ctx.dup_value(factory);
        log::trace!("define('{id}') with {} deps", dep_ids.len());
        if let Some(old) = ctx.defined_modules.insert(id, DefinedModule {
            deps: dep_ids,
            factory,
        }) {
            ctx.free_value(old.factory);
        }
        Value::UNDEFINED
    });
}

fn install_json(ctx: &mut Context, global: Value) {
    let json = ctx.new_object();
    method(ctx, json, "parse", |ctx, _this, args| {
        let text = match ctx.to_rust_string(arg(args, 0)) {
            Ok(s) => s,
            Err(_) => return Value::EXCEPTION,
        };
        ctx.parse_json(&text).unwrap_or(Value::EXCEPTION)
    });
    method(ctx, json, "stringify", |ctx, _this, args| match ctx.to_json(arg(args, 0)) {
        Ok(Some(s)) => ctx.new_string(&s),
        Ok(None) => Value::UNDEFINED,
        Err(_) => Value::EXCEPTION,
    });
    let atom = ctx.get_atom("JSON");
    ctx.put_own(global, atom, json, HIDDEN);
}

fn install_timers(ctx: &mut Context, global: Value) {
    fn schedule(ctx: &mut Context, args: &[Value], repeat: bool) -> Value {
        let callback = arg(args, 0);
        if !ctx.is_function(callback) {
            ctx.throw_error(ErrorKind::TypeError, messages::NOT_A_FUNCTION);
            return Value::EXCEPTION;
        }
        let delay = match arg(args, 1) {
            d if d.is_undefined() => 0.0,
            d => match ctx.to_number(d) {
                Ok(n) => n,
                Err(_) => return Value::EXCEPTION,
            },
        };
        let id = if repeat {
            ctx.set_interval(callback, delay)
        } else {
            ctx.set_timeout(callback, delay)
        };
        Value::from_number(id as f64)
    }
    fn clear(ctx: &mut Context, args: &[Value]) -> Value {
        if let Some(id) = arg(args, 0).as_number() {
            if id >= 0.0 && id.fract() == 0.0 {
                ctx.clear_timer(id as u32);
            }
        }
        Value::UNDEFINED
    }
    method(ctx, global, "setTimeout", |ctx, _this, args| schedule(ctx, args, false));
    method(ctx, global, "setInterval", |ctx, _this, args| schedule(ctx, args, true));
    method(ctx, global, "clearTimeout", |ctx, _this, args| clear(ctx, args));
    method(ctx, global, "clearInterval", |ctx, _this, args| clear(ctx, args));
}

fn install_console(ctx: &mut Context, global: Value) {
    fn line(ctx: &mut Context, args: &[Value]) -> Option<String> {
        let mut parts = Vec::with_capacity(args.len());
        for v in args {
            parts.push(ctx.to_rust_string(*v).ok()?);
        }
        Some(parts.join(" "))
    }
    let console = ctx.new_object();
    let levels = [
        ("log", log::Level::Info),
        ("info", log::Level::Info),
        ("debug", log::Level::Debug),
        ("warn", log::Level::Warn),
        ("error", log::Level::Error),
    ];
    for (name, level) in levels {
        method(ctx, console, name, move |ctx, _this, args| match line(ctx, args) {
            Some(text) => {
                log::log!(target: "jsbind::console", level, "{text}");
                Value::UNDEFINED
            }
            None => Value::EXCEPTION,
        });
    }
    let atom = ctx.get_atom("console");
    ctx.put_own(global, atom, console, HIDDEN);
}
