mod common;

use common::{Harness, get_number, get_string};
use jsbind_runtime::{ErrorKind, PropFlags, Value};

#[test]
fn get_atom_is_memoized() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let a = ctx.get_atom("speed");
    let b = ctx.get_atom("speed");
    assert_eq!(a, b);
    assert_eq!(ctx.atom_to_string(a).as_deref(), Some("speed"));
    // The cache holds exactly one reference per name.
    assert_eq!(ctx.atom_ref_count(a), Some(1));
}

#[test]
fn new_atom_is_refcounted() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let a = ctx.new_atom("scratch_name");
    let b = ctx.new_atom("scratch_name");
    assert_eq!(a, b);
    assert_eq!(ctx.atom_ref_count(a), Some(2));
    ctx.free_atom(a);
    assert_eq!(ctx.atom_to_string(b).as_deref(), Some("scratch_name"));
    ctx.free_atom(b);
    assert_eq!(ctx.atom_to_string(a), None);
    assert_eq!(ctx.heap_stats().abi_violations, 0);
}

#[test]
fn strings_from_host_bytes() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let v = ctx.new_string_from_bytes(b"hello\0");
    assert_eq!(ctx.to_rust_string(v).unwrap(), "hello");
    assert_eq!(ctx.to_cstring_bytes(v).unwrap(), b"hello\0".to_vec());
    let len = ctx.get_property_str(v, "length").unwrap();
    assert_eq!(len.as_number(), Some(5.0));
    ctx.free_value(v);

    let bad = ctx.new_string_from_bytes(&[0x61, 0xff, 0x62]);
    assert_eq!(ctx.to_rust_string(bad).unwrap(), "a\u{fffd}b");
    ctx.free_value(bad);
}

#[test]
fn free_cascades_through_object_graph() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let before = ctx.heap_stats().live_slots;
    let outer = ctx.new_object();
    let inner = ctx.new_array();
    let s = ctx.new_string("leaf");
    ctx.push_element(inner, s).unwrap();
    ctx.set_property_str(outer, "items", inner).unwrap();
    assert_eq!(ctx.heap_stats().live_slots, before + 3);

    ctx.free_value(outer);
    assert_eq!(ctx.heap_stats().live_slots, before);
    assert!(!ctx.is_live(inner));
    assert_eq!(ctx.heap_stats().abi_violations, 0);
}

#[test]
fn double_free_is_reported_not_fatal() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let obj = ctx.new_object();
    ctx.free_value(obj);
    ctx.free_value(obj);
    assert_eq!(ctx.heap_stats().abi_violations, 1);
    let again = ctx.dup_value(obj);
    assert_eq!(again, obj);
    assert_eq!(ctx.heap_stats().abi_violations, 2);
}

#[test]
fn dup_and_free_balance() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let obj = ctx.new_object();
    ctx.dup_value(obj);
    assert_eq!(ctx.ref_count_of(obj), Some(2));
    ctx.free_value(obj);
    assert_eq!(ctx.ref_count_of(obj), Some(1));
    ctx.free_value(obj);
    assert_eq!(ctx.ref_count_of(obj), None);
    // Primitives carry no count.
    assert_eq!(ctx.ref_count_of(Value::from_i32(3)), None);
}

#[test]
fn properties_follow_prototype_chain() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let base = ctx.new_object();
    ctx.set_property_str(base, "kind", Value::from_i32(7)).unwrap();
    let derived = ctx.new_object_with_proto(base);
    assert_eq!(get_number(ctx, derived, "kind"), 7.0);
    let kind = ctx.get_atom("kind");
    assert!(ctx.has_property(derived, kind));
    assert!(!ctx.has_own_property(derived, kind));

    // Writes shadow instead of touching the prototype.
    ctx.set_property_str(derived, "kind", Value::from_i32(9)).unwrap();
    assert_eq!(get_number(ctx, derived, "kind"), 9.0);
    assert_eq!(get_number(ctx, base, "kind"), 7.0);

    let proto = ctx.get_prototype(derived).unwrap();
    assert_eq!(proto, base);
    ctx.free_values(&[proto, derived, base]);
}

#[test]
fn read_only_property_rejects_writes() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let obj = ctx.new_object();
    let atom = ctx.get_atom("fixed");
    ctx.define_property_value(obj, atom, Value::from_i32(1), PropFlags::ENUMERABLE)
        .unwrap();
    assert!(ctx.set_property(obj, atom, Value::from_i32(2)).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "TypeError", "{err:?}");
    assert_eq!(get_number(ctx, obj, "fixed"), 1.0);

    // Non-configurable: cannot be deleted or redefined as an accessor.
    assert!(!ctx.delete_property(obj, atom).unwrap());
    let getter = ctx.new_function("get fixed", |_ctx, _this, _args| Value::from_i32(5));
    let r = ctx.define_property_getset(obj, atom, getter, Value::UNDEFINED, PropFlags::ENUMERABLE);
    assert!(r.is_err());
    assert!(ctx.has_exception());
    let exc = ctx.take_exception();
    assert!(ctx.is_error(exc));
    ctx.free_value(exc);
    ctx.free_value(obj);
    assert_eq!(ctx.heap_stats().abi_violations, 0);
}

#[test]
fn accessor_properties_call_getter_and_setter() {
    use std::cell::Cell;
    use std::rc::Rc;

    let mut h = Harness::new();
    let ctx = h.ctx();
    let stored = Rc::new(Cell::new(0.0));
    let obj = ctx.new_object();
    let read = stored.clone();
    let getter = ctx.new_function("get level", move |_ctx, _this, _args| {
        Value::from_number(read.get())
    });
    let write = stored.clone();
    let setter = ctx.new_function("set level", move |_ctx, _this, args| {
        write.set(args.first().and_then(|v| v.as_number()).unwrap_or(f64::NAN));
        Value::UNDEFINED
    });
    let atom = ctx.get_atom("level");
    ctx.define_property_getset(obj, atom, getter, setter, PropFlags::C_W_E)
        .unwrap();
    ctx.set_property(obj, atom, Value::from_i32(4)).unwrap();
    assert_eq!(stored.get(), 4.0);
    assert_eq!(get_number(ctx, obj, "level"), 4.0);
    ctx.free_value(obj);
}

#[test]
fn error_to_string_releases_name_when_message_getter_throws() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let err = ctx.new_error(ErrorKind::TypeError, "original");
    let name = ctx.get_property_str(err, "name").unwrap();
    let before = ctx.ref_count_of(name);

    let getter = ctx.new_function("get message", |ctx, _this, _args| {
        ctx.throw_error(ErrorKind::Error, "no message for you");
        Value::EXCEPTION
    });
    let message = ctx.get_atom("message");
    ctx.define_property_getset(err, message, getter, Value::UNDEFINED, PropFlags::CONFIGURABLE)
        .unwrap();

    assert!(ctx.to_rust_string(err).is_err());
    assert_eq!(ctx.take_js_error().unwrap().message, "no message for you");
    assert_eq!(ctx.ref_count_of(name), before);
    ctx.free_values(&[name, err]);
    assert_eq!(ctx.heap_stats().abi_violations, 0);
}

#[test]
fn own_property_names_list_indices_first() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let arr = ctx.new_array_from(vec![Value::from_i32(1), Value::from_i32(2)]);
    ctx.set_property_str(arr, "tag", Value::TRUE).unwrap();
    let names = ctx.get_own_property_names(arr);
    let text: Vec<String> = names
        .iter()
        .map(|a| ctx.atom_to_string(*a).unwrap().to_string())
        .collect();
    assert_eq!(text, vec!["0", "1", "tag"]);
    for a in names {
        ctx.free_atom(a);
    }
    assert_eq!(ctx.to_rust_string(arr).unwrap(), "1,2");
    assert_eq!(ctx.array_len(arr), Some(2));
    ctx.free_value(arr);
    assert_eq!(ctx.heap_stats().abi_violations, 0);
}

#[test]
fn huge_array_writes_throw_instead_of_allocating() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let arr = ctx.new_array_from(vec![Value::from_i32(1)]);

    let err = ctx.set_property_str(arr, "4294967294", Value::from_i32(1));
    assert!(err.is_err());
    let e = ctx.take_js_error().unwrap();
    assert_eq!(e.name, "RangeError");

    let err = ctx.set_property_str(arr, "length", Value::from_f64(4e9));
    assert!(err.is_err());
    assert_eq!(ctx.take_js_error().unwrap().name, "RangeError");

    assert_eq!(ctx.array_len(arr), Some(1));
    ctx.set_property_str(arr, "3", Value::from_i32(4)).unwrap();
    assert_eq!(ctx.array_len(arr), Some(4));
    ctx.free_value(arr);
    assert_eq!(ctx.heap_stats().abi_violations, 0);
}

#[test]
fn prototype_cycles_are_rejected() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let a = ctx.new_object();
    let b = ctx.new_object_with_proto(a);
    assert!(ctx.set_prototype(a, b).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "TypeError");
    assert!(err.message.contains("cyclic"), "{err:?}");
    ctx.free_values(&[b, a]);
}

#[test]
fn calling_a_non_function_throws_type_error() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let obj = ctx.new_object();
    assert!(ctx.call(obj, Value::UNDEFINED, &[]).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "TypeError");
    ctx.free_value(obj);
}

#[test]
fn thrown_errors_carry_script_stack() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let inner = ctx.new_function("inner", |ctx, _this, _args| {
        ctx.throw_error(ErrorKind::RangeError, "out of range");
        Value::EXCEPTION
    });
    let held = ctx.dup_value(inner);
    let outer = ctx.new_function("outer", move |ctx, _this, _args| {
        ctx.call_raw(held, Value::UNDEFINED, &[])
    });
    assert!(ctx.call(outer, Value::UNDEFINED, &[]).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "RangeError");
    assert_eq!(err.message, "out of range");
    assert_eq!(err.stack, "    at inner\n    at outer\n");
    assert_eq!(ctx.call_depth(), 0);
    ctx.free_values(&[outer, inner]);
}

#[test]
fn returning_exception_without_throwing_is_synthesized() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let f = ctx.new_function("sloppy", |_ctx, _this, _args| Value::EXCEPTION);
    assert!(ctx.call(f, Value::UNDEFINED, &[]).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "InternalError");
    assert!(err.message.contains("sloppy"), "{err:?}");
    ctx.free_value(f);
}

#[test]
fn deep_recursion_hits_call_depth_limit() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let f = ctx.new_function("again", |ctx, this, _args| {
        let me = ctx.get_property_str(this, "again").unwrap_or(Value::UNDEFINED);
        let r = ctx.call_raw(me, this, &[]);
        ctx.free_value(me);
        r
    });
    let obj = ctx.new_object();
    ctx.set_property_str(obj, "again", f).unwrap();
    let f = ctx.get_property_str(obj, "again").unwrap();
    assert!(ctx.call(f, obj, &[]).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "RangeError");
    assert_eq!(err.message, "Maximum call stack size exceeded");
    ctx.free_values(&[f, obj]);
}

#[test]
fn interrupt_handler_aborts_calls() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let f = ctx.new_function("work", |_ctx, _this, _args| Value::from_i32(1));
    ctx.set_interrupt_handler(|| true);
    assert!(ctx.call(f, Value::UNDEFINED, &[]).is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "InternalError");
    assert_eq!(err.message, "interrupted");
    ctx.clear_interrupt_handler();
    assert_eq!(ctx.call(f, Value::UNDEFINED, &[]).unwrap(), Value::from_i32(1));
    ctx.free_value(f);
}

#[test]
fn source_map_hook_rewrites_stacks() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    ctx.set_source_map_hook(|stack| stack.replace("bundle", "src/game.ts"));
    let f = ctx.new_function("bundle", |ctx, _this, _args| {
        ctx.throw_error(ErrorKind::Error, "boom");
        Value::EXCEPTION
    });
    let t = ctx.call(f, Value::UNDEFINED, &[]).unwrap_err();
    let err = ctx.catch(t);
    assert_eq!(err.stack(), Some("    at src/game.ts\n"));
    assert_eq!(err.to_string(), "Error: boom");
    ctx.free_value(f);
}

#[test]
fn call_constructor_links_prototype() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let class = ctx.new_class("Point", |ctx, this, args| {
        let x = args.first().copied().unwrap_or(Value::from_i32(0));
        match ctx.set_property_str(this, "x", x) {
            Ok(()) => Value::UNDEFINED,
            Err(_) => Value::EXCEPTION,
        }
    });
    let p = ctx.call_constructor(class, &[Value::from_i32(3)]).unwrap();
    assert_eq!(get_number(ctx, p, "x"), 3.0);
    let ctor = ctx.get_property_str(p, "constructor").unwrap();
    assert_eq!(ctor, class);
    assert_eq!(get_string(ctx, class, "name"), "Point");
    ctx.free_values(&[ctor, p, class]);
}

#[test]
fn json_parse_and_stringify() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let v = ctx
        .parse_json(r#"{"name":"orc","hp":12,"tags":["a","b"],"boss":false}"#)
        .unwrap();
    assert_eq!(get_string(ctx, v, "name"), "orc");
    assert_eq!(get_number(ctx, v, "hp"), 12.0);
    let text = ctx.to_json(v).unwrap();
    assert_eq!(
        text.as_deref(),
        Some(r#"{"name":"orc","hp":12,"tags":["a","b"],"boss":false}"#)
    );
    ctx.free_value(v);

    assert!(ctx.parse_json("{nope").is_err());
    let err = ctx.take_js_error().unwrap();
    assert_eq!(err.name, "SyntaxError");
    assert_eq!(ctx.to_json(Value::UNDEFINED).unwrap(), None);
}

#[test]
fn stringify_rejects_cycles() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let obj = ctx.new_object();
    let me = ctx.dup_value(obj);
    ctx.set_property_str(obj, "me", me).unwrap();
    assert!(ctx.to_json(obj).is_err());
    let err = ctx.take_js_error().unwrap();
    assert!(err.message.contains("cyclic"), "{err:?}");
    // Break the cycle so the object can be reclaimed.
    let atom = ctx.get_atom("me");
    assert!(ctx.delete_property(obj, atom).unwrap());
    ctx.free_value(obj);
    assert!(!ctx.is_live(obj));
}

#[test]
fn scope_frees_held_values_on_exit() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let before = ctx.heap_stats().live_slots;
    let kept = {
        let mut scope = ctx.scope();
        let a = scope.new_object();
        scope.hold(a);
        let b = scope.new_string("temp");
        scope.hold(b);
        scope.hold(Value::from_i32(1));
        assert_eq!(scope.held_count(), 2);
        let keep = scope.new_object();
        scope.hold(keep);
        scope.release(keep)
    };
    assert_eq!(ctx.heap_stats().live_slots, before + 1);
    assert!(ctx.is_live(kept));
    ctx.free_value(kept);
    assert_eq!(ctx.heap_stats().live_slots, before);
}

#[test]
fn conversions_match_script_rules() {
    let mut h = Harness::new();
    let ctx = h.ctx();
    let s = ctx.new_string(" 42 ");
    assert_eq!(ctx.to_number(s).unwrap(), 42.0);
    assert!(ctx.to_bool(s));
    let empty = ctx.new_string("");
    assert!(!ctx.to_bool(empty));
    assert_eq!(ctx.to_number(empty).unwrap(), 0.0);
    assert!(ctx.to_number(Value::UNDEFINED).unwrap().is_nan());
    assert_eq!(ctx.to_rust_string(Value::from_f64(1.5)).unwrap(), "1.5");
    assert_eq!(ctx.to_rust_string(Value::from_f64(2.0)).unwrap(), "2");
    let other = ctx.new_string(" 42 ");
    assert!(ctx.strict_equals(s, other));
    assert!(!ctx.strict_equals(s, empty));
    ctx.free_values(&[s, empty, other]);
}
