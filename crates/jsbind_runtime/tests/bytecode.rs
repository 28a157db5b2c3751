mod common;

use std::rc::Rc;

use common::{Harness, MemoryFs, MockFrontend, get_string};
use jsbind_runtime::{
    Capabilities, Registry, RuntimeConfig, Value, decode_bytecode, encode_bytecode,
};

const TAG: u32 = 0x4a53_4243;

fn programs(frontend: &MockFrontend) {
    frontend.program("hud_src", |ctx, m| {
        let v = ctx.new_string("source");
        ctx.set_property_str(m.exports, "from", v)
    });
    frontend.program("hud_bc", |ctx, m| {
        let v = ctx.new_string("bytecode");
        ctx.set_property_str(m.exports, "from", v)
    });
}

#[test]
fn blob_header_carries_the_tag() {
    let blob = encode_bytecode(TAG, b"payload");
    assert_eq!(&blob[..4], &TAG.to_le_bytes());
    assert_eq!(decode_bytecode(&blob, TAG), Some(&b"payload"[..]));
    assert_eq!(decode_bytecode(&blob, TAG + 1), None);
    assert_eq!(decode_bytecode(&[1, 2], TAG), None);
}

#[test]
fn matching_bytecode_is_preferred() {
    let mut h = Harness::new();
    programs(&h.frontend);
    h.frontend.tag.set(Some(TAG));
    h.fs.write("hud.js", "hud_src");
    h.fs.write("hud.js.bc", encode_bytecode(TAG, b"hud_bc"));
    let ctx = h.ctx();
    let v = ctx.require("hud").unwrap();
    assert_eq!(get_string(ctx, v, "from"), "bytecode");
    ctx.free_value(v);
    assert_eq!(h.frontend.bytecode_loads.get(), 1);
    assert_eq!(h.frontend.compiled.get(), 0);
}

#[test]
fn tag_mismatch_falls_back_to_source() {
    let mut h = Harness::new();
    programs(&h.frontend);
    h.frontend.tag.set(Some(TAG));
    h.fs.write("hud.js", "hud_src");
    h.fs.write("hud.js.bc", encode_bytecode(TAG ^ 0xff, b"hud_bc"));
    let ctx = h.ctx();
    let v = ctx.require("hud").unwrap();
    assert_eq!(get_string(ctx, v, "from"), "source");
    ctx.free_value(v);
    assert_eq!(h.frontend.bytecode_loads.get(), 0);
    assert_eq!(h.frontend.compiled.get(), 1);
}

#[test]
fn frontend_without_tag_ignores_bytecode() {
    let mut h = Harness::new();
    programs(&h.frontend);
    h.fs.write("hud.js", "hud_src");
    h.fs.write("hud.js.bc", encode_bytecode(TAG, b"hud_bc"));
    let ctx = h.ctx();
    let v = ctx.require("hud").unwrap();
    assert_eq!(get_string(ctx, v, "from"), "source");
    ctx.free_value(v);
}

#[test]
fn disabled_bytecode_cache_ignores_blobs() {
    let fs = MemoryFs::default();
    fs.write("hud.js", "hud_src");
    fs.write("hud.js.bc", encode_bytecode(TAG, b"hud_bc"));
    let frontend = Rc::new(MockFrontend::default());
    programs(&frontend);
    frontend.tag.set(Some(TAG));

    let mut registry = Registry::new();
    let config = RuntimeConfig {
        bytecode_cache: false,
        ..RuntimeConfig::default()
    };
    let caps = Capabilities {
        fs: Box::new(fs),
        ..Capabilities::default()
    };
    let rt = registry.new_runtime_with_config(config, caps, None);
    registry.set_frontend(rt, frontend.clone()).unwrap();
    let id = registry.new_context(rt).unwrap();
    let ctx = registry.context_mut(id).unwrap();
    let v = ctx.require("hud").unwrap();
    assert_eq!(get_string(ctx, v, "from"), "source");
    ctx.free_value(v);
    assert_eq!(frontend.bytecode_loads.get(), 0);
}

#[test]
fn bytecode_only_frontend_reports_unsupported() {
    struct SourceOnly;

    impl jsbind_runtime::Frontend for SourceOnly {
        fn kind(&self) -> jsbind_runtime::EngineKind {
            jsbind_runtime::EngineKind::QuickJs
        }

        fn compile_module(
            &self,
            ctx: &mut jsbind_runtime::Context,
            _filename: &str,
            _source: &str,
        ) -> jsbind_runtime::JsResult<Value> {
            Ok(ctx.new_function("body", |_ctx, _this, _args| Value::UNDEFINED))
        }

        fn bytecode_tag(&self) -> Option<u32> {
            Some(TAG)
        }
    }

    let mut h = Harness::new();
    h.registry.set_frontend(h.rt, Rc::new(SourceOnly)).unwrap();
    h.fs.write("hud.js", "ignored");
    h.fs.write("hud.js.bc", encode_bytecode(TAG, b"blob"));
    let err = h.ctx().require("hud").unwrap_err();
    assert!(
        err.to_string().contains("bytecode is not supported"),
        "{err}"
    );
}
