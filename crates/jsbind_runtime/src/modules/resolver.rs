use std::rc::Rc;

use jsbind_core::Value;
use smallvec::{SmallVec, smallvec};

use super::cache::ModuleIndex;
use super::path;
use crate::context::{Context, ErrorKind};
use crate::errors::{JsResult, messages};
use crate::frontend::decode_bytecode;

/// One link of the resolver chain. The first resolver whose `validate`
/// accepts an id and whose `resolve` finds it owns the module.
pub trait ModuleResolver {
    fn name(&self) -> &str;

    /// Cheap claim check, e.g. by extension.
    fn validate(&self, ctx: &Context, id: &str) -> bool;

    /// Canonical module id for `id`, or `None` when it does not exist.
    fn resolve(&self, ctx: &Context, id: &str) -> Option<String>;

    /// Populates the exports of a freshly created record.
    fn load(&self, ctx: &mut Context, module: ModuleIndex) -> JsResult<()>;

    /// Re-populates an existing record. The caller stages a fresh
    /// `module.exports` beforehand and merges the result onto the live one.
    fn reload(&self, ctx: &mut Context, module: ModuleIndex) -> JsResult<()> {
        self.load(ctx, module)
    }
}

pub fn default_resolvers() -> Vec<Rc<dyn ModuleResolver>> {
    vec![
        Rc::new(StaticModuleResolver),
        Rc::new(DefineModuleResolver),
        Rc::new(SourceModuleResolver),
        Rc::new(JsonModuleResolver),
    ]
}

fn module_id(ctx: &Context, module: ModuleIndex) -> String {
    ctx.modules
        .get(module)
        .map(|r| r.id.clone())
        .unwrap_or_default()
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Looks `id` up through the path resolver and canonicalizes the hit.
fn find_file(ctx: &Context, candidates: &[String]) -> Option<String> {
    let fs = ctx.file_system();
    let resolver = ctx.path_resolver();
    for candidate in candidates {
        if let Some(found) = resolver.resolve_path(fs.as_ref(), candidate) {
            let full = fs.get_full_path(&found).unwrap_or(found);
            log::trace!("resolved '{candidate}' -> '{full}'");
            return Some(path::normalize(&full));
        }
    }
    None
}

/// Host-registered modules addressed by bare id.
pub struct StaticModuleResolver;

impl ModuleResolver for StaticModuleResolver {
    fn name(&self) -> &str {
        "static"
    }

    fn validate(&self, ctx: &Context, id: &str) -> bool {
        ctx.static_modules.contains_key(id)
    }

    fn resolve(&self, _ctx: &Context, id: &str) -> Option<String> {
        Some(id.to_string())
    }

    fn load(&self, ctx: &mut Context, module: ModuleIndex) -> JsResult<()> {
        let id = module_id(ctx, module);
        let value = ctx.static_modules.get(&id).copied().unwrap_or(Value::UNDEFINED);
        let value = ctx.dup_value(value);
        ctx.set_module_exports(module, value)
    }
}

/// Modules declared with the global `define`.
pub struct DefineModuleResolver;

impl ModuleResolver for DefineModuleResolver {
    fn name(&self) -> &str {
        "define"
    }

    fn validate(&self, ctx: &Context, id: &str) -> bool {
        ctx.defined_modules.contains_key(id)
    }

    fn resolve(&self, _ctx: &Context, id: &str) -> Option<String> {
        Some(id.to_string())
    }

    fn load(&self, ctx: &mut Context, module: ModuleIndex) -> JsResult<()> {
        let id = module_id(ctx, module);
        let Some((deps, factory)) = ctx
            .defined_modules
            .get(&id)
            .map(|d| (d.deps.clone(), d.factory))
        else {
            let msg = format!("module '{id}' is no longer defined");
            return Err(ctx.throw_error(ErrorKind::Error, &msg));
        };
        if !ctx.is_function(factory) {
            let value = ctx.dup_value(factory);
            return ctx.set_module_exports(module, value);
        }
        let (module_obj, require_fn) = match ctx.modules.get(module) {
            Some(r) => (r.module_obj, r.require_fn),
            None => return Err(ctx.throw_error(ErrorKind::InternalError, messages::DETACHED_HANDLE)),
        };
        let factory = ctx.dup_value(factory);
        let exports = match ctx.module_exports(module) {
            Ok(v) => v,
            Err(t) => {
                ctx.free_value(factory);
                return Err(t);
            }
        };
        let names: Vec<String> = if deps.is_empty() {
            vec!["require".into(), "exports".into(), "module".into()]
        } else {
            deps
        };
        let mut args: SmallVec<[Value; 4]> = SmallVec::new();
        let mut failed = None;
        for dep in &names {
            let v = match dep.as_str() {
                "require" => ctx.dup_value(require_fn),
                "exports" => ctx.dup_value(exports),
                "module" => ctx.dup_value(module_obj),
                other => match ctx.require_from_module(module, other) {
                    Ok(v) => v,
                    Err(t) => {
                        failed = Some(t);
                        break;
                    }
                },
            };
            args.push(v);
        }
        let result = match failed {
            Some(t) => Err(t),
            None => ctx.call(factory, exports, &args),
        };
        ctx.free_values(&args);
        ctx.free_value(factory);
        ctx.free_value(exports);
        let result = result?;
        if result.is_undefined() {
            Ok(())
        } else {
            ctx.set_module_exports(module, result)
        }
    }
}

/// Script files, compiled by the runtime frontend. A tagged `<file>.bc`
/// blob next to the source is preferred when its tag matches.
pub struct SourceModuleResolver;

impl SourceModuleResolver {
    fn compile(ctx: &mut Context, filename: &str) -> JsResult<Value> {
        let Some(frontend) = ctx.frontend() else {
            return Err(ctx.throw_error(ErrorKind::InternalError, messages::FRONTEND_MISSING));
        };
        if ctx.config().bytecode_cache {
            if let Some(tag) = frontend.bytecode_tag() {
                let bc = format!("{filename}.bc");
                let fs = ctx.file_system();
                if fs.exists(&bc) {
                    match fs.read_all_bytes(&bc) {
                        Ok(blob) => match decode_bytecode(&blob, tag) {
                            Some(payload) => {
                                log::trace!("{bc}: loading bytecode");
                                return frontend.load_bytecode(ctx, filename, payload);
                            }
                            None => log::warn!("{bc}: bytecode tag mismatch, compiling source"),
                        },
                        Err(e) => log::warn!("{bc}: {e}"),
                    }
                }
            }
        }
        let bytes = ctx.read_module_file(filename)?;
        let source = String::from_utf8_lossy(&bytes);
        frontend.compile_module(ctx, filename, strip_bom(&source))
    }
}

impl ModuleResolver for SourceModuleResolver {
    fn name(&self) -> &str {
        "source"
    }

    fn validate(&self, _ctx: &Context, id: &str) -> bool {
        matches!(path::extension(id), None | Some("js"))
    }

    fn resolve(&self, ctx: &Context, id: &str) -> Option<String> {
        let candidates: SmallVec<[String; 3]> = if path::extension(id) == Some("js") {
            smallvec![id.to_string()]
        } else {
            smallvec![id.to_string(), format!("{id}.js"), format!("{id}/index.js")]
        };
        find_file(ctx, &candidates)
    }

    fn load(&self, ctx: &mut Context, module: ModuleIndex) -> JsResult<()> {
        let filename = ctx.module_filename(module).unwrap_or_default();
        let body = Self::compile(ctx, &filename)?;
        let r = ctx.run_module_body(module, body);
        ctx.free_value(body);
        r
    }
}

/// `.json` files parsed into engine values.
pub struct JsonModuleResolver;

impl JsonModuleResolver {
    fn parse(ctx: &mut Context, module: ModuleIndex) -> JsResult<Value> {
        let filename = ctx.module_filename(module).unwrap_or_default();
        let bytes = ctx.read_module_file(&filename)?;
        let text = String::from_utf8_lossy(&bytes);
        match serde_json::from_str::<serde_json::Value>(strip_bom(&text)) {
            Ok(json) => Ok(ctx.json_to_value(&json)),
            Err(e) => {
                let msg = format!("invalid module '{filename}': {e}");
                Err(ctx.throw_error(ErrorKind::SyntaxError, &msg))
            }
        }
    }
}

impl ModuleResolver for JsonModuleResolver {
    fn name(&self) -> &str {
        "json"
    }

    fn validate(&self, _ctx: &Context, id: &str) -> bool {
        path::extension(id) == Some("json")
    }

    fn resolve(&self, ctx: &Context, id: &str) -> Option<String> {
        find_file(ctx, &[id.to_string()])
    }

    fn load(&self, ctx: &mut Context, module: ModuleIndex) -> JsResult<()> {
        let value = Self::parse(ctx, module)?;
        ctx.set_module_exports(module, value)
    }
}
