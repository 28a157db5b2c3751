#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use jsbind_runtime::{
    Clock, Context, ContextId, EngineKind, ErrorKind, FileSystem, Frontend, JsResult, Registry,
    RuntimeId, Value,
};

/// In-memory file system shared between the test and the runtime.
#[derive(Clone, Default)]
pub struct MemoryFs {
    files: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl MemoryFs {
    pub fn write(&self, path: &str, contents: impl AsRef<[u8]>) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), contents.as_ref().to_vec());
    }

    pub fn remove(&self, path: &str) {
        self.files.borrow_mut().remove(path);
    }
}

impl FileSystem for MemoryFs {
    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn get_full_path(&self, path: &str) -> Option<String> {
        self.exists(path).then(|| path.to_string())
    }

    fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>, String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| format!("{path}: not found"))
    }
}

#[derive(Clone, Default)]
pub struct ManualClock {
    pub now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn advance(&self, ms: u64) -> u64 {
        self.now.set(self.now.get() + ms);
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn unix_millis(&self) -> u64 {
        self.now.get()
    }

    fn mono_millis(&self) -> u64 {
        self.now.get()
    }
}

/// The CommonJS arguments a module body receives.
#[derive(Clone, Copy)]
pub struct ModuleArgs {
    pub exports: Value,
    pub require: Value,
    pub module: Value,
    pub filename: Value,
    pub dirname: Value,
}

pub type Program = Rc<dyn Fn(&mut Context, &ModuleArgs) -> JsResult<()>>;

/// Frontend whose "source text" is the name of a registered Rust program.
#[derive(Default)]
pub struct MockFrontend {
    programs: RefCell<HashMap<String, Program>>,
    pub compiled: Cell<usize>,
    pub bytecode_loads: Cell<usize>,
    pub tag: Cell<Option<u32>>,
}

impl MockFrontend {
    pub fn program(
        &self,
        name: &str,
        body: impl Fn(&mut Context, &ModuleArgs) -> JsResult<()> + 'static,
    ) {
        self.programs
            .borrow_mut()
            .insert(name.to_string(), Rc::new(body));
    }

    fn body_for(&self, ctx: &mut Context, filename: &str, key: &str) -> JsResult<Value> {
        let program = self.programs.borrow().get(key).cloned();
        let Some(program) = program else {
            let msg = format!("{filename}: unknown program '{key}'");
            return Err(ctx.throw_error(ErrorKind::SyntaxError, &msg));
        };
        Ok(ctx.new_function(filename, move |ctx, _this, args| {
            let arg = |i: usize| args.get(i).copied().unwrap_or(Value::UNDEFINED);
            let m = ModuleArgs {
                exports: arg(0),
                require: arg(1),
                module: arg(2),
                filename: arg(3),
                dirname: arg(4),
            };
            match program(ctx, &m) {
                Ok(()) => Value::UNDEFINED,
                Err(_) => Value::EXCEPTION,
            }
        }))
    }
}

impl Frontend for MockFrontend {
    fn kind(&self) -> EngineKind {
        EngineKind::Custom("mock".to_string())
    }

    fn compile_module(&self, ctx: &mut Context, filename: &str, source: &str) -> JsResult<Value> {
        self.compiled.set(self.compiled.get() + 1);
        self.body_for(ctx, filename, source.trim())
    }

    fn bytecode_tag(&self) -> Option<u32> {
        self.tag.get()
    }

    fn load_bytecode(&self, ctx: &mut Context, filename: &str, payload: &[u8]) -> JsResult<Value> {
        self.bytecode_loads.set(self.bytecode_loads.get() + 1);
        let key = String::from_utf8_lossy(payload).trim().to_string();
        self.body_for(ctx, filename, &key)
    }
}

pub struct Harness {
    pub registry: Registry,
    pub rt: RuntimeId,
    pub ctx: ContextId,
    pub fs: MemoryFs,
    pub frontend: Rc<MockFrontend>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        let mut registry = Registry::new();
        let rt = registry.new_runtime(None);
        let fs = MemoryFs::default();
        let frontend = Rc::new(MockFrontend::default());
        let clock = ManualClock::default();
        registry.set_file_system(rt, Rc::new(fs.clone())).unwrap();
        registry.set_frontend(rt, frontend.clone()).unwrap();
        registry.set_clock(rt, Rc::new(clock.clone())).unwrap();
        let ctx = registry.new_context(rt).unwrap();
        Self {
            registry,
            rt,
            ctx,
            fs,
            frontend,
            clock,
        }
    }

    pub fn ctx(&mut self) -> &mut Context {
        self.registry.context_mut(self.ctx).unwrap()
    }
}

/// Calls a script `require` function with a string id.
pub fn call_require(ctx: &mut Context, require: Value, id: &str) -> JsResult<Value> {
    let s = ctx.new_string(id);
    let r = ctx.call(require, Value::UNDEFINED, &[s]);
    ctx.free_value(s);
    r
}

pub fn set_str(ctx: &mut Context, obj: Value, name: &str, text: &str) -> JsResult<()> {
    let v = ctx.new_string(text);
    ctx.set_property_str(obj, name, v)
}

pub fn get_string(ctx: &mut Context, obj: Value, name: &str) -> String {
    let v = ctx.get_property_str(obj, name).unwrap();
    let s = ctx.to_rust_string(v).unwrap();
    ctx.free_value(v);
    s
}

pub fn get_number(ctx: &mut Context, obj: Value, name: &str) -> f64 {
    let v = ctx.get_property_str(obj, name).unwrap();
    let n = ctx.to_number(v).unwrap();
    ctx.free_value(v);
    n
}

/// Calls `obj[name]()` and returns the numeric result.
pub fn call_method_number(ctx: &mut Context, obj: Value, name: &str) -> f64 {
    let f = ctx.get_property_str(obj, name).unwrap();
    let r = ctx.call(f, obj, &[]).unwrap();
    ctx.free_value(f);
    let n = ctx.to_number(r).unwrap();
    ctx.free_value(r);
    n
}
