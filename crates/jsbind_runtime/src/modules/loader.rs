use std::rc::Rc;

use jsbind_core::Value;

use super::cache::{ModuleCache, ModuleIndex, ModuleRecord, ModuleState};
use super::path;
use super::resolver::ModuleResolver;
use crate::atoms::Atom;
use crate::context::{Context, ErrorKind};
use crate::errors::{BridgeError, JsResult, messages};
use crate::object::PropFlags;

const HOST_PARENT: &str = "<host>";
const GETTER: PropFlags = PropFlags::CONFIGURABLE.union(PropFlags::ENUMERABLE);

fn not_found_message(parent: &str, id: &str) -> String {
    BridgeError::ModuleNotFound {
        parent: parent.to_string(),
        id: id.to_string(),
    }
    .to_string()
}

impl Context {
    /// Appends a resolver to the end of the chain.
    pub fn add_module_resolver(&mut self, resolver: Rc<dyn ModuleResolver>) {
        self.resolvers.push(resolver);
    }

    /// Inserts a resolver at `index` (clamped), ahead of later ones.
    pub fn insert_module_resolver(&mut self, index: usize, resolver: Rc<dyn ModuleResolver>) {
        let index = index.min(self.resolvers.len());
        self.resolvers.insert(index, resolver);
    }

    pub fn module_resolver_names(&self) -> Vec<String> {
        self.resolvers.iter().map(|r| r.name().to_string()).collect()
    }

    /// Exposes `exports` (owned) as the module `id`.
    pub fn register_static_module(&mut self, id: &str, exports: Value) -> Result<(), BridgeError> {
        if self.modules.lookup(id).is_some() {
            self.free_value(exports);
            return Err(BridgeError::InvalidModule {
                id: id.to_string(),
                reason: "a module with this id is already loaded".to_string(),
            });
        }
        if let Some(old) = self.static_modules.insert(id.to_string(), exports) {
            self.free_value(old);
        }
        Ok(())
    }

    pub fn module_cache(&self) -> &ModuleCache {
        &self.modules
    }

    pub fn module_index(&self, id: &str) -> Option<ModuleIndex> {
        self.modules.lookup(id)
    }

    pub fn module_filename(&self, module: ModuleIndex) -> Option<String> {
        self.modules.get(module).map(|r| r.filename.clone())
    }

    fn resolve_in_chain(
        &self,
        parent: Option<ModuleIndex>,
        requested: &str,
    ) -> Option<(String, Rc<dyn ModuleResolver>)> {
        let parent_file = parent.and_then(|p| self.modules.get(p)).map(|r| r.filename.as_str());
        let joined = path::resolve_module_id(parent_file, requested);
        if let Some(record) = self.modules.lookup(&joined).and_then(|i| self.modules.get(i)) {
            return Some((record.id.clone(), record.resolver.clone()));
        }
        for resolver in &self.resolvers {
            if !resolver.validate(self, &joined) {
                continue;
            }
            if let Some(id) = resolver.resolve(self, &joined) {
                log::trace!("'{requested}' resolved to '{id}' by {}", resolver.name());
                return Some((id, resolver.clone()));
            }
        }
        log::trace!("'{requested}' not claimed by any resolver");
        None
    }

    /// Resolved id for `requested`, relative to the module `parent` if given.
    pub fn resolve_module(&self, parent: Option<&str>, requested: &str) -> Result<String, BridgeError> {
        let parent_idx = match parent {
            Some(p) => Some(self.modules.lookup(p).ok_or_else(|| BridgeError::ModuleNotFound {
                parent: HOST_PARENT.to_string(),
                id: p.to_string(),
            })?),
            None => None,
        };
        self.resolve_in_chain(parent_idx, requested)
            .map(|(id, _)| id)
            .ok_or_else(|| BridgeError::ModuleNotFound {
                parent: parent.unwrap_or(HOST_PARENT).to_string(),
                id: requested.to_string(),
            })
    }

    /// Host-side `require`. Returns owned exports.
    pub fn require(&mut self, requested: &str) -> Result<Value, BridgeError> {
        self.host_require(None, requested, false)
    }

    /// `require` as seen from the already-loaded module `parent`.
    pub fn require_from(&mut self, parent: &str, requested: &str) -> Result<Value, BridgeError> {
        let idx = self.modules.lookup(parent).ok_or_else(|| BridgeError::ModuleNotFound {
            parent: HOST_PARENT.to_string(),
            id: parent.to_string(),
        })?;
        self.host_require(Some(idx), requested, false)
    }

    /// Loads the entry module; it becomes `require.main` for every module.
    pub fn eval_main(&mut self, requested: &str) -> Result<Value, BridgeError> {
        if let Some(main) = self.modules.main().and_then(|i| self.modules.get(i)) {
            return Err(BridgeError::InvalidModule {
                id: requested.to_string(),
                reason: format!("main module is already '{}'", main.id),
            });
        }
        self.host_require(None, requested, true)
    }

    fn host_require(
        &mut self,
        parent: Option<ModuleIndex>,
        requested: &str,
        is_main: bool,
    ) -> Result<Value, BridgeError> {
        let Some((id, resolver)) = self.resolve_in_chain(parent, requested) else {
            let parent = parent
                .and_then(|p| self.modules.get(p))
                .map_or(HOST_PARENT.to_string(), |r| r.id.clone());
            return Err(BridgeError::ModuleNotFound {
                parent,
                id: requested.to_string(),
            });
        };
        self.load_module(parent, id, resolver, is_main)
            .map_err(|t| self.catch(t))
    }

    /// Script-side require; failures become pending exceptions.
    pub fn require_from_module(&mut self, parent: ModuleIndex, requested: &str) -> JsResult<Value> {
        self.require_module(Some(parent), requested)
    }

    pub(crate) fn require_module(&mut self, parent: Option<ModuleIndex>, requested: &str) -> JsResult<Value> {
        match self.resolve_in_chain(parent, requested) {
            Some((id, resolver)) => self.load_module(parent, id, resolver, false),
            None => {
                let from = parent
                    .and_then(|p| self.modules.get(p))
                    .map_or(HOST_PARENT.to_string(), |r| r.id.clone());
                let msg = not_found_message(&from, requested);
                Err(self.throw_error(ErrorKind::Error, &msg))
            }
        }
    }

    fn load_module(
        &mut self,
        parent: Option<ModuleIndex>,
        id: String,
        resolver: Rc<dyn ModuleResolver>,
        is_main: bool,
    ) -> JsResult<Value> {
        if let Some(idx) = self.modules.lookup(&id) {
            if let Some(p) = parent {
                self.modules.link_child(p, idx);
            }
            let pending = self
                .modules
                .get(idx)
                .is_some_and(|r| r.state == ModuleState::ReloadPending);
            if pending && self.modules.reload.as_ref().is_some_and(|b| b.draining) {
                self.reload_module(idx);
            }
            // Loading here means a circular require: hand out the partial exports.
            return self.module_exports(idx);
        }

        let idx = self.create_record(parent, &id, resolver.clone());
        if is_main {
            self.modules.set_main(idx);
        }
        if let Some(p) = parent {
            self.modules.link_child(p, idx);
        }
        log::trace!("loading '{id}' via {}", resolver.name());
        match resolver.load(self, idx) {
            Ok(()) => {
                self.finish_load(idx);
                log::debug!("{}: module '{id}' loaded", self.id());
                self.module_exports(idx)
            }
            Err(t) => {
                if let Some(record) = self.modules.remove(idx) {
                    self.free_value(record.module_obj);
                    self.free_value(record.require_fn);
                }
                log::debug!("{}: module '{id}' failed to load", self.id());
                Err(t)
            }
        }
    }

    fn create_record(
        &mut self,
        parent: Option<ModuleIndex>,
        id: &str,
        resolver: Rc<dyn ModuleResolver>,
    ) -> ModuleIndex {
        let n = self.names;
        let module_obj = self.new_object();
        let exports = self.new_object();
        self.put_own(module_obj, n.exports, exports, PropFlags::C_W_E);
        let id_value = self.new_string(id);
        self.put_own(module_obj, n.id, id_value, PropFlags::C_W_E);
        let filename_value = self.new_string(id);
        self.put_own(module_obj, n.filename, filename_value, PropFlags::C_W_E);
        self.put_own(module_obj, n.loaded, Value::FALSE, PropFlags::C_W_E);

        let idx = self.modules.insert(ModuleRecord {
            id: id.to_string(),
            filename: id.to_string(),
            resolver,
            module_obj,
            require_fn: Value::UNDEFINED,
            state: ModuleState::Loading,
            parent,
            children: Vec::new(),
        });

        let require_fn = self.make_require(idx, id);
        let require_ref = self.dup_value(require_fn);
        self.put_own(module_obj, n.require, require_ref, PropFlags::CONFIGURABLE | PropFlags::WRITABLE);
        if let Some(record) = self.modules.get_mut(idx) {
            record.require_fn = require_fn;
        }

        let parent_getter =
            self.new_function("get parent", move |ctx, _this, _args| ctx.module_parent_object(idx));
        self.put_accessor(module_obj, n.parent, parent_getter, Value::UNDEFINED, GETTER);
        let children_getter =
            self.new_function("get children", move |ctx, _this, _args| ctx.module_children_array(idx));
        self.put_accessor(module_obj, n.children, children_getter, Value::UNDEFINED, GETTER);
        idx
    }

    pub(crate) fn finish_load(&mut self, idx: ModuleIndex) {
        let Some(record) = self.modules.get_mut(idx) else {
            return;
        };
        record.state = ModuleState::Loaded;
        let module_obj = record.module_obj;
        self.put_own(module_obj, self.names.loaded, Value::TRUE, PropFlags::C_W_E);
    }

    fn make_require(&mut self, idx: ModuleIndex, id: &str) -> Value {
        let n = self.names;
        let require = self.new_function("require", move |ctx, _this, args| {
            let requested = match args.first() {
                Some(v) if v.is_string() => ctx.to_rust_string(*v),
                _ => {
                    ctx.throw_error(ErrorKind::TypeError, "require: module id must be a string");
                    return Value::EXCEPTION;
                }
            };
            match requested.and_then(|r| ctx.require_module(Some(idx), &r)) {
                Ok(v) => v,
                Err(_) => Value::EXCEPTION,
            }
        });
        let module_id = self.new_string(id);
        self.put_own(require, n.module_id, module_id, PropFlags::C_W_E);
        let main_getter = self.new_function("get main", |ctx, _this, _args| ctx.main_module_object());
        self.put_accessor(require, n.main, main_getter, Value::UNDEFINED, GETTER);
        let cache_getter = self.new_function("get cache", |ctx, _this, _args| ctx.module_cache_object());
        self.put_accessor(require, n.cache, cache_getter, Value::UNDEFINED, GETTER);
        require
    }

    fn module_object_of(&mut self, idx: Option<ModuleIndex>, missing: Value) -> Value {
        match idx.and_then(|i| self.modules.get(i)).map(|r| r.module_obj) {
            Some(obj) => self.dup_value(obj),
            None => missing,
        }
    }

    fn module_parent_object(&mut self, idx: ModuleIndex) -> Value {
        let parent = self.modules.get(idx).and_then(|r| r.parent);
        self.module_object_of(parent, Value::NULL)
    }

    fn module_children_array(&mut self, idx: ModuleIndex) -> Value {
        let children = self
            .modules
            .get(idx)
            .map(|r| r.children.clone())
            .unwrap_or_default();
        let items = children
            .into_iter()
            .filter_map(|c| self.modules.get(c).map(|r| r.module_obj))
            .collect::<Vec<_>>();
        let items = items.into_iter().map(|v| self.dup_value(v)).collect();
        self.new_array_from(items)
    }

    fn main_module_object(&mut self) -> Value {
        let main = self.modules.main();
        self.module_object_of(main, Value::UNDEFINED)
    }

    fn module_cache_object(&mut self) -> Value {
        let entries: Vec<(String, Value)> = self
            .modules
            .ids()
            .filter_map(|id| {
                let idx = self.modules.lookup(id)?;
                Some((id.to_string(), self.modules.get(idx)?.module_obj))
            })
            .collect();
        let cache = self.new_object();
        for (id, module_obj) in entries {
            let module_obj = self.dup_value(module_obj);
            let atom = self.new_atom(&id);
            self.put_own(cache, atom, module_obj, PropFlags::C_W_E);
            self.free_atom(atom);
        }
        cache
    }

    /// Owned current `module.exports`.
    pub fn module_exports(&mut self, module: ModuleIndex) -> JsResult<Value> {
        match self.modules.get(module).map(|r| r.module_obj) {
            Some(obj) => self.get_property(obj, self.names.exports),
            None => Err(self.throw_error(ErrorKind::InternalError, messages::DETACHED_HANDLE)),
        }
    }

    /// Replaces `module.exports` with `value` (owned).
    pub fn set_module_exports(&mut self, module: ModuleIndex, value: Value) -> JsResult<()> {
        match self.modules.get(module).map(|r| r.module_obj) {
            Some(obj) => self.set_property(obj, self.names.exports, value),
            None => {
                self.free_value(value);
                Err(self.throw_error(ErrorKind::InternalError, messages::DETACHED_HANDLE))
            }
        }
    }

    /// Calls a compiled module body with `this = exports` and the CommonJS
    /// arguments `(exports, require, module, __filename, __dirname)`.
    pub fn run_module_body(&mut self, module: ModuleIndex, body: Value) -> JsResult<()> {
        let Some((module_obj, require_fn, filename)) = self
            .modules
            .get(module)
            .map(|r| (r.module_obj, r.require_fn, r.filename.clone()))
        else {
            return Err(self.throw_error(ErrorKind::InternalError, messages::DETACHED_HANDLE));
        };
        let exports = self.get_property(module_obj, self.names.exports)?;
        let filename_value = self.new_string(&filename);
        let dirname_value = self.new_string(path::dirname(&filename));
        let args = [exports, require_fn, module_obj, filename_value, dirname_value];
        let r = self.call(body, exports, &args);
        self.free_values(&[exports, filename_value, dirname_value]);
        let r = r?;
        self.free_value(r);
        Ok(())
    }

    pub fn read_module_file(&mut self, filename: &str) -> JsResult<Vec<u8>> {
        let fs = self.file_system();
        fs.read_all_bytes(filename).map_err(|e| {
            let msg = format!("Cannot read module '{filename}': {e}");
            self.throw_error(ErrorKind::Error, &msg)
        })
    }

    /// Makes `target` carry exactly the enumerable own properties of
    /// `source`, keeping `target`'s identity. `source` is read in full before
    /// `target` is touched.
    pub(crate) fn replace_object_contents(&mut self, target: Value, source: Value) -> JsResult<()> {
        let old: Vec<Atom> = match self.obj(target) {
            Some(o) => o.props.keys().copied().collect(),
            None => return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT)),
        };
        let keys = self.get_own_property_names(source);
        let mut values = Vec::with_capacity(keys.len());
        let mut result = Ok(());
        for &atom in &keys {
            match self.get_property(source, atom) {
                Ok(v) => values.push(v),
                Err(t) => {
                    result = Err(t);
                    break;
                }
            }
        }
        if result.is_ok() {
            result = old
                .into_iter()
                .try_for_each(|atom| self.delete_property(target, atom).map(drop));
        }
        match result {
            Ok(()) => {
                for (&atom, v) in keys.iter().zip(values) {
                    self.put_own(target, atom, v, PropFlags::C_W_E);
                }
            }
            Err(_) => self.free_values(&values),
        }
        for atom in keys {
            self.free_atom(atom);
        }
        result
    }

    pub(crate) fn flush_modules(&mut self) {
        for record in self.modules.drain() {
            self.free_value(record.module_obj);
            self.free_value(record.require_fn);
        }
    }
}
