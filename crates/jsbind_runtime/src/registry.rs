//! Runtime/context manager.
//!
//! All runtimes and contexts live in an explicit `Registry` that the host
//! passes around; there is no process-wide state. Ids come from monotonic
//! counters and are never reused, so a handle that outlived a
//! dispose-and-recreate cycle is reported instead of aliasing a new object.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use jsbind_core::{
    Capabilities, Clock, FastHashMap, FileSystem, PathResolver, SearchPathResolver, fast_map_new,
};

use crate::config::RuntimeConfig;
use crate::context::{Context, ContextState};
use crate::errors::BridgeError;
use crate::frontend::Frontend;
use crate::object::PayloadHeader;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt#{}", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Invoked when the engine reclaims a bridge object.
pub type FinalizerCallback = Box<dyn Fn(PayloadHeader)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Created,
    Initialized,
    Disposing,
    Disposed,
}

/// State every context of one runtime shares.
pub(crate) struct RuntimeShared {
    pub(crate) id: RuntimeId,
    pub(crate) config: RuntimeConfig,
    pub(crate) finalizer: Option<FinalizerCallback>,
    pub(crate) frontend: RefCell<Option<Rc<dyn Frontend>>>,
    pub(crate) fs: RefCell<Rc<dyn FileSystem>>,
    pub(crate) path_resolver: RefCell<Rc<dyn PathResolver>>,
    pub(crate) clock: RefCell<Rc<dyn Clock>>,
}

impl RuntimeShared {
    pub(crate) fn finalize(&self, header: PayloadHeader) {
        if let Some(cb) = self.finalizer.as_ref() {
            cb(header);
        }
    }
}

struct RuntimeRecord {
    state: RuntimeState,
    contexts: IndexSet<ContextId>,
    shared: Rc<RuntimeShared>,
}

pub struct Registry {
    runtimes: FastHashMap<RuntimeId, RuntimeRecord>,
    contexts: FastHashMap<ContextId, Context>,
    next_runtime: u32,
    next_context: u32,
    generation: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            runtimes: fast_map_new(),
            contexts: fast_map_new(),
            next_runtime: 1,
            next_context: 1,
            generation: 0,
        }
    }

    pub fn new_runtime(&mut self, finalizer: Option<FinalizerCallback>) -> RuntimeId {
        self.new_runtime_with_config(RuntimeConfig::default(), Capabilities::default(), finalizer)
    }

    pub fn new_runtime_with_config(
        &mut self,
        config: RuntimeConfig,
        caps: Capabilities,
        finalizer: Option<FinalizerCallback>,
    ) -> RuntimeId {
        let id = RuntimeId(self.next_runtime);
        self.next_runtime += 1;

        let mut path_resolver = caps.path_resolver;
        for p in &config.search_paths {
            path_resolver.add_search_path(p);
        }
        if config.debug_server {
            log::info!(
                "{id}: debugger requested on port {} (await={})",
                config.debug_port,
                config.await_debugger
            );
        }
        let shared = Rc::new(RuntimeShared {
            id,
            config,
            finalizer,
            frontend: RefCell::new(None),
            fs: RefCell::new(Rc::from(caps.fs)),
            path_resolver: RefCell::new(Rc::from(path_resolver)),
            clock: RefCell::new(Rc::from(caps.clock)),
        });
        let mut record = RuntimeRecord {
            state: RuntimeState::Created,
            contexts: IndexSet::new(),
            shared,
        };
        record.state = RuntimeState::Initialized;
        self.runtimes.insert(id, record);
        log::debug!("{id}: runtime initialized (generation {})", self.generation);
        id
    }

    fn runtime(&self, id: RuntimeId) -> Result<&RuntimeRecord, BridgeError> {
        self.runtimes.get(&id).ok_or(BridgeError::InvalidRuntime(id))
    }

    pub fn runtime_state(&self, id: RuntimeId) -> Option<RuntimeState> {
        self.runtimes.get(&id).map(|r| r.state)
    }

    pub fn runtime_contexts(&self, id: RuntimeId) -> Result<Vec<ContextId>, BridgeError> {
        Ok(self.runtime(id)?.contexts.iter().copied().collect())
    }

    pub fn set_frontend(&mut self, id: RuntimeId, frontend: Rc<dyn Frontend>) -> Result<(), BridgeError> {
        *self.runtime(id)?.shared.frontend.borrow_mut() = Some(frontend);
        Ok(())
    }

    pub fn set_file_system(&mut self, id: RuntimeId, fs: Rc<dyn FileSystem>) -> Result<(), BridgeError> {
        *self.runtime(id)?.shared.fs.borrow_mut() = fs;
        Ok(())
    }

    pub fn set_path_resolver(
        &mut self,
        id: RuntimeId,
        resolver: Rc<dyn PathResolver>,
    ) -> Result<(), BridgeError> {
        *self.runtime(id)?.shared.path_resolver.borrow_mut() = resolver;
        Ok(())
    }

    pub fn set_search_paths(&mut self, id: RuntimeId, paths: &[&str]) -> Result<(), BridgeError> {
        let resolver = SearchPathResolver::new(paths.iter().map(|p| p.to_string()));
        self.set_path_resolver(id, Rc::new(resolver))
    }

    pub fn set_clock(&mut self, id: RuntimeId, clock: Rc<dyn Clock>) -> Result<(), BridgeError> {
        *self.runtime(id)?.shared.clock.borrow_mut() = clock;
        Ok(())
    }

    pub fn new_context(&mut self, runtime: RuntimeId) -> Result<ContextId, BridgeError> {
        let record = self
            .runtimes
            .get_mut(&runtime)
            .ok_or(BridgeError::InvalidRuntime(runtime))?;
        if record.state != RuntimeState::Initialized {
            return Err(BridgeError::RuntimeDisposed(runtime));
        }
        let id = ContextId(self.next_context);
        self.next_context += 1;
        let ctx = Context::new(id, record.shared.clone());
        record.contexts.insert(id);
        self.contexts.insert(id, ctx);
        log::debug!("{id}: context created in {runtime}");
        Ok(id)
    }

    pub fn context(&self, id: ContextId) -> Result<&Context, BridgeError> {
        self.contexts.get(&id).ok_or(BridgeError::InvalidContext(id))
    }

    pub fn context_mut(&mut self, id: ContextId) -> Result<&mut Context, BridgeError> {
        self.contexts
            .get_mut(&id)
            .ok_or(BridgeError::InvalidContext(id))
    }

    pub fn is_context_live(&self, id: ContextId) -> bool {
        self.contexts
            .get(&id)
            .is_some_and(|c| c.state() == ContextState::Active)
    }

    pub fn free_context(&mut self, id: ContextId) -> Result<(), BridgeError> {
        let mut ctx = self
            .contexts
            .remove(&id)
            .ok_or(BridgeError::InvalidContext(id))?;
        if let Some(rt) = self.runtimes.get_mut(&ctx.runtime_id()) {
            rt.contexts.shift_remove(&id);
        }
        ctx.teardown();
        Ok(())
    }

    /// Tears down every context of the runtime, then invalidates its id.
    pub fn free_runtime(&mut self, id: RuntimeId) -> Result<(), BridgeError> {
        let record = self
            .runtimes
            .get_mut(&id)
            .ok_or(BridgeError::InvalidRuntime(id))?;
        record.state = RuntimeState::Disposing;
        let contexts: Vec<ContextId> = record.contexts.iter().copied().collect();
        for ctx_id in contexts {
            self.free_context(ctx_id)?;
        }
        if let Some(mut record) = self.runtimes.remove(&id) {
            record.state = RuntimeState::Disposed;
            log::debug!("{id}: runtime disposed");
        }
        Ok(())
    }

    /// Host reload: dispose every runtime so they can be rebuilt from scratch.
    pub fn dispose_all(&mut self) {
        let mut ids: Vec<RuntimeId> = self.runtimes.keys().copied().collect();
        ids.sort();
        for id in ids {
            if let Err(e) = self.free_runtime(id) {
                log::error!("dispose of {id} failed: {e}");
            }
        }
        self.generation += 1;
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn runtime_count(&self) -> usize {
        self.runtimes.len()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
