//! Execution context: owns the value heap, atoms, object cache and module
//! cache of one isolated script environment.

mod call;
mod exception;
mod json;
mod props;
mod values;

pub use exception::ErrorKind;

use std::any::Any;
use std::rc::Rc;

use indexmap::IndexMap;
use jsbind_core::{Clock, FileSystem, HeapError, PathResolver, RcHeap, RefOutcome, Value};
use smallvec::SmallVec;

use crate::atoms::{Atom, AtomCache, AtomTable, WellKnownAtoms};
use crate::builtins::{self, Builtins, CachedConstructors};
use crate::config::RuntimeConfig;
use crate::frontend::Frontend;
use crate::jobs::{JobQueue, JobSender};
use crate::modules::{DefinedModule, ModuleCache, ModuleResolver, default_resolvers};
use crate::object::{BridgeKind, HeapObject, JsObject, ObjectClass, PayloadHeader};
use crate::object_cache::ObjectCache;
use crate::registry::{ContextId, RuntimeId, RuntimeShared};
use crate::scope::Scope;
use crate::timers::TimerManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Active,
    Destroyed,
}

/// Snapshot of heap occupancy, mostly for leak checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapStats {
    pub live_slots: usize,
    pub live_atoms: usize,
    pub bridged_objects: usize,
    pub abi_violations: usize,
}

pub struct Context {
    id: ContextId,
    state: ContextState,
    pub(crate) shared: Rc<RuntimeShared>,
    pub(crate) heap: RcHeap<HeapObject>,
    pub(crate) atoms: AtomTable,
    pub(crate) atom_cache: AtomCache,
    pub(crate) names: WellKnownAtoms,
    pub(crate) object_cache: ObjectCache,
    pub(crate) modules: ModuleCache,
    pub(crate) resolvers: Vec<Rc<dyn ModuleResolver>>,
    pub(crate) static_modules: IndexMap<String, Value>,
    pub(crate) defined_modules: IndexMap<String, DefinedModule>,
    pub(crate) builtins: Builtins,
    pub(crate) pending_exception: Option<Value>,
    pub(crate) call_stack: Vec<Rc<str>>,
    pub(crate) timers: TimerManager,
    pub(crate) jobs: JobQueue,
    interrupt: Option<Box<dyn FnMut() -> bool>>,
    source_map: Option<Box<dyn Fn(&str) -> String>>,
    abi_violations: usize,
}

impl Context {
    pub(crate) fn new(id: ContextId, shared: Rc<RuntimeShared>) -> Self {
        let mut atoms = AtomTable::new();
        let mut atom_cache = AtomCache::new();
        let names = WellKnownAtoms::register(&mut atom_cache, &mut atoms);
        let mut ctx = Self {
            id,
            state: ContextState::Created,
            shared,
            heap: RcHeap::new(),
            atoms,
            atom_cache,
            names,
            object_cache: ObjectCache::new(),
            modules: ModuleCache::new(),
            resolvers: default_resolvers(),
            static_modules: IndexMap::new(),
            defined_modules: IndexMap::new(),
            builtins: Builtins::empty(),
            pending_exception: None,
            call_stack: Vec::new(),
            timers: TimerManager::new(),
            jobs: JobQueue::new(),
            interrupt: None,
            source_map: None,
            abi_violations: 0,
        };
        builtins::install(&mut ctx);
        ctx.state = ContextState::Active;
        ctx
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn runtime_id(&self) -> RuntimeId {
        self.shared.id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn frontend(&self) -> Option<Rc<dyn Frontend>> {
        self.shared.frontend.borrow().clone()
    }

    pub fn file_system(&self) -> Rc<dyn FileSystem> {
        self.shared.fs.borrow().clone()
    }

    pub fn path_resolver(&self) -> Rc<dyn PathResolver> {
        self.shared.path_resolver.borrow().clone()
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        self.shared.clock.borrow().clone()
    }

    pub fn global_object(&self) -> Value {
        self.builtins.global
    }

    pub fn constructors(&self) -> &CachedConstructors {
        &self.builtins.ctors
    }

    pub fn well_known(&self) -> &WellKnownAtoms {
        &self.names
    }

    /// Sender for the deferred job queue; may be moved to other threads.
    pub fn job_sender(&self) -> JobSender {
        self.jobs.sender()
    }

    pub fn scope(&mut self) -> Scope<'_> {
        Scope::new(self)
    }

    pub fn set_interrupt_handler(&mut self, handler: impl FnMut() -> bool + 'static) {
        self.interrupt = Some(Box::new(handler));
    }

    pub fn clear_interrupt_handler(&mut self) {
        self.interrupt = None;
    }

    pub(crate) fn poll_interrupt(&mut self) -> bool {
        match self.interrupt.as_mut() {
            Some(h) => h(),
            None => false,
        }
    }

    pub fn set_source_map_hook(&mut self, hook: impl Fn(&str) -> String + 'static) {
        self.source_map = Some(Box::new(hook));
    }

    pub(crate) fn map_stack(&self, stack: &str) -> String {
        match self.source_map.as_ref() {
            Some(hook) => hook(stack),
            None => stack.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Value lifetime
    // ------------------------------------------------------------------

    pub fn dup_value(&mut self, v: Value) -> Value {
        if let Some(slot) = v.slot() {
            if let Err(e) = self.heap.ref_count(slot, 1) {
                self.report_violation(e);
            }
        }
        v
    }

    /// Release one reference. Releasing the last reference to an object
    /// cascades to everything it holds.
    pub fn free_value(&mut self, v: Value) {
        let mut pending: SmallVec<[Value; 8]> = SmallVec::new();
        pending.push(v);
        while let Some(v) = pending.pop() {
            let Some(slot) = v.slot() else {
                continue;
            };
            match self.heap.adjust(slot, -1) {
                Ok(RefOutcome::Live(_)) => {}
                Ok(RefOutcome::Evicted(HeapObject::String(_))) => {}
                Ok(RefOutcome::Evicted(HeapObject::Object(obj))) => {
                    self.finalize_object(obj, &mut pending);
                }
                Err(e) => self.report_violation(e),
            }
        }
    }

    pub fn free_values(&mut self, values: &[Value]) {
        for v in values {
            self.free_value(*v);
        }
    }

    fn finalize_object(&mut self, obj: JsObject, pending: &mut SmallVec<[Value; 8]>) {
        if let Some(header) = obj.payload_header() {
            self.object_cache.remove_by_payload_header(header);
            log::trace!("{}: bridge object {:?} finalized", self.id, header);
            self.shared.finalize(header);
        }
        pending.extend(obj.owned_values());
        for atom in obj.props.keys() {
            if let Err(e) = self.atoms.free_atom(*atom) {
                self.report_violation(e);
            }
        }
    }

    pub(crate) fn report_violation(&mut self, e: HeapError) {
        self.abi_violations += 1;
        log::error!("{}: {e}", self.id);
    }

    pub fn ref_count_of(&self, v: Value) -> Option<u32> {
        self.heap.count_of(v.slot()?)
    }

    pub fn is_live(&self, v: Value) -> bool {
        v.slot().is_some_and(|s| self.heap.contains(s))
    }

    pub fn heap_stats(&self) -> HeapStats {
        HeapStats {
            live_slots: self.heap.live_count(),
            live_atoms: self.atoms.live_count(),
            bridged_objects: self.object_cache.len(),
            abi_violations: self.abi_violations,
        }
    }

    pub(crate) fn obj(&self, v: Value) -> Option<&JsObject> {
        if !v.is_object() {
            return None;
        }
        match self.heap.get(v.slot()?) {
            Ok(HeapObject::Object(o)) => Some(o),
            _ => None,
        }
    }

    pub(crate) fn obj_mut(&mut self, v: Value) -> Option<&mut JsObject> {
        if !v.is_object() {
            return None;
        }
        match self.heap.get_mut(v.slot()?) {
            Ok(HeapObject::Object(o)) => Some(o),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Atoms
    // ------------------------------------------------------------------

    /// Owned atom; pair with `free_atom`.
    pub fn new_atom(&mut self, name: &str) -> Atom {
        self.atoms.new_atom(name)
    }

    pub fn dup_atom(&mut self, atom: Atom) -> Atom {
        if let Err(e) = self.atoms.dup_atom(atom) {
            self.report_violation(e);
        }
        atom
    }

    pub fn free_atom(&mut self, atom: Atom) {
        if let Err(e) = self.atoms.free_atom(atom) {
            self.report_violation(e);
        }
    }

    /// Memoized atom owned by the context; do not free.
    pub fn get_atom(&mut self, name: &str) -> Atom {
        self.atom_cache.get_atom(&mut self.atoms, name)
    }

    pub fn atom_to_string(&self, atom: Atom) -> Option<Rc<str>> {
        self.atoms.atom_to_str(atom).ok()
    }

    pub fn atom_ref_count(&self, atom: Atom) -> Option<u32> {
        self.atoms.ref_count_of(atom)
    }

    // ------------------------------------------------------------------
    // Object cache
    // ------------------------------------------------------------------

    /// Borrowed handle of the bridge object for `managed`; dup before storing.
    pub fn try_get_native_handle(&self, managed: &Rc<dyn Any>) -> Option<Value> {
        self.object_cache
            .try_get_native_handle(managed)
            .filter(|h| self.is_live(*h))
    }

    /// Owned handle of the bridge object for `managed`, allocating one with
    /// `proto` when the object is not bridged yet.
    pub fn bind_new_bridge_object(&mut self, managed: &Rc<dyn Any>, proto: Value) -> Value {
        self.bind_bridge_object(managed, proto, BridgeKind::Object)
    }

    pub(crate) fn bind_bridge_object(
        &mut self,
        managed: &Rc<dyn Any>,
        proto: Value,
        kind: BridgeKind,
    ) -> Value {
        if let Some(existing) = self.try_get_native_handle(managed) {
            return self.dup_value(existing);
        }
        let header = self.object_cache.next_header(kind);
        let proto = if proto.is_object() {
            self.dup_value(proto)
        } else {
            Value::NULL
        };
        let handle = self.alloc_object(ObjectClass::Bridge(header), proto);
        self.object_cache.register(header, managed, handle);
        handle
    }

    pub fn payload_header(&self, handle: Value) -> Option<PayloadHeader> {
        self.obj(handle)?.payload_header()
    }

    pub fn try_get_managed(&self, handle: Value) -> Option<Rc<dyn Any>> {
        let header = self.payload_header(handle)?;
        self.object_cache.get_managed(header)
    }

    pub fn get_managed(&self, header: PayloadHeader) -> Option<Rc<dyn Any>> {
        self.object_cache.get_managed(header)
    }

    pub fn remove_by_payload_header(&mut self, header: PayloadHeader) -> bool {
        self.object_cache.remove_by_payload_header(header)
    }

    /// Managed side is being disposed first; detaches the bridge object.
    pub fn remove_managed(&mut self, managed: &Rc<dyn Any>) -> bool {
        self.object_cache.remove_managed(managed).is_some()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    pub(crate) fn teardown(&mut self) {
        if self.state == ContextState::Destroyed {
            return;
        }
        let dropped_jobs = self.jobs.clear();
        let timers = self.timers.clear();
        self.free_values(&timers);
        self.flush_modules();
        let statics: Vec<Value> = self.static_modules.drain(..).map(|(_, v)| v).collect();
        self.free_values(&statics);
        let factories: Vec<Value> = self.defined_modules.drain(..).map(|(_, d)| d.factory).collect();
        self.free_values(&factories);

        let bridged = self.object_cache.clear();
        let builtins = std::mem::replace(&mut self.builtins, Builtins::empty());
        self.free_values(&builtins.owned_values());
        if let Some(exc) = self.pending_exception.take() {
            self.free_value(exc);
        }
        self.atom_cache.release(&mut self.atoms);

        // Reference cycles (intrinsics included) and leaked handles.
        let leftovers = self.heap.drain();
        let unreclaimed = leftovers.len();
        for (_, obj) in leftovers {
            if let HeapObject::Object(o) = obj {
                if let Some(header) = o.payload_header() {
                    self.shared.finalize(header);
                }
            }
        }
        let atoms_left = self.atoms.clear();
        log::debug!(
            "{}: destroyed (jobs dropped={dropped_jobs}, bridged={bridged}, \
             unreclaimed={unreclaimed}, atoms={atoms_left})",
            self.id
        );
        self.state = ContextState::Destroyed;
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown();
    }
}
