//! Bidirectional managed object <-> bridge object registry.
//!
//! The cache never owns either side: managed objects are held weakly and the
//! native handle is stored without a reference, so the engine's refcount can
//! reach zero and drive removal through the finalizer path.

use std::any::Any;
use std::rc::{Rc, Weak};

use jsbind_core::{FastHashMap, Value, fast_map_new};

use crate::object::{BridgeKind, PayloadHeader};

struct ObjectEntry {
    managed: Weak<dyn Any>,
    handle: Value,
    addr: usize,
}

pub struct ObjectCache {
    entries: FastHashMap<u32, ObjectEntry>,
    by_managed: FastHashMap<usize, u32>,
    next_object_id: u32,
}

pub(crate) fn managed_addr(managed: &Rc<dyn Any>) -> usize {
    Rc::as_ptr(managed) as *const () as usize
}

impl ObjectCache {
    pub fn new() -> Self {
        Self {
            entries: fast_map_new(),
            by_managed: fast_map_new(),
            next_object_id: 1,
        }
    }

    /// Borrowed native handle for `managed`, if it is currently bridged.
    pub fn try_get_native_handle(&self, managed: &Rc<dyn Any>) -> Option<Value> {
        let object_id = self.by_managed.get(&managed_addr(managed))?;
        let entry = self.entries.get(object_id)?;
        // A dead weak means the address was recycled by a new allocation.
        if entry.managed.strong_count() == 0 {
            return None;
        }
        Some(entry.handle)
    }

    /// Reserve a header for a new bridge object; `register` completes it.
    pub(crate) fn next_header(&mut self, kind: BridgeKind) -> PayloadHeader {
        let object_id = self.next_object_id;
        self.next_object_id += 1;
        PayloadHeader { kind, object_id }
    }

    pub(crate) fn register(&mut self, header: PayloadHeader, managed: &Rc<dyn Any>, handle: Value) {
        let addr = managed_addr(managed);
        if let Some(stale) = self.by_managed.insert(addr, header.object_id) {
            self.entries.remove(&stale);
        }
        self.entries.insert(
            header.object_id,
            ObjectEntry {
                managed: Rc::downgrade(managed),
                handle,
                addr,
            },
        );
    }

    pub fn get_managed(&self, header: PayloadHeader) -> Option<Rc<dyn Any>> {
        self.entries.get(&header.object_id)?.managed.upgrade()
    }

    pub fn handle_of(&self, header: PayloadHeader) -> Option<Value> {
        self.entries.get(&header.object_id).map(|e| e.handle)
    }

    /// Finalizer path: the engine reclaimed the bridge object.
    pub fn remove_by_payload_header(&mut self, header: PayloadHeader) -> bool {
        let Some(entry) = self.entries.remove(&header.object_id) else {
            return false;
        };
        if self.by_managed.get(&entry.addr) == Some(&header.object_id) {
            self.by_managed.remove(&entry.addr);
        }
        true
    }

    /// Managed-side disposal path; the bridge object stays alive in script
    /// but no longer resolves to a managed object.
    pub fn remove_managed(&mut self, managed: &Rc<dyn Any>) -> Option<Value> {
        let object_id = self.by_managed.remove(&managed_addr(managed))?;
        self.entries.remove(&object_id).map(|e| e.handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        self.by_managed.clear();
        n
    }
}
