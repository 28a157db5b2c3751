use std::rc::Rc;

use indexmap::IndexMap;
use jsbind_core::Value;

use super::reload::ReloadBatch;
use super::resolver::ModuleResolver;

/// Index of a record in the module cache. Indices are never reused, so a
/// parent index held by a child simply stops resolving once the parent is
/// gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleIndex(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
    Loading,
    Loaded,
    ReloadPending,
}

pub struct ModuleRecord {
    pub(crate) id: String,
    pub(crate) filename: String,
    pub(crate) resolver: Rc<dyn ModuleResolver>,
    /// Owned `module` object; `exports` is read from it.
    pub(crate) module_obj: Value,
    /// Owned per-module `require` function.
    pub(crate) require_fn: Value,
    pub(crate) state: ModuleState,
    pub(crate) parent: Option<ModuleIndex>,
    pub(crate) children: Vec<ModuleIndex>,
}

impl ModuleRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn resolver_name(&self) -> &str {
        self.resolver.name()
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state != ModuleState::Loading
    }

    pub fn parent(&self) -> Option<ModuleIndex> {
        self.parent
    }

    pub fn children(&self) -> &[ModuleIndex] {
        &self.children
    }

    /// Borrowed `module` object.
    pub fn module_object(&self) -> Value {
        self.module_obj
    }
}

pub struct ModuleCache {
    records: Vec<Option<ModuleRecord>>,
    by_id: IndexMap<String, ModuleIndex>,
    main: Option<ModuleIndex>,
    pub(crate) reload: Option<ReloadBatch>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            by_id: IndexMap::new(),
            main: None,
            reload: None,
        }
    }

    pub fn get(&self, idx: ModuleIndex) -> Option<&ModuleRecord> {
        self.records.get(idx.0 as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, idx: ModuleIndex) -> Option<&mut ModuleRecord> {
        self.records.get_mut(idx.0 as usize)?.as_mut()
    }

    pub fn lookup(&self, id: &str) -> Option<ModuleIndex> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn insert(&mut self, record: ModuleRecord) -> ModuleIndex {
        let idx = ModuleIndex(self.records.len() as u32);
        self.by_id.insert(record.id.clone(), idx);
        self.records.push(Some(record));
        idx
    }

    /// Appends `child` to `parent.children` unless already present.
    pub(crate) fn link_child(&mut self, parent: ModuleIndex, child: ModuleIndex) {
        if parent == child {
            return;
        }
        if let Some(p) = self.get_mut(parent) {
            if !p.children.contains(&child) {
                p.children.push(child);
            }
        }
    }

    /// Drops a record and unlinks it from its parent.
    pub(crate) fn remove(&mut self, idx: ModuleIndex) -> Option<ModuleRecord> {
        let record = self.records.get_mut(idx.0 as usize)?.take()?;
        if self.by_id.get(&record.id) == Some(&idx) {
            self.by_id.shift_remove(&record.id);
        }
        if let Some(parent) = record.parent.and_then(|p| self.get_mut(p)) {
            parent.children.retain(|c| *c != idx);
        }
        if self.main == Some(idx) {
            self.main = None;
        }
        Some(record)
    }

    pub fn main(&self) -> Option<ModuleIndex> {
        self.main
    }

    pub(crate) fn set_main(&mut self, idx: ModuleIndex) {
        self.main = Some(idx);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<ModuleRecord> {
        self.by_id.clear();
        self.main = None;
        self.reload = None;
        self.records.drain(..).flatten().collect()
    }
}
