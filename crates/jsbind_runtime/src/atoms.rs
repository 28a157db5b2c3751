//! Atom table and per-context atom cache.

use std::rc::Rc;

use jsbind_core::{FastHashMap, HeapError, RcHeap, RefOutcome, SlotId, fast_map_new};

/// Interned string handle. Refcounted like a heap slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u64);

impl Atom {
    pub const NULL: Atom = Atom(0);

    fn slot(self) -> SlotId {
        SlotId(self.0)
    }
}

/// String intern table. Identical content always maps to the same atom while
/// that atom is live.
pub struct AtomTable {
    heap: RcHeap<Rc<str>>,
    index: FastHashMap<Rc<str>, Atom>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            heap: RcHeap::new(),
            index: fast_map_new(),
        }
    }

    /// Returns an owned atom for `name`, dup'ing an existing one when present.
    pub fn new_atom(&mut self, name: &str) -> Atom {
        if let Some(&atom) = self.index.get(name) {
            if self.heap.ref_count(atom.slot(), 1).is_ok() {
                return atom;
            }
            self.index.remove(name);
        }
        let key: Rc<str> = Rc::from(name);
        match self.heap.push(key.clone()) {
            Ok(slot) => {
                let atom = Atom(slot.0);
                self.index.insert(key, atom);
                atom
            }
            Err(e) => {
                log::error!("atom '{name}' not interned: {e}");
                Atom::NULL
            }
        }
    }

    pub fn dup_atom(&mut self, atom: Atom) -> Result<Atom, HeapError> {
        self.heap.ref_count(atom.slot(), 1)?;
        Ok(atom)
    }

    pub fn free_atom(&mut self, atom: Atom) -> Result<(), HeapError> {
        if let RefOutcome::Evicted(name) = self.heap.adjust(atom.slot(), -1)? {
            self.index.remove(&name);
        }
        Ok(())
    }

    pub fn atom_to_str(&self, atom: Atom) -> Result<Rc<str>, HeapError> {
        self.heap.get(atom.slot()).cloned()
    }

    pub fn lookup(&self, name: &str) -> Option<Atom> {
        self.index.get(name).copied()
    }

    pub fn ref_count_of(&self, atom: Atom) -> Option<u32> {
        self.heap.count_of(atom.slot())
    }

    pub fn live_count(&self) -> usize {
        self.heap.live_count()
    }

    pub(crate) fn clear(&mut self) -> usize {
        self.index.clear();
        self.heap.drain().len()
    }
}

/// Memoized name -> atom lookups. Holds exactly one reference per distinct
/// name until `release` runs at context teardown.
pub struct AtomCache {
    atoms: FastHashMap<Rc<str>, Atom>,
}

impl AtomCache {
    pub fn new() -> Self {
        Self {
            atoms: fast_map_new(),
        }
    }

    /// Borrowed atom for `name`; the caller must not free it.
    pub fn get_atom(&mut self, table: &mut AtomTable, name: &str) -> Atom {
        if let Some(&atom) = self.atoms.get(name) {
            return atom;
        }
        let atom = table.new_atom(name);
        self.atoms.insert(Rc::from(name), atom);
        atom
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn release(&mut self, table: &mut AtomTable) {
        for (name, atom) in self.atoms.drain() {
            if let Err(e) = table.free_atom(atom) {
                log::error!("atom cache release of {name:?} failed: {e}");
            }
        }
    }
}

macro_rules! well_known_atoms {
    ($($field:ident => $name:literal),* $(,)?) => {
        /// Property names registered at context construction. Borrowed from
        /// the atom cache, so they live exactly as long as the context.
        #[derive(Clone, Copy, Debug)]
        pub struct WellKnownAtoms {
            $(pub $field: Atom,)*
        }

        impl WellKnownAtoms {
            pub(crate) fn register(cache: &mut AtomCache, table: &mut AtomTable) -> Self {
                Self {
                    $($field: cache.get_atom(table, $name),)*
                }
            }
        }
    };
}

well_known_atoms! {
    constructor => "constructor",
    prototype => "prototype",
    length => "length",
    name => "name",
    message => "message",
    stack => "stack",
    exports => "exports",
    module => "module",
    id => "id",
    filename => "filename",
    dirname => "dirname",
    loaded => "loaded",
    parent => "parent",
    children => "children",
    require => "require",
    module_id => "moduleId",
    main => "main",
    cache => "cache",
    before_serialize => "OnBeforeSerialize",
    after_deserialize => "OnAfterDeserialize",
    before_script_reload => "OnBeforeScriptReload",
    after_script_reload => "OnAfterScriptReload",
    reset => "Reset",
}
