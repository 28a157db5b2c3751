use std::rc::Rc;

use jsbind_core::Value;

use super::{Context, ErrorKind};
use crate::atoms::Atom;
use crate::errors::{JsResult, messages};
use crate::object::{JsObject, ObjectClass, PropFlags, Property};

const MAX_PROTO_DEPTH: usize = 1024;
/// Arrays are stored densely; indices at or past this bound are rejected.
const MAX_ARRAY_LENGTH: usize = 1 << 24;

enum Read {
    Data(Value),
    Int(i32),
    FnName(Rc<str>),
    Getter(Value),
    Next(Value),
    Missing,
}

enum Write {
    Own,
    Add,
    ReadOnly,
    Setter(Value),
    Next(Value),
}

fn read_own(o: &JsObject, atom: Atom, index: Option<usize>, length: Atom, name: Atom) -> Read {
    if let ObjectClass::Array(items) = &o.class {
        if let Some(i) = index {
            return match items.get(i) {
                Some(v) => Read::Data(*v),
                None => Read::Missing,
            };
        }
        if atom == length {
            return Read::Int(items.len() as i32);
        }
    }
    match o.props.get(&atom) {
        Some(Property::Data { value, .. }) => Read::Data(*value),
        Some(Property::Accessor { getter, .. }) => Read::Getter(*getter),
        None => match &o.class {
            ObjectClass::Function { name: fn_name, .. } if atom == name => {
                Read::FnName(fn_name.clone())
            }
            _ if o.proto.is_object() => Read::Next(o.proto),
            _ => Read::Missing,
        },
    }
}

impl Context {
    /// Canonical array index spelled by `atom`, if any.
    pub(crate) fn atom_index(&self, atom: Atom) -> Option<usize> {
        let s = self.atoms.atom_to_str(atom).ok()?;
        let first = s.as_bytes().first()?;
        if !first.is_ascii_digit() || (s.len() > 1 && *first == b'0') {
            return None;
        }
        s.parse::<u32>().ok().map(|i| i as usize)
    }

    fn atom_label(&self, atom: Atom) -> String {
        self.atom_to_string(atom)
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("<atom {}>", atom.0))
    }

    fn detached(&mut self) -> crate::errors::Thrown {
        self.throw_error(ErrorKind::ReferenceError, messages::DETACHED_HANDLE)
    }

    /// Owned value of property `atom`, walking the prototype chain.
    pub fn get_property(&mut self, obj: Value, atom: Atom) -> JsResult<Value> {
        if obj.is_nullish() {
            let msg = format!("{} (reading '{}')", messages::READ_OF_NULLISH, self.atom_label(atom));
            return Err(self.throw_error(ErrorKind::TypeError, &msg));
        }
        if obj.is_string() {
            if atom == self.names.length {
                let len = self.string_content(obj).map_or(0, |s| s.encode_utf16().count());
                return Ok(Value::from_i32(len as i32));
            }
            return Ok(Value::UNDEFINED);
        }
        if !obj.is_object() {
            return Ok(Value::UNDEFINED);
        }
        let index = self.atom_index(atom);
        let (length, name) = (self.names.length, self.names.name);
        let mut cur = obj;
        for _ in 0..MAX_PROTO_DEPTH {
            let step = match self.obj(cur) {
                Some(o) => read_own(o, atom, index, length, name),
                None => return Err(self.detached()),
            };
            match step {
                Read::Data(v) => return Ok(self.dup_value(v)),
                Read::Int(n) => return Ok(Value::from_i32(n)),
                Read::FnName(n) => return Ok(self.new_string(&n)),
                Read::Getter(g) => {
                    if !g.is_object() {
                        return Ok(Value::UNDEFINED);
                    }
                    let g = self.dup_value(g);
                    let r = self.call(g, obj, &[]);
                    self.free_value(g);
                    return r;
                }
                Read::Next(p) => cur = p,
                Read::Missing => return Ok(Value::UNDEFINED),
            }
        }
        Err(self.throw_error(ErrorKind::RangeError, messages::PROTOTYPE_CYCLE))
    }

    pub fn get_property_str(&mut self, obj: Value, name: &str) -> JsResult<Value> {
        let atom = self.get_atom(name);
        self.get_property(obj, atom)
    }

    /// Assigns `value` (owned) to `obj[atom]`, honouring setters and
    /// read-only properties along the prototype chain.
    pub fn set_property(&mut self, obj: Value, atom: Atom, value: Value) -> JsResult<()> {
        if !obj.is_object() {
            self.free_value(value);
            if obj.is_nullish() {
                let msg = format!("{} (setting '{}')", messages::WRITE_OF_NULLISH, self.atom_label(atom));
                return Err(self.throw_error(ErrorKind::TypeError, &msg));
            }
            return Ok(());
        }
        if self.is_array(obj) {
            if let Some(i) = self.atom_index(atom) {
                return self.set_element(obj, i, value);
            }
            if atom == self.names.length {
                let n = self.to_number(value);
                self.free_value(value);
                return self.set_array_length(obj, n?);
            }
        }

        let mut cur = obj;
        for _ in 0..MAX_PROTO_DEPTH {
            let step = match self.obj(cur) {
                None => {
                    self.free_value(value);
                    return Err(self.detached());
                }
                Some(o) => match o.props.get(&atom) {
                    Some(Property::Data { flags, .. }) if flags.contains(PropFlags::WRITABLE) => {
                        if cur == obj { Write::Own } else { Write::Add }
                    }
                    Some(Property::Data { .. }) => Write::ReadOnly,
                    Some(Property::Accessor { setter, .. }) if setter.is_object() => {
                        Write::Setter(*setter)
                    }
                    Some(Property::Accessor { .. }) => Write::ReadOnly,
                    None if o.proto.is_object() => Write::Next(o.proto),
                    None => Write::Add,
                },
            };
            match step {
                Write::Own => {
                    let old = match self.obj_mut(obj).and_then(|o| o.props.get_mut(&atom)) {
                        Some(Property::Data { value: slot, .. }) => std::mem::replace(slot, value),
                        _ => value,
                    };
                    self.free_value(old);
                    return Ok(());
                }
                Write::Add => {
                    self.put_own(obj, atom, value, PropFlags::C_W_E);
                    return Ok(());
                }
                Write::ReadOnly => {
                    self.free_value(value);
                    let msg = format!("{}: '{}'", messages::READ_ONLY, self.atom_label(atom));
                    return Err(self.throw_error(ErrorKind::TypeError, &msg));
                }
                Write::Setter(s) => {
                    let s = self.dup_value(s);
                    let r = self.call(s, obj, &[value]);
                    self.free_value(s);
                    self.free_value(value);
                    let r = r?;
                    self.free_value(r);
                    return Ok(());
                }
                Write::Next(p) => cur = p,
            }
        }
        self.free_value(value);
        Err(self.throw_error(ErrorKind::RangeError, messages::PROTOTYPE_CYCLE))
    }

    pub fn set_property_str(&mut self, obj: Value, name: &str, value: Value) -> JsResult<()> {
        let atom = self.get_atom(name);
        self.set_property(obj, atom, value)
    }

    fn set_element(&mut self, array: Value, index: usize, value: Value) -> JsResult<()> {
        let old = match self.obj_mut(array).map(|o| &mut o.class) {
            Some(ObjectClass::Array(items)) if index < MAX_ARRAY_LENGTH => {
                if index >= items.len() {
                    items.resize(index + 1, Value::UNDEFINED);
                }
                std::mem::replace(&mut items[index], value)
            }
            Some(ObjectClass::Array(_)) => {
                self.free_value(value);
                return Err(self.throw_error(ErrorKind::RangeError, messages::ARRAY_TOO_LARGE));
            }
            _ => {
                self.free_value(value);
                return Err(self.detached());
            }
        };
        self.free_value(old);
        Ok(())
    }

    fn set_array_length(&mut self, array: Value, n: f64) -> JsResult<()> {
        if !(n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64) {
            return Err(self.throw_error(ErrorKind::RangeError, "Invalid array length"));
        }
        let len = n as usize;
        if len > MAX_ARRAY_LENGTH {
            return Err(self.throw_error(ErrorKind::RangeError, messages::ARRAY_TOO_LARGE));
        }
        let removed = match self.obj_mut(array).map(|o| &mut o.class) {
            Some(ObjectClass::Array(items)) => {
                if len >= items.len() {
                    items.resize(len, Value::UNDEFINED);
                    Vec::new()
                } else {
                    items.split_off(len)
                }
            }
            _ => return Err(self.detached()),
        };
        self.free_values(&removed);
        Ok(())
    }

    /// Internal define of an own data property; takes ownership of `value`.
    pub(crate) fn put_own(&mut self, obj: Value, atom: Atom, value: Value, flags: PropFlags) {
        self.put_prop(obj, atom, Property::Data {
            value,
            flags: flags.attributes(),
        });
    }

    /// Internal define of an own accessor; takes ownership of both functions.
    pub(crate) fn put_accessor(
        &mut self,
        obj: Value,
        atom: Atom,
        getter: Value,
        setter: Value,
        flags: PropFlags,
    ) {
        self.put_prop(obj, atom, Property::Accessor {
            getter,
            setter,
            flags: flags.attributes(),
        });
    }

    fn put_prop(&mut self, obj: Value, atom: Atom, prop: Property) {
        let old = match self.obj_mut(obj) {
            Some(o) => o.props.insert(atom, prop),
            None => {
                let vals = prop.values();
                self.free_values(&vals);
                return;
            }
        };
        match old {
            Some(p) => {
                let vals = p.values();
                self.free_values(&vals);
            }
            None => {
                self.dup_atom(atom);
            }
        }
    }

    /// `Object.defineProperty` semantics. Takes ownership of `value`,
    /// `getter` and `setter`; the `HAS_*` bits select which ones apply.
    pub fn define_property(
        &mut self,
        obj: Value,
        atom: Atom,
        value: Value,
        getter: Value,
        setter: Value,
        flags: PropFlags,
    ) -> JsResult<bool> {
        if !obj.is_object() {
            self.free_values(&[value, getter, setter]);
            return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT));
        }
        let is_accessor = flags.intersects(PropFlags::HAS_GET | PropFlags::HAS_SET);
        if !is_accessor && self.is_array(obj) {
            if let Some(i) = self.atom_index(atom) {
                self.free_values(&[getter, setter]);
                if flags.contains(PropFlags::HAS_VALUE) {
                    self.set_element(obj, i, value)?;
                } else {
                    self.free_value(value);
                }
                return Ok(true);
            }
        }

        let existing = self
            .obj(obj)
            .and_then(|o| o.props.get(&atom))
            .map(|p| (p.flags(), p.values(), matches!(p, Property::Accessor { .. })));
        let current = existing.map(|e| e.0).unwrap_or_default();

        if let Some((cur_flags, _, cur_accessor)) = existing {
            if !cur_flags.contains(PropFlags::CONFIGURABLE) {
                let toggles_configurable =
                    flags.contains(PropFlags::HAS_CONFIGURABLE) && flags.contains(PropFlags::CONFIGURABLE);
                let toggles_enumerable = flags.contains(PropFlags::HAS_ENUMERABLE)
                    && flags.contains(PropFlags::ENUMERABLE) != cur_flags.contains(PropFlags::ENUMERABLE);
                let writable_data = !is_accessor && !cur_accessor && cur_flags.contains(PropFlags::WRITABLE);
                if toggles_configurable || toggles_enumerable || !writable_data {
                    self.free_values(&[value, getter, setter]);
                    let msg = format!("{}: '{}'", messages::NOT_CONFIGURABLE, self.atom_label(atom));
                    return Err(self.throw_error(ErrorKind::TypeError, &msg));
                }
            }
        }

        let pick = |has: PropFlags, bit: PropFlags| {
            if flags.contains(has) {
                flags.contains(bit)
            } else {
                current.contains(bit)
            }
        };
        let mut attrs = PropFlags::empty();
        if pick(PropFlags::HAS_CONFIGURABLE, PropFlags::CONFIGURABLE) {
            attrs |= PropFlags::CONFIGURABLE;
        }
        if pick(PropFlags::HAS_ENUMERABLE, PropFlags::ENUMERABLE) {
            attrs |= PropFlags::ENUMERABLE;
        }

        let prop = if is_accessor {
            self.free_value(value);
            let (cur_get, cur_set) = match existing {
                Some((_, [g, s], true)) => (g, s),
                _ => (Value::UNDEFINED, Value::UNDEFINED),
            };
            let getter = if flags.contains(PropFlags::HAS_GET) {
                getter
            } else {
                self.free_value(getter);
                self.dup_value(cur_get)
            };
            let setter = if flags.contains(PropFlags::HAS_SET) {
                setter
            } else {
                self.free_value(setter);
                self.dup_value(cur_set)
            };
            Property::Accessor {
                getter,
                setter,
                flags: attrs,
            }
        } else {
            self.free_values(&[getter, setter]);
            if pick(PropFlags::HAS_WRITABLE, PropFlags::WRITABLE) {
                attrs |= PropFlags::WRITABLE;
            }
            let value = if flags.contains(PropFlags::HAS_VALUE) {
                value
            } else {
                self.free_value(value);
                match existing {
                    Some((_, [v, _], false)) => self.dup_value(v),
                    _ => Value::UNDEFINED,
                }
            };
            Property::Data { value, flags: attrs }
        };
        self.put_prop(obj, atom, prop);
        Ok(true)
    }

    /// Data property with exactly the attributes in `flags`; takes `value`.
    pub fn define_property_value(
        &mut self,
        obj: Value,
        atom: Atom,
        value: Value,
        flags: PropFlags,
    ) -> JsResult<bool> {
        let flags = flags.attributes()
            | PropFlags::HAS_VALUE
            | PropFlags::HAS_CONFIGURABLE
            | PropFlags::HAS_WRITABLE
            | PropFlags::HAS_ENUMERABLE;
        self.define_property(obj, atom, value, Value::UNDEFINED, Value::UNDEFINED, flags)
    }

    /// Accessor property; takes `getter` and `setter`.
    pub fn define_property_getset(
        &mut self,
        obj: Value,
        atom: Atom,
        getter: Value,
        setter: Value,
        flags: PropFlags,
    ) -> JsResult<bool> {
        let flags = flags.attributes()
            | PropFlags::HAS_GET
            | PropFlags::HAS_SET
            | PropFlags::HAS_CONFIGURABLE
            | PropFlags::HAS_ENUMERABLE;
        self.define_property(obj, atom, Value::UNDEFINED, getter, setter, flags)
    }

    pub fn has_property(&self, obj: Value, atom: Atom) -> bool {
        let index = self.atom_index(atom);
        let mut cur = obj;
        for _ in 0..MAX_PROTO_DEPTH {
            let Some(o) = self.obj(cur) else {
                return false;
            };
            if let ObjectClass::Array(items) = &o.class {
                if index.is_some_and(|i| i < items.len()) || atom == self.names.length {
                    return true;
                }
            }
            if o.props.contains_key(&atom) {
                return true;
            }
            cur = o.proto;
        }
        false
    }

    pub fn has_own_property(&self, obj: Value, atom: Atom) -> bool {
        self.obj(obj).is_some_and(|o| o.props.contains_key(&atom))
    }

    /// Removes an own property. Returns `false` for non-configurable ones.
    pub fn delete_property(&mut self, obj: Value, atom: Atom) -> JsResult<bool> {
        if !obj.is_object() {
            return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT));
        }
        if self.is_array(obj) {
            if let Some(i) = self.atom_index(atom) {
                if self.array_len(obj).is_some_and(|n| i < n) {
                    self.set_element(obj, i, Value::UNDEFINED)?;
                }
                return Ok(true);
            }
        }
        let configurable = match self.obj(obj).and_then(|o| o.props.get(&atom)) {
            None => return Ok(true),
            Some(p) => p.flags().contains(PropFlags::CONFIGURABLE),
        };
        if !configurable {
            return Ok(false);
        }
        if let Some(p) = self.obj_mut(obj).and_then(|o| o.props.shift_remove(&atom)) {
            let vals = p.values();
            self.free_values(&vals);
            self.free_atom(atom);
        }
        Ok(true)
    }

    /// Owned atoms of the enumerable own properties, array indices first.
    pub fn get_own_property_names(&mut self, obj: Value) -> Vec<Atom> {
        let (len, keys) = match self.obj(obj) {
            Some(o) => {
                let len = match &o.class {
                    ObjectClass::Array(items) => items.len(),
                    _ => 0,
                };
                let keys: Vec<Atom> = o
                    .props
                    .iter()
                    .filter(|(_, p)| p.flags().contains(PropFlags::ENUMERABLE))
                    .map(|(a, _)| *a)
                    .collect();
                (len, keys)
            }
            None => return Vec::new(),
        };
        let mut out = Vec::with_capacity(len + keys.len());
        for i in 0..len {
            out.push(self.atoms.new_atom(&i.to_string()));
        }
        for atom in keys {
            out.push(self.dup_atom(atom));
        }
        out
    }

    pub fn get_prototype(&mut self, obj: Value) -> JsResult<Value> {
        if obj.is_nullish() {
            return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT));
        }
        let proto = self.obj(obj).map_or(Value::NULL, |o| o.proto);
        Ok(self.dup_value(proto))
    }

    /// Borrows `proto`, which must be an object or null.
    pub fn set_prototype(&mut self, obj: Value, proto: Value) -> JsResult<()> {
        if !obj.is_object() || !(proto.is_object() || proto.is_null()) {
            return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT));
        }
        self.check_prototype(obj, proto)?;
        let proto = self.dup_value(proto);
        let old = match self.obj_mut(obj) {
            Some(o) => std::mem::replace(&mut o.proto, proto),
            None => {
                self.free_value(proto);
                return Err(self.detached());
            }
        };
        self.free_value(old);
        Ok(())
    }

    /// Rejects `proto` if `obj` already appears on its prototype chain.
    pub(crate) fn check_prototype(&mut self, obj: Value, proto: Value) -> JsResult<()> {
        let mut cur = proto;
        for _ in 0..MAX_PROTO_DEPTH {
            if cur == obj {
                return Err(self.throw_error(ErrorKind::TypeError, messages::PROTOTYPE_CYCLE));
            }
            match self.obj(cur) {
                Some(o) => cur = o.proto,
                None => return Ok(()),
            }
        }
        Err(self.throw_error(ErrorKind::TypeError, messages::PROTOTYPE_CYCLE))
    }
}
