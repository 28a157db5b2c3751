use std::rc::Rc;

use jsbind_core::{HeapError, Value};

use super::{Context, ErrorKind};
use crate::errors::{JsResult, messages};
use crate::object::{FunctionKind, HeapObject, JsObject, ObjectClass};

const MAX_STRINGIFY_DEPTH: usize = 32;

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl Context {
    /// Takes ownership of `proto`. Yields `undefined` once the heap has run
    /// out of slot ids.
    pub(crate) fn alloc_object(&mut self, class: ObjectClass, proto: Value) -> Value {
        let obj = JsObject::new(class, proto);
        if self.heap.is_exhausted() {
            let owned = obj.owned_values();
            self.free_values(&owned);
            self.report_violation(HeapError::IdsExhausted);
            return Value::UNDEFINED;
        }
        match self.heap.push(HeapObject::Object(obj)) {
            Ok(slot) => Value::object(slot),
            Err(e) => {
                self.report_violation(e);
                Value::UNDEFINED
            }
        }
    }

    pub fn new_string(&mut self, s: &str) -> Value {
        match self.heap.push(HeapObject::String(Rc::from(s))) {
            Ok(slot) => Value::string(slot),
            Err(e) => {
                self.report_violation(e);
                Value::UNDEFINED
            }
        }
    }

    /// Builds a string from host bytes. A single trailing NUL is dropped and
    /// invalid UTF-8 is replaced.
    pub fn new_string_from_bytes(&mut self, bytes: &[u8]) -> Value {
        let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        let text = String::from_utf8_lossy(bytes);
        self.new_string(&text)
    }

    /// UTF-8 bytes of `v` followed by a NUL terminator.
    pub fn to_cstring_bytes(&mut self, v: Value) -> JsResult<Vec<u8>> {
        let mut bytes = self.to_rust_string(v)?.into_bytes();
        bytes.push(0);
        Ok(bytes)
    }

    pub fn new_object(&mut self) -> Value {
        let proto = self.dup_value(self.builtins.object_proto);
        self.alloc_object(ObjectClass::Plain, proto)
    }

    /// Borrows `proto`; a non-object prototype yields a null-prototype object.
    pub fn new_object_with_proto(&mut self, proto: Value) -> Value {
        let proto = if proto.is_object() {
            self.dup_value(proto)
        } else {
            Value::NULL
        };
        self.alloc_object(ObjectClass::Plain, proto)
    }

    pub fn new_array(&mut self) -> Value {
        self.new_array_from(Vec::new())
    }

    /// Takes ownership of `items`.
    pub fn new_array_from(&mut self, items: Vec<Value>) -> Value {
        let proto = self.dup_value(self.builtins.array_proto);
        self.alloc_object(ObjectClass::Array(items), proto)
    }

    pub fn is_function(&self, v: Value) -> bool {
        self.obj(v).is_some_and(JsObject::is_function)
    }

    pub fn function_kind(&self, v: Value) -> Option<FunctionKind> {
        match self.obj(v)?.class {
            ObjectClass::Function { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_array(&self, v: Value) -> bool {
        self.obj(v).is_some_and(JsObject::is_array)
    }

    pub fn is_error(&self, v: Value) -> bool {
        self.obj(v)
            .is_some_and(|o| matches!(o.class, ObjectClass::Error))
    }

    pub fn array_len(&self, v: Value) -> Option<usize> {
        match &self.obj(v)?.class {
            ObjectClass::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Owned element `index` of an array; undefined when out of range.
    pub fn get_index(&mut self, array: Value, index: usize) -> JsResult<Value> {
        let item = match self.obj(array).map(|o| &o.class) {
            Some(ObjectClass::Array(items)) => items.get(index).copied(),
            _ => return Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT)),
        };
        Ok(match item {
            Some(v) => self.dup_value(v),
            None => Value::UNDEFINED,
        })
    }

    /// Appends `value` (owned) to an array.
    pub fn push_element(&mut self, array: Value, value: Value) -> JsResult<()> {
        match self.obj_mut(array).map(|o| &mut o.class) {
            Some(ObjectClass::Array(items)) => {
                items.push(value);
                Ok(())
            }
            _ => {
                self.free_value(value);
                Err(self.throw_error(ErrorKind::TypeError, messages::NOT_AN_OBJECT))
            }
        }
    }

    pub fn string_content(&self, v: Value) -> Option<Rc<str>> {
        if !v.is_string() {
            return None;
        }
        match self.heap.get(v.slot()?) {
            Ok(HeapObject::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn to_rust_string(&mut self, v: Value) -> JsResult<String> {
        self.stringify(v, 0)
    }

    fn stringify(&mut self, v: Value, depth: usize) -> JsResult<String> {
        if v.is_undefined() {
            return Ok("undefined".to_string());
        }
        if v.is_null() {
            return Ok("null".to_string());
        }
        if v.is_bool() {
            return Ok(v.as_bool().to_string());
        }
        if let Some(n) = v.as_number() {
            return Ok(format_number(n));
        }
        if v.is_string() {
            return match self.string_content(v) {
                Some(s) => Ok(s.to_string()),
                None => Err(self.throw_error(ErrorKind::ReferenceError, messages::DETACHED_HANDLE)),
            };
        }
        if v.is_exception() {
            return Ok("[exception]".to_string());
        }
        if depth >= MAX_STRINGIFY_DEPTH {
            return Ok(String::new());
        }

        enum Shape {
            Array(Vec<Value>),
            Error,
            Function(Rc<str>),
            Other,
        }
        let shape = match self.obj(v).map(|o| &o.class) {
            Some(ObjectClass::Array(items)) => Shape::Array(items.clone()),
            Some(ObjectClass::Error) => Shape::Error,
            Some(ObjectClass::Function { name, .. }) => Shape::Function(name.clone()),
            Some(_) => Shape::Other,
            None => {
                return Err(self.throw_error(ErrorKind::ReferenceError, messages::DETACHED_HANDLE));
            }
        };
        match shape {
            Shape::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    if item.is_nullish() {
                        parts.push(String::new());
                    } else {
                        parts.push(self.stringify(item, depth + 1)?);
                    }
                }
                Ok(parts.join(","))
            }
            Shape::Error => {
                let name = self.get_property(v, self.names.name)?;
                let message = match self.get_property(v, self.names.message) {
                    Ok(m) => m,
                    Err(t) => {
                        self.free_value(name);
                        return Err(t);
                    }
                };
                let name_s = self.stringify(name, depth + 1);
                let message_s = self.stringify(message, depth + 1);
                self.free_value(name);
                self.free_value(message);
                let (name_s, message_s) = (name_s?, message_s?);
                Ok(if message_s.is_empty() {
                    name_s
                } else {
                    format!("{name_s}: {message_s}")
                })
            }
            Shape::Function(name) => Ok(format!("function {name}() {{ [native code] }}")),
            Shape::Other => Ok("[object Object]".to_string()),
        }
    }

    pub fn to_number(&mut self, v: Value) -> JsResult<f64> {
        if let Some(n) = v.as_number() {
            return Ok(n);
        }
        if v.is_bool() {
            return Ok(if v.as_bool() { 1.0 } else { 0.0 });
        }
        if v.is_null() {
            return Ok(0.0);
        }
        if v.is_undefined() {
            return Ok(f64::NAN);
        }
        if v.is_string() {
            let s = self.to_rust_string(v)?;
            let t = s.trim();
            if t.is_empty() {
                return Ok(0.0);
            }
            return Ok(match t {
                "Infinity" | "+Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => t.parse::<f64>().unwrap_or(f64::NAN),
            });
        }
        if self.is_array(v) {
            let s = self.to_rust_string(v)?;
            let tmp = self.new_string(&s);
            let n = self.to_number(tmp);
            self.free_value(tmp);
            return n;
        }
        Ok(f64::NAN)
    }

    /// Script truthiness.
    pub fn to_bool(&self, v: Value) -> bool {
        if v.is_bool() {
            return v.as_bool();
        }
        if let Some(n) = v.as_number() {
            return n != 0.0 && !n.is_nan();
        }
        if v.is_string() {
            return self.string_content(v).is_some_and(|s| !s.is_empty());
        }
        v.is_object()
    }

    /// Strict equality on primitive content; objects compare by identity.
    pub fn strict_equals(&self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return x == y;
        }
        if a.is_string() && b.is_string() {
            return self.string_content(a) == self.string_content(b);
        }
        a == b
    }
}
