use jsbind_core::Value;
use serde_json::{Map, Number};

use super::{Context, ErrorKind};
use crate::errors::JsResult;
use crate::object::PropFlags;

const MAX_JSON_DEPTH: usize = 64;

impl Context {
    pub fn parse_json(&mut self, text: &str) -> JsResult<Value> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => Ok(self.json_to_value(&json)),
            Err(e) => Err(self.throw_error(ErrorKind::SyntaxError, &format!("JSON.parse: {e}"))),
        }
    }

    pub(crate) fn json_to_value(&mut self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::NULL,
            serde_json::Value::Bool(b) => Value::from_bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) if i32::try_from(i).is_ok() => Value::from_i32(i as i32),
                _ => Value::from_number(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => self.new_string(s),
            serde_json::Value::Array(items) => {
                let items = items.iter().map(|item| self.json_to_value(item)).collect();
                self.new_array_from(items)
            }
            serde_json::Value::Object(map) => {
                let obj = self.new_object();
                for (key, item) in map {
                    let value = self.json_to_value(item);
                    let atom = self.new_atom(key);
                    self.put_own(obj, atom, value, PropFlags::C_W_E);
                    self.free_atom(atom);
                }
                obj
            }
        }
    }

    /// `JSON.stringify`; `None` for values with no JSON form (undefined,
    /// functions).
    pub fn to_json(&mut self, v: Value) -> JsResult<Option<String>> {
        Ok(self.value_to_json(v, 0)?.map(|j| j.to_string()))
    }

    fn value_to_json(&mut self, v: Value, depth: usize) -> JsResult<Option<serde_json::Value>> {
        if v.is_undefined() || v.is_exception() || self.is_function(v) {
            return Ok(None);
        }
        if v.is_null() {
            return Ok(Some(serde_json::Value::Null));
        }
        if v.is_bool() {
            return Ok(Some(serde_json::Value::Bool(v.as_bool())));
        }
        if let Some(n) = v.as_number() {
            let json = if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                serde_json::Value::Number(Number::from(n as i64))
            } else {
                Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
            };
            return Ok(Some(json));
        }
        if v.is_string() {
            return Ok(Some(serde_json::Value::String(self.to_rust_string(v)?)));
        }
        if depth >= MAX_JSON_DEPTH {
            return Err(self.throw_error(ErrorKind::TypeError, "cyclic object value"));
        }
        if let Some(len) = self.array_len(v) {
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let item = self.get_index(v, i)?;
                let json = self.value_to_json(item, depth + 1);
                self.free_value(item);
                out.push(json?.unwrap_or(serde_json::Value::Null));
            }
            return Ok(Some(serde_json::Value::Array(out)));
        }
        let keys = self.get_own_property_names(v);
        let mut map = Map::new();
        let mut failed = None;
        for &atom in &keys {
            if failed.is_some() {
                break;
            }
            let item = match self.get_property(v, atom) {
                Ok(item) => item,
                Err(t) => {
                    failed = Some(t);
                    break;
                }
            };
            let json = self.value_to_json(item, depth + 1);
            self.free_value(item);
            match json {
                Ok(Some(j)) => {
                    if let Some(key) = self.atom_to_string(atom) {
                        map.insert(key.to_string(), j);
                    }
                }
                Ok(None) => {}
                Err(t) => failed = Some(t),
            }
        }
        for atom in keys {
            self.free_atom(atom);
        }
        match failed {
            Some(t) => Err(t),
            None => Ok(Some(serde_json::Value::Object(map))),
        }
    }
}
