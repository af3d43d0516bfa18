//! Aggregate-building and access opcodes, per spec.md §4.5: `BUILD_LIST`,
//! `BUILD_DICT`, `BUILD_TUPLE`, `LEN`, `GET_ITEM`, `SET_ITEM`, `GET_ATTR`,
//! `SET_ATTR`, `FORMAT_VALUE`.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::{DictKey, Value};

use super::exceptions::RuntimeError;
use super::Vm;

impl Vm {
    pub(super) fn op_build_list(&mut self, n: usize) {
        let items = self.pop_n(n);
        self.push(Value::list(items));
    }

    pub(super) fn op_build_tuple(&mut self, n: usize) {
        let items = self.pop_n(n);
        self.push(Value::Tuple(Rc::new(items)));
    }

    pub(super) fn op_build_dict(&mut self, n: usize) -> Result<(), RuntimeError> {
        let mut pairs = self.pop_n(2 * n);
        let mut entries = IndexMap::with_capacity(n);
        // pop_n preserves emission order; consume key,value pairs left to right.
        let mut iter = pairs.drain(..);
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            let key = DictKey::from_value(&k).map_err(|e| self.fatal(e))?;
            entries.insert(key, v);
        }
        self.push(Value::dict(entries));
        Ok(())
    }

    pub(super) fn op_len(&mut self) -> Result<(), RuntimeError> {
        let v = self.pop();
        let len = match &v {
            Value::Str(s) => s.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Dict(entries) => entries.borrow().len(),
            other => return Err(self.fatal(format!("object of type '{}' has no len()", other.type_name()))),
        };
        self.push(Value::Int(len as i64));
        Ok(())
    }

    fn normalize_index(len: usize, index: i64) -> Option<usize> {
        let resolved = if index < 0 { index + len as i64 } else { index };
        if resolved < 0 || resolved as usize >= len {
            None
        } else {
            Some(resolved as usize)
        }
    }

    pub(super) fn op_get_item(&mut self) -> Result<(), RuntimeError> {
        let index = self.pop();
        let obj = self.pop();
        let result = match (&obj, &index) {
            (Value::List(items), Value::Int(i)) => {
                let items = items.borrow();
                let idx = Self::normalize_index(items.len(), *i).ok_or_else(|| self.fatal("list index out of range"))?;
                items[idx].clone()
            }
            (Value::Tuple(items), Value::Int(i)) => {
                let idx = Self::normalize_index(items.len(), *i).ok_or_else(|| self.fatal("tuple index out of range"))?;
                items[idx].clone()
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = Self::normalize_index(chars.len(), *i).ok_or_else(|| self.fatal("string index out of range"))?;
                Value::str(chars[idx].to_string())
            }
            (Value::Dict(entries), key) => {
                let key = DictKey::from_value(key).map_err(|e| self.fatal(e))?;
                entries.borrow().get(&key).cloned().ok_or_else(|| self.fatal(format!("key not found: {key}")))?
            }
            _ => return Err(self.fatal(format!("'{}' is not subscriptable", obj.type_name()))),
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_set_item(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop();
        let index = self.pop();
        let obj = self.pop();
        match (&obj, &index) {
            (Value::List(items), Value::Int(i)) => {
                let mut items = items.borrow_mut();
                let idx = Self::normalize_index(items.len(), *i).ok_or_else(|| self.fatal("list index out of range"))?;
                items[idx] = value;
            }
            (Value::Dict(entries), key) => {
                let key = DictKey::from_value(key).map_err(|e| self.fatal(e))?;
                entries.borrow_mut().insert(key, value);
            }
            _ => return Err(self.fatal(format!("'{}' does not support item assignment", obj.type_name()))),
        }
        Ok(())
    }

    pub(super) fn op_get_attr(&mut self, name: &str) -> Result<(), RuntimeError> {
        let obj = self.pop();
        let result = match &obj {
            Value::Instance(inst) => {
                let inst = inst.borrow();
                if let Some(v) = inst.attrs.get(name) {
                    v.clone()
                } else if let Some(key) = self.classes.resolve_method(inst.class, name) {
                    Value::FunctionRef(Rc::from(key))
                } else {
                    return Err(self.fatal(format!("attribute not found: '{name}'")));
                }
            }
            Value::Class(id) => {
                let id = *id;
                match self.classes.resolve_method(id, name) {
                    Some(key) => Value::FunctionRef(Rc::from(key)),
                    None => return Err(self.fatal(format!("attribute not found: '{name}'"))),
                }
            }
            Value::Exception(exc) => match name {
                "type_name" => Value::str(exc.type_name.clone()),
                "message" => Value::str(exc.message.clone()),
                _ => return Err(self.fatal(format!("attribute not found: '{name}'"))),
            },
            other => return Err(self.fatal(format!("'{}' has no attribute '{name}'", other.type_name()))),
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_set_attr(&mut self, name: &str) -> Result<(), RuntimeError> {
        let value = self.pop();
        let obj = self.pop();
        match &obj {
            Value::Instance(inst) => {
                inst.borrow_mut().attrs.insert(name.to_string(), value);
                Ok(())
            }
            other => Err(self.fatal(format!("'{}' does not support attribute assignment", other.type_name()))),
        }
    }

    pub(super) fn op_format_value(&mut self) {
        let v = self.pop();
        self.push(Value::str(v.to_string()));
    }
}
