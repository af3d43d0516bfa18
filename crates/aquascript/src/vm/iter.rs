//! Iteration protocol: `GET_ITER`, `FOR_ITER`, `LIST_APPEND`, per spec.md
//! §4.5. Only list, tuple, and string are iterable — dicts are an
//! explicit `RuntimeError`, not an invented ordering (§9 / DESIGN.md).

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{IterState, Value};

use super::exceptions::RuntimeError;
use super::Vm;

impl Vm {
    pub(super) fn op_get_iter(&mut self) -> Result<(), RuntimeError> {
        let v = self.pop();
        let length = match &v {
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Str(s) => s.chars().count(),
            other => return Err(self.fatal(format!("'{}' is not iterable", other.type_name()))),
        };
        self.push(Value::Iterator(Rc::new(RefCell::new(IterState { sequence: v, cursor: 0, length }))));
        Ok(())
    }

    /// Peeks the top-of-stack iterator. On exhaustion, pops it and jumps
    /// to `end`; otherwise pushes the next element and falls through.
    pub(super) fn op_for_iter(&mut self, end: i64) -> Result<(), RuntimeError> {
        let Value::Iterator(state) = self.stack.last().expect("FOR_ITER with empty stack").clone() else {
            return Err(self.fatal("FOR_ITER on a non-iterator value"));
        };
        let mut state_mut = state.borrow_mut();
        if state_mut.cursor >= state_mut.length {
            drop(state_mut);
            self.pop();
            self.set_pc(end as usize);
            return Ok(());
        }
        let cursor = state_mut.cursor;
        state_mut.cursor += 1;
        let element = match &state_mut.sequence {
            Value::List(items) => items.borrow()[cursor].clone(),
            Value::Tuple(items) => items[cursor].clone(),
            Value::Str(s) => Value::str(s.chars().nth(cursor).expect("iterator cursor in range").to_string()),
            _ => unreachable!("GET_ITER only ever wraps list/tuple/str"),
        };
        drop(state_mut);
        self.push(element);
        Ok(())
    }

    /// Pops the element on top, appends it to the list sitting directly
    /// below the (still-active) iterator, per spec.md §4.5.
    pub(super) fn op_list_append(&mut self) -> Result<(), RuntimeError> {
        let element = self.pop();
        let list_idx = self
            .stack
            .len()
            .checked_sub(2)
            .ok_or_else(|| self.fatal("LIST_APPEND with too few stack items"))?;
        match &self.stack[list_idx] {
            Value::List(items) => {
                items.borrow_mut().push(element);
                Ok(())
            }
            other => Err(self.fatal(format!("LIST_APPEND target is not a list: '{}'", other.type_name()))),
        }
    }
}
