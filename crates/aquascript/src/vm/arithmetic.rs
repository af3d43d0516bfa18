//! Arithmetic, comparison, and logic opcodes, per spec.md §4.5.

use crate::value::Value;

use super::exceptions::RuntimeError;
use super::Vm;

/// Numeric promotion result: both operands coerced to a common
/// representation for an arithmetic op.
enum Num {
    Int(i64, i64),
    Float(f64, f64),
}

impl Vm {
    fn numeric(&self, a: &Value, b: &Value, op: &str) -> Result<Num, RuntimeError> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(Num::Int(*x, *y)),
            (Value::Int(x), Value::Float(y)) => Ok(Num::Float(*x as f64, *y)),
            (Value::Float(x), Value::Int(y)) => Ok(Num::Float(*x, *y as f64)),
            (Value::Float(x), Value::Float(y)) => Ok(Num::Float(*x, *y)),
            _ => Err(self.fatal(format!(
                "unsupported operand types for {op}: '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    pub(super) fn op_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => Value::str(format!("{x}{y}")),
            (Value::List(x), Value::List(y)) => {
                let mut items = x.borrow().clone();
                items.extend(y.borrow().iter().cloned());
                Value::list(items)
            }
            (Value::Tuple(x), Value::Tuple(y)) => {
                let mut items = (**x).clone();
                items.extend(y.iter().cloned());
                Value::Tuple(std::rc::Rc::new(items))
            }
            _ => match self.numeric(&a, &b, "+")? {
                Num::Int(x, y) => Value::Int(x.wrapping_add(y)),
                Num::Float(x, y) => Value::Float(x + y),
            },
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_sub(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match self.numeric(&a, &b, "-")? {
            Num::Int(x, y) => Value::Int(x.wrapping_sub(y)),
            Num::Float(x, y) => Value::Float(x - y),
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_mul(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                Value::str(s.repeat((*n).max(0) as usize))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let base = items.borrow();
                let mut out = Vec::with_capacity(base.len() * (*n).max(0) as usize);
                for _ in 0..(*n).max(0) {
                    out.extend(base.iter().cloned());
                }
                Value::list(out)
            }
            _ => match self.numeric(&a, &b, "*")? {
                Num::Int(x, y) => Value::Int(x.wrapping_mul(y)),
                Num::Float(x, y) => Value::Float(x * y),
            },
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_div(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match self.numeric(&a, &b, "/")? {
            Num::Int(_, 0) => return Err(self.fatal("division by zero")),
            Num::Int(x, y) => Value::Float(x as f64 / y as f64),
            Num::Float(x, y) => {
                if y == 0.0 {
                    return Err(self.fatal("division by zero"));
                }
                Value::Float(x / y)
            }
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_mod(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match self.numeric(&a, &b, "%")? {
            Num::Int(_, 0) => return Err(self.fatal("division by zero")),
            Num::Int(x, y) => Value::Int(x.rem_euclid(y)),
            Num::Float(x, y) => {
                if y == 0.0 {
                    return Err(self.fatal("division by zero"));
                }
                Value::Float(x.rem_euclid(y))
            }
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_pow(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match self.numeric(&a, &b, "**")? {
            Num::Int(x, y) if y >= 0 => {
                if let Ok(exp) = u32::try_from(y) {
                    Value::Int(x.wrapping_pow(exp))
                } else {
                    Value::Float((x as f64).powf(y as f64))
                }
            }
            Num::Int(x, y) => Value::Float((x as f64).powf(y as f64)),
            Num::Float(x, y) => Value::Float(x.powf(y)),
        };
        self.push(result);
        Ok(())
    }

    fn compare_values(&self, a: &Value, b: &Value) -> Result<std::cmp::Ordering, RuntimeError> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
            (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
            _ => match self.numeric(a, b, "comparison") {
                Ok(Num::Int(x, y)) => Ok(x.cmp(&y)),
                Ok(Num::Float(x, y)) => x.partial_cmp(&y).ok_or_else(|| self.fatal("cannot compare NaN")),
                Err(e) => Err(e),
            },
        }
    }

    pub(super) fn op_eq(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Bool(Value::values_equal(&a, &b)));
        Ok(())
    }

    pub(super) fn op_ne(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Bool(!Value::values_equal(&a, &b)));
        Ok(())
    }

    pub(super) fn op_lt(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let ord = self.compare_values(&a, &b)?;
        self.push(Value::Bool(ord.is_lt()));
        Ok(())
    }

    pub(super) fn op_gt(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let ord = self.compare_values(&a, &b)?;
        self.push(Value::Bool(ord.is_gt()));
        Ok(())
    }

    pub(super) fn op_le(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let ord = self.compare_values(&a, &b)?;
        self.push(Value::Bool(ord.is_le()));
        Ok(())
    }

    pub(super) fn op_ge(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let ord = self.compare_values(&a, &b)?;
        self.push(Value::Bool(ord.is_ge()));
        Ok(())
    }

    pub(super) fn op_in(&mut self) -> Result<(), RuntimeError> {
        let rhs = self.pop();
        let lhs = self.pop();
        let found = match &rhs {
            Value::Str(s) => match &lhs {
                Value::Str(needle) => s.contains(needle.as_ref()),
                _ => return Err(self.fatal("'in <str>' requires a string operand")),
            },
            Value::List(items) => items.borrow().iter().any(|v| Value::values_equal(v, &lhs)),
            Value::Tuple(items) => items.iter().any(|v| Value::values_equal(v, &lhs)),
            Value::Dict(entries) => match crate::value::DictKey::from_value(&lhs) {
                Ok(key) => entries.borrow().contains_key(&key),
                Err(_) => false,
            },
            other => return Err(self.fatal(format!("argument of type '{}' is not iterable", other.type_name()))),
        };
        self.push(Value::Bool(found));
        Ok(())
    }

    /// Eager `AND`/`OR`/`NOT`. The compiler never emits `AND`/`OR` (it
    /// re-lowers `and`/`or` to conditional jumps so short-circuiting falls
    /// out of control flow — see the Open Question resolution in
    /// DESIGN.md), but the opcodes are part of the authoritative set in
    /// spec.md §4.5 and are implemented here for completeness.
    pub(super) fn op_and(&mut self) {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Bool(a.is_truthy() && b.is_truthy()));
    }

    pub(super) fn op_or(&mut self) {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Bool(a.is_truthy() || b.is_truthy()));
    }

    pub(super) fn op_not(&mut self) {
        let a = self.pop();
        self.push(Value::Bool(!a.is_truthy()));
    }
}
