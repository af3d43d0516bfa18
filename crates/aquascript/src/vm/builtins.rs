//! The fixed built-in function set, per spec.md §4.6.

use std::io::Write;

use crate::value::Value;

use super::exceptions::RuntimeError;
use super::Vm;

/// The fixed built-in function set, per spec.md §4.6. An identifier
/// compiles to `LOAD_FUNC` when it names a user function, and to
/// `LOAD_GLOBAL` otherwise — a built-in name therefore only ever reaches
/// the VM as an ordinary global, which the loader pre-binds to a
/// `Value::FunctionRef` using this list.
const BUILTIN_NAMES: &[&str] = &["print", "str", "int", "float", "bool", "len", "range", "type", "abs", "min", "max", "sum", "round"];

pub(super) fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

impl Vm {
    /// Invokes `name` as a built-in with `args`, if it is one.
    /// `Ok(None)` means `name` isn't a recognized built-in.
    pub(super) fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, RuntimeError> {
        Ok(Some(match name {
            "print" => {
                let rendered = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
                writeln!(self.output, "{rendered}").map_err(|e| self.fatal(format!("write error: {e}")))?;
                Value::Nil
            }
            "str" => Value::str(self.expect_one(&args, "str")?.to_string()),
            "int" => self.builtin_int(&args)?,
            "float" => self.builtin_float(&args)?,
            "bool" => Value::Bool(self.expect_one(&args, "bool")?.is_truthy()),
            "len" => self.builtin_len(&args)?,
            "range" => self.builtin_range(&args)?,
            "type" => self.builtin_type(&args)?,
            "abs" => self.builtin_abs(&args)?,
            "min" => self.builtin_minmax(&args, "min", |o| o.is_lt())?,
            "max" => self.builtin_minmax(&args, "max", |o| o.is_gt())?,
            "sum" => self.builtin_sum(&args)?,
            "round" => self.builtin_round(&args)?,
            _ => return Ok(None),
        }))
    }

    fn expect_one<'a>(&self, args: &'a [Value], name: &str) -> Result<&'a Value, RuntimeError> {
        if args.len() != 1 {
            return Err(self.fatal(format!("{name}() takes exactly one argument, got {}", args.len())));
        }
        Ok(&args[0])
    }

    fn builtin_int(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let v = self.expect_one(args, "int")?;
        Ok(Value::Int(match v {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            Value::Bool(b) => i64::from(*b),
            Value::Str(s) => s.trim().parse::<i64>().map_err(|_| self.fatal(format!("invalid literal for int(): '{s}'")))?,
            other => return Err(self.fatal(format!("int() argument must be a string or a number, not '{}'", other.type_name()))),
        }))
    }

    fn builtin_float(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let v = self.expect_one(args, "float")?;
        Ok(Value::Float(match v {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Str(s) => s.trim().parse::<f64>().map_err(|_| self.fatal(format!("invalid literal for float(): '{s}'")))?,
            other => return Err(self.fatal(format!("float() argument must be a string or a number, not '{}'", other.type_name()))),
        }))
    }

    fn builtin_len(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let v = self.expect_one(args, "len")?;
        let n = match v {
            Value::Str(s) => s.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Dict(entries) => entries.borrow().len(),
            other => return Err(self.fatal(format!("object of type '{}' has no len()", other.type_name()))),
        };
        Ok(Value::Int(n as i64))
    }

    fn as_int(&self, v: &Value, context: &str) -> Result<i64, RuntimeError> {
        match v {
            Value::Int(i) => Ok(*i),
            other => Err(self.fatal(format!("'{context}' argument must be an int, not '{}'", other.type_name()))),
        }
    }

    fn builtin_range(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let (start, stop, step) = match args {
            [stop] => (0, self.as_int(stop, "range")?, 1),
            [start, stop] => (self.as_int(start, "range")?, self.as_int(stop, "range")?, 1),
            [start, stop, step] => (self.as_int(start, "range")?, self.as_int(stop, "range")?, self.as_int(step, "range")?),
            _ => return Err(self.fatal(format!("range() takes 1 to 3 arguments, got {}", args.len()))),
        };
        if step == 0 {
            return Err(self.fatal("range() step must not be zero"));
        }
        let mut items = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            items.push(Value::Int(i));
            i += step;
        }
        Ok(Value::list(items))
    }

    /// `type(x)`: the fixed type-tag strings from spec.md §9, except an
    /// instance reports its dynamic class name rather than the generic
    /// `"instance"` tag.
    fn builtin_type(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::str(self.dynamic_type_name(self.expect_one(args, "type")?)))
    }

    /// The type-tag string used by both `type(x)` and `TYPE_CHECK`: the
    /// fixed strings in spec.md §9, with an instance reporting its
    /// dynamic class name instead of the generic `"instance"` tag.
    pub(super) fn dynamic_type_name(&self, value: &Value) -> String {
        match value {
            Value::Instance(inst) => self.classes.get(inst.borrow().class).name.clone(),
            other => other.type_name().to_string(),
        }
    }

    fn builtin_abs(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(match self.expect_one(args, "abs")? {
            Value::Int(i) => Value::Int(i.abs()),
            Value::Float(f) => Value::Float(f.abs()),
            other => return Err(self.fatal(format!("bad operand type for abs(): '{}'", other.type_name()))),
        })
    }

    fn builtin_minmax(&self, args: &[Value], name: &str, want: fn(std::cmp::Ordering) -> bool) -> Result<Value, RuntimeError> {
        let items: Vec<Value> = match args {
            [] => return Err(self.fatal(format!("{name}() takes at least one argument"))),
            [Value::List(items)] => items.borrow().clone(),
            [Value::Tuple(items)] => (**items).clone(),
            [single] => vec![single.clone()],
            many => many.to_vec(),
        };
        let mut iter = items.into_iter();
        let mut best = iter.next().ok_or_else(|| self.fatal(format!("{name}() arg is an empty sequence")))?;
        for candidate in iter {
            let ord = self.numeric_ord(&candidate, &best)?;
            if want(ord) {
                best = candidate;
            }
        }
        Ok(best)
    }

    fn numeric_ord(&self, a: &Value, b: &Value) -> Result<std::cmp::Ordering, RuntimeError> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
            (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).ok_or_else(|| self.fatal("cannot compare NaN")),
            (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).ok_or_else(|| self.fatal("cannot compare NaN")),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).ok_or_else(|| self.fatal("cannot compare NaN")),
            _ => Err(self.fatal(format!("'<' not supported between instances of '{}' and '{}'", a.type_name(), b.type_name()))),
        }
    }

    fn builtin_sum(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let items: Vec<Value> = match self.expect_one(args, "sum")? {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => (**items).clone(),
            other => return Err(self.fatal(format!("'{}' object is not iterable", other.type_name()))),
        };
        let mut total_is_float = false;
        let mut int_total: i64 = 0;
        let mut float_total: f64 = 0.0;
        for item in items {
            match item {
                Value::Int(i) => {
                    int_total = int_total.wrapping_add(i);
                    float_total += i as f64;
                }
                Value::Float(f) => {
                    total_is_float = true;
                    float_total += f;
                }
                other => return Err(self.fatal(format!("unsupported operand type for sum(): '{}'", other.type_name()))),
            }
        }
        Ok(if total_is_float { Value::Float(float_total) } else { Value::Int(int_total) })
    }

    fn builtin_round(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let (value, digits) = match args {
            [v] => (v, None),
            [v, d] => (v, Some(self.as_int(d, "round")?)),
            _ => return Err(self.fatal(format!("round() takes 1 or 2 arguments, got {}", args.len()))),
        };
        let x = match value {
            Value::Int(i) => return Ok(Value::Int(*i)),
            Value::Float(f) => *f,
            other => return Err(self.fatal(format!("type '{}' doesn't define round()", other.type_name()))),
        };
        match digits {
            None => Ok(Value::Int(x.round() as i64)),
            Some(n) => {
                let factor = 10f64.powi(n as i32);
                Ok(Value::Float((x * factor).round() / factor))
            }
        }
    }
}
