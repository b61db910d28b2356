//! Runtime values and the operators defined on them

use crate::ast::{BinOp, CmpOp};
use crate::error::Fault;
use recs_core::limits::MAX_REPEAT_LEN;
use recs_core::Record;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::fmt;

/// A value during snippet execution.
///
/// Records are kept distinct from plain objects so `type()`, `emit` and
/// method lookup can tell them apart. Anything nested inside an array or
/// object is plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    /// Plain JSON
    Json(Value),
    /// A record
    Record(Record),
}

impl Val {
    /// `null`
    pub fn null() -> Self {
        Val::Json(Value::Null)
    }

    /// Boolean value
    pub fn bool(b: bool) -> Self {
        Val::Json(Value::Bool(b))
    }

    /// Integer value
    pub fn int(n: i64) -> Self {
        Val::Json(Value::from(n))
    }

    /// String value
    pub fn string(s: impl Into<String>) -> Self {
        Val::Json(Value::String(s.into()))
    }

    /// Borrow as JSON; records show their object
    pub fn as_value(&self) -> &Value {
        match self {
            Val::Json(value) => value,
            Val::Record(record) => record.as_value(),
        }
    }

    /// Convert to JSON; records become objects
    pub fn into_json(self) -> Value {
        match self {
            Val::Json(value) => value,
            Val::Record(record) => record.into_value(),
        }
    }

    /// Object entries of an object or record
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Val::Json(Value::Object(map)) => Some(map),
            Val::Json(_) => None,
            Val::Record(record) => Some(record.as_map()),
        }
    }

    /// Name reported by `type()` and in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Json(value) => json_type(value),
            Val::Record(_) => "record",
        }
    }

    /// Truthiness used by conditions, `and`/`or` and grep
    pub fn is_truthy(&self) -> bool {
        recs_runner::is_truthy(self.as_value())
    }
}

impl From<Value> for Val {
    fn from(value: Value) -> Self {
        Val::Json(value)
    }
}

impl From<Record> for Val {
    fn from(record: Record) -> Self {
        Val::Record(record)
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_value() {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

/// Type name of a JSON value, distinguishing integers from floats
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn of(value: &Value) -> Option<Num> {
        let Value::Number(n) = value else {
            return None;
        };
        n.as_i64()
            .map(Num::Int)
            .or_else(|| n.as_f64().map(Num::Float))
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Num::Int(i) => i == 0,
            Num::Float(f) => f == 0.0,
        }
    }
}

pub(crate) fn float(f: f64) -> Result<Value, Fault> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Fault::overflow("float result out of range"))
}

fn int_overflow() -> Fault {
    Fault::overflow("integer overflow")
}

fn arithmetic(op: BinOp, a: Num, b: Num) -> Result<Value, Fault> {
    if matches!(op, BinOp::Div | BinOp::Mod) && b.is_zero() {
        let what = if op == BinOp::Div { "division" } else { "modulo" };
        return Err(Fault::zero_division(format!("{what} by zero")));
    }

    match (a, b) {
        (Num::Int(a), Num::Int(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => {
                    if a.checked_rem(b) == Some(0) {
                        a.checked_div(b)
                    } else if b == -1 {
                        None
                    } else {
                        return float(a as f64 / b as f64);
                    }
                }
                BinOp::Mod => Some(floor_mod(a, b)),
            };
            result.map(Value::from).ok_or_else(int_overflow)
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Mod => {
                    let r = a % b;
                    if r != 0.0 && (r < 0.0) != (b < 0.0) {
                        r + b
                    } else {
                        r
                    }
                }
            })
        }
    }
}

// Modulo with the sign of the divisor. `b` is non-zero.
fn floor_mod(a: i64, b: i64) -> i64 {
    if b == -1 {
        return 0;
    }
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn unsupported(op: &str, lhs: &Val, rhs: &Val) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Repetition count for `seq * n`, checked so the result stays within
/// [`MAX_REPEAT_LEN`]. Negative counts repeat zero times.
fn repeat_count(len: usize, n: &Value) -> Result<usize, Fault> {
    let count = n.as_i64().and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
    match len.checked_mul(count) {
        Some(0) => Ok(0),
        Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
        _ => Err(Fault::overflow("repeated sequence is too long")),
    }
}

/// Apply an arithmetic operator
pub(crate) fn binary(op: BinOp, lhs: Val, rhs: Val) -> Result<Val, Fault> {
    if let (Some(a), Some(b)) = (Num::of(lhs.as_value()), Num::of(rhs.as_value())) {
        return arithmetic(op, a, b).map(Val::Json);
    }

    match (op, lhs, rhs) {
        (BinOp::Add, Val::Json(Value::String(a)), Val::Json(Value::String(b))) => {
            Ok(Val::string(a + &b))
        }
        (BinOp::Add, Val::Json(Value::Array(mut a)), Val::Json(Value::Array(b))) => {
            a.extend(b);
            Ok(Val::Json(Value::Array(a)))
        }
        (BinOp::Add, Val::Record(mut record), rhs) if rhs.as_object().is_some() => {
            if let Value::Object(fields) = rhs.into_json() {
                record.merge(fields);
            }
            Ok(Val::Record(record))
        }
        (BinOp::Add, Val::Json(Value::Object(mut a)), rhs) if rhs.as_object().is_some() => {
            if let Value::Object(b) = rhs.into_json() {
                a.extend(b);
            }
            Ok(Val::Json(Value::Object(a)))
        }
        (BinOp::Mul, Val::Json(Value::String(s)), Val::Json(n))
        | (BinOp::Mul, Val::Json(n), Val::Json(Value::String(s)))
            if n.is_i64() =>
        {
            let count = repeat_count(s.len(), &n)?;
            Ok(Val::string(s.repeat(count)))
        }
        (BinOp::Mul, Val::Json(Value::Array(items)), Val::Json(n)) if n.is_i64() => {
            let count = repeat_count(items.len(), &n)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Val::Json(Value::Array(out)))
        }
        (op, lhs, rhs) => Err(unsupported(op.symbol(), &lhs, &rhs)),
    }
}

/// Unary minus
pub(crate) fn negate(operand: Val) -> Result<Val, Fault> {
    match Num::of(operand.as_value()) {
        Some(Num::Int(i)) => i
            .checked_neg()
            .map(Val::int)
            .ok_or_else(int_overflow),
        Some(Num::Float(f)) => float(-f).map(Val::Json),
        None => Err(Fault::type_error(format!(
            "bad operand type for unary -: '{}'",
            operand.type_name()
        ))),
    }
}

/// Structural equality where `1 == 1.0`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(a), Num::of(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => a == b,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

fn order(op: CmpOp, a: &Value, b: &Value) -> Result<Ordering, Fault> {
    if let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => x.cmp(&y),
            (x, y) => x.as_f64().total_cmp(&y.as_f64()),
        });
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (x, y) in x.iter().zip(y) {
                match order(op, x, y)? {
                    Ordering::Equal => continue,
                    unequal => return Ok(unequal),
                }
            }
            Ok(x.len().cmp(&y.len()))
        }
        _ => Err(Fault::type_error(format!(
            "'{}' not supported between '{}' and '{}'",
            op.symbol(),
            json_type(a),
            json_type(b)
        ))),
    }
}

/// Whether `needle` is in `haystack`
pub(crate) fn contains(needle: &Val, haystack: &Val) -> Result<bool, Fault> {
    if let Some(map) = haystack.as_object() {
        return Ok(match needle.as_value() {
            Value::String(key) => map.contains_key(key),
            _ => false,
        });
    }
    match (needle.as_value(), haystack.as_value()) {
        (Value::String(part), Value::String(whole)) => Ok(whole.contains(part.as_str())),
        (_, Value::String(_)) => Err(Fault::type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            needle.type_name()
        ))),
        (needle, Value::Array(items)) => Ok(items.iter().any(|item| values_equal(needle, item))),
        _ => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            haystack.type_name()
        ))),
    }
}

/// Apply a comparison operator
pub(crate) fn compare(op: CmpOp, lhs: &Val, rhs: &Val) -> Result<bool, Fault> {
    let (a, b) = (lhs.as_value(), rhs.as_value());
    Ok(match op {
        CmpOp::Eq => values_equal(a, b),
        CmpOp::Ne => !values_equal(a, b),
        CmpOp::Lt => order(op, a, b)? == Ordering::Less,
        CmpOp::Le => order(op, a, b)? != Ordering::Greater,
        CmpOp::Gt => order(op, a, b)? == Ordering::Greater,
        CmpOp::Ge => order(op, a, b)? != Ordering::Less,
        CmpOp::In => contains(lhs, rhs)?,
    })
}
