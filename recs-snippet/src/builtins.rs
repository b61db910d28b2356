//! Builtin functions and methods

use crate::error::Fault;
use crate::value::{float, json_type, Num, Val};
use recs_core::limits::MAX_RANGE_LEN;
use recs_core::Record;
use recs_runner::EmitBuffer;
use serde_json::{Map, Value};

/// Names callable as `name(args)`
pub const FUNCTIONS: &[&str] = &[
    "emit", "Record", "len", "str", "int", "float", "bool", "lower", "upper", "trim", "keys",
    "range", "type",
];

/// Whether `name` is a builtin function
pub fn is_function(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

fn arity(name: &str, args: &[Val], min: usize, max: usize) -> Result<(), Fault> {
    let given = args.len();
    if (min..=max).contains(&given) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min} argument{}", if min == 1 { "" } else { "s" })
    } else if max == usize::MAX {
        format!("at least {min} argument{}", if min == 1 { "" } else { "s" })
    } else {
        format!("from {min} to {max} arguments")
    };
    Err(Fault::type_error(format!(
        "{name}() takes {expected} ({given} given)"
    )))
}

fn string_arg<'v>(name: &str, arg: &'v Val) -> Result<&'v str, Fault> {
    match arg.as_value() {
        Value::String(s) => Ok(s),
        _ => Err(Fault::type_error(format!(
            "{name}() argument must be a string, not {}",
            arg.type_name()
        ))),
    }
}

fn int_arg(name: &str, arg: &Val) -> Result<i64, Fault> {
    match Num::of(arg.as_value()) {
        Some(Num::Int(i)) => Ok(i),
        _ => Err(Fault::type_error(format!(
            "{name}() argument must be an int, not {}",
            arg.type_name()
        ))),
    }
}

fn string_args(name: &str, args: &[Val]) -> Result<Vec<String>, Fault> {
    args.iter()
        .map(|arg| string_arg(name, arg).map(str::to_string))
        .collect()
}

fn keys_of(map: &Map<String, Value>) -> Val {
    Val::Json(Value::Array(
        map.keys().map(|k| Value::String(k.clone())).collect(),
    ))
}

/// Call a builtin function
pub fn call(name: &str, mut args: Vec<Val>, emits: &mut EmitBuffer) -> Result<Val, Fault> {
    match name {
        "emit" => {
            arity(name, &args, 1, 1)?;
            let record = match args.remove(0) {
                Val::Record(record) => record,
                Val::Json(Value::Object(map)) => Record::new(map),
                other => {
                    return Err(Fault::type_error(format!(
                        "emit() argument must be a record or object, not {}",
                        other.type_name()
                    )))
                }
            };
            emits.push(record);
            Ok(Val::null())
        }
        "Record" => {
            arity(name, &args, 0, 1)?;
            match args.pop() {
                None => Ok(Val::Record(Record::empty())),
                Some(Val::Record(record)) => Ok(Val::Record(record)),
                Some(Val::Json(Value::Object(map))) => Ok(Val::Record(Record::new(map))),
                Some(other) => Err(Fault::type_error(format!(
                    "Record() argument must be an object, not {}",
                    other.type_name()
                ))),
            }
        }
        "len" => {
            arity(name, &args, 1, 1)?;
            let arg = &args[0];
            let len = match (arg, arg.as_value()) {
                (_, Value::String(s)) => s.chars().count(),
                (_, Value::Array(items)) => items.len(),
                (Val::Record(record), _) => record.len(),
                (_, Value::Object(map)) => map.len(),
                _ => {
                    return Err(Fault::type_error(format!(
                        "object of type '{}' has no len()",
                        arg.type_name()
                    )))
                }
            };
            Ok(Val::int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        "str" => {
            arity(name, &args, 1, 1)?;
            Ok(Val::string(args[0].to_string()))
        }
        "int" => {
            arity(name, &args, 1, 1)?;
            to_int(&args[0]).map(Val::int)
        }
        "float" => {
            arity(name, &args, 1, 1)?;
            to_float(&args[0])
        }
        "bool" => {
            arity(name, &args, 1, 1)?;
            Ok(Val::bool(args[0].is_truthy()))
        }
        "lower" => {
            arity(name, &args, 1, 1)?;
            Ok(Val::string(string_arg(name, &args[0])?.to_lowercase()))
        }
        "upper" => {
            arity(name, &args, 1, 1)?;
            Ok(Val::string(string_arg(name, &args[0])?.to_uppercase()))
        }
        "trim" => {
            arity(name, &args, 1, 1)?;
            Ok(Val::string(string_arg(name, &args[0])?.trim()))
        }
        "keys" => {
            arity(name, &args, 1, 1)?;
            args[0].as_object().map(keys_of).ok_or_else(|| {
                Fault::type_error(format!(
                    "keys() argument must be an object or record, not {}",
                    args[0].type_name()
                ))
            })
        }
        "range" => {
            arity(name, &args, 1, 3)?;
            let bounds = args
                .iter()
                .map(|arg| int_arg(name, arg))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked above"),
            };
            range(start, stop, step)
        }
        "type" => {
            arity(name, &args, 1, 1)?;
            Ok(Val::string(args[0].type_name()))
        }
        _ => Err(Fault::name_error(name)),
    }
}

fn range(start: i64, stop: i64, step: i64) -> Result<Val, Fault> {
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero"));
    }
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let len = if span > 0 { (span - 1) / step.abs() + 1 } else { 0 };
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= MAX_RANGE_LEN)
        .ok_or_else(|| Fault::overflow("range() result is too long"))?;

    // every element lies between start and stop, so it fits in i64
    let items = (0..len)
        .map(|i| Value::from((start + step * i as i128) as i64))
        .collect();
    Ok(Val::Json(Value::Array(items)))
}

fn to_int(arg: &Val) -> Result<i64, Fault> {
    match arg.as_value() {
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Number(_) => match Num::of(arg.as_value()) {
            Some(Num::Int(i)) => Ok(i),
            Some(Num::Float(f)) if f.is_finite() && f >= -9.223_372_036_854_776e18 && f < 9.223_372_036_854_776e18 => {
                Ok(f.trunc() as i64)
            }
            _ => Err(Fault::overflow("cannot convert float to int")),
        },
        Value::String(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map_err(|_| Fault::value_error(format!("invalid literal for int(): '{s}'"))),
        _ => Err(Fault::type_error(format!(
            "int() argument must be a string or a number, not {}",
            arg.type_name()
        ))),
    }
}

fn to_float(arg: &Val) -> Result<Val, Fault> {
    let f = match arg.as_value() {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| {
                Fault::value_error(format!("could not convert string to float: '{s}'"))
            })?,
        _ => {
            return Err(Fault::type_error(format!(
                "float() argument must be a string or a number, not {}",
                arg.type_name()
            )))
        }
    };
    float(f).map(Val::Json)
}

/// What a method is invoked on
pub enum Receiver<'a> {
    /// A record, in place
    Record(&'a mut Record),
    /// A JSON value, in place
    Value(&'a mut Value),
}

/// Result of a method call and whether it mutated the receiver
pub type MethodResult = Result<(Val, bool), Fault>;

/// Call a method on a receiver
pub fn call_method(receiver: Receiver<'_>, name: &str, args: Vec<Val>) -> MethodResult {
    match receiver {
        Receiver::Record(record) => record_method(record, name, args),
        Receiver::Value(value) => match value {
            Value::Object(map) => object_method(map, name, args),
            Value::Array(items) => array_method(items, name, args),
            Value::String(s) => string_method(s, name, args),
            other => Err(Fault::no_attribute(json_type(other), name)),
        },
    }
}

fn record_method(record: &mut Record, name: &str, args: Vec<Val>) -> MethodResult {
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let spec = string_arg(name, &args[0])?;
            let found = record.get(spec)?.cloned();
            let value = match found {
                Some(value) => Val::Json(value),
                None => args.get(1).cloned().unwrap_or_else(Val::null),
            };
            Ok((value, false))
        }
        "set" => {
            arity(name, &args, 2, 2)?;
            let mut args = args.into_iter();
            let spec = args.next().unwrap_or_else(Val::null);
            let value = args.next().unwrap_or_else(Val::null);
            record.set(string_arg(name, &spec)?, value.into_json())?;
            Ok((Val::null(), true))
        }
        "has" => {
            arity(name, &args, 1, 1)?;
            let found = record.has(string_arg(name, &args[0])?)?;
            Ok((Val::bool(found), false))
        }
        "remove" => {
            arity(name, &args, 1, usize::MAX)?;
            let names = string_args(name, &args)?;
            let removed = record.remove(&names);
            Ok((Val::Json(Value::Array(removed)), true))
        }
        "rename" => {
            arity(name, &args, 2, 2)?;
            record.rename(string_arg(name, &args[0])?, string_arg(name, &args[1])?);
            Ok((Val::null(), true))
        }
        "prune_to" => {
            let names = string_args(name, &args)?;
            record.prune_to(&names);
            Ok((Val::null(), true))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok((keys_of(record.as_map()), false))
        }
        "key_chain" => {
            arity(name, &args, 1, 1)?;
            let chain = record.key_chain(string_arg(name, &args[0])?)?;
            Ok((
                Val::Json(Value::Array(chain.into_iter().map(Value::String).collect())),
                false,
            ))
        }
        _ => Err(Fault::no_attribute("record", name)),
    }
}

fn object_method(map: &mut Map<String, Value>, name: &str, args: Vec<Val>) -> MethodResult {
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let key = string_arg(name, &args[0])?;
            let value = match map.get(key) {
                Some(value) => Val::Json(value.clone()),
                None => args.get(1).cloned().unwrap_or_else(Val::null),
            };
            Ok((value, false))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok((keys_of(map), false))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok((Val::Json(Value::Array(map.values().cloned().collect())), false))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            let items = map
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect();
            Ok((Val::Json(Value::Array(items)), false))
        }
        _ => Err(Fault::no_attribute("object", name)),
    }
}

fn array_method(items: &mut Vec<Value>, name: &str, args: Vec<Val>) -> MethodResult {
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            items.extend(args.into_iter().map(Val::into_json));
            Ok((Val::null(), true))
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            match args.into_iter().next().map(Val::into_json) {
                Some(Value::Array(more)) => items.extend(more),
                Some(other) => {
                    return Err(Fault::type_error(format!(
                        "extend() argument must be an array, not {}",
                        json_type(&other)
                    )))
                }
                None => {}
            }
            Ok((Val::null(), true))
        }
        "pop" => {
            arity(name, &args, 0, 0)?;
            let last = items
                .pop()
                .ok_or_else(|| Fault::index_error("pop from empty array"))?;
            Ok((Val::Json(last), true))
        }
        _ => Err(Fault::no_attribute("array", name)),
    }
}

fn string_method(s: &mut String, name: &str, args: Vec<Val>) -> MethodResult {
    let value = match name {
        "lower" => {
            arity(name, &args, 0, 0)?;
            Val::string(s.to_lowercase())
        }
        "upper" => {
            arity(name, &args, 0, 0)?;
            Val::string(s.to_uppercase())
        }
        "strip" => {
            arity(name, &args, 0, 0)?;
            Val::string(s.trim())
        }
        "split" => {
            arity(name, &args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None => s.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = string_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(Fault::value_error("empty separator"));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            Val::Json(Value::Array(parts))
        }
        "startswith" => {
            arity(name, &args, 1, 1)?;
            Val::bool(s.starts_with(string_arg(name, &args[0])?))
        }
        "endswith" => {
            arity(name, &args, 1, 1)?;
            Val::bool(s.ends_with(string_arg(name, &args[0])?))
        }
        "replace" => {
            arity(name, &args, 2, 2)?;
            Val::string(s.replace(string_arg(name, &args[0])?, string_arg(name, &args[1])?))
        }
        "join" => {
            arity(name, &args, 1, 1)?;
            let Value::Array(parts) = args[0].as_value() else {
                return Err(Fault::type_error(format!(
                    "join() argument must be an array, not {}",
                    args[0].type_name()
                )));
            };
            let parts = parts
                .iter()
                .map(|part| match part {
                    Value::String(part) => Ok(part.as_str()),
                    other => Err(Fault::type_error(format!(
                        "join() expects strings, found {}",
                        json_type(other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Val::string(parts.join(s.as_str()))
        }
        _ => return Err(Fault::no_attribute("string", name)),
    };
    Ok((value, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_simple(name: &str, args: Vec<Value>) -> Result<Value, Fault> {
        let mut emits = EmitBuffer::new();
        call(name, args.into_iter().map(Val::Json).collect(), &mut emits).map(Val::into_json)
    }

    #[test]
    fn conversions() {
        assert_eq!(call_simple("int", vec![json!("42")]).unwrap(), json!(42));
        assert_eq!(call_simple("int", vec![json!(-3.9)]).unwrap(), json!(-3));
        assert_eq!(call_simple("float", vec![json!("2.5")]).unwrap(), json!(2.5));
        assert_eq!(call_simple("str", vec![json!(1.5)]).unwrap(), json!("1.5"));
        assert_eq!(call_simple("str", vec![json!("x")]).unwrap(), json!("x"));
        assert_eq!(call_simple("bool", vec![json!([])]).unwrap(), json!(false));

        let err = call_simple("int", vec![json!("abc")]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: invalid literal for int(): 'abc'");
    }

    #[test]
    fn arity_is_checked() {
        let err = call_simple("len", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: len() takes exactly 1 argument (0 given)");
        let err = call_simple("range", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: range() takes from 1 to 3 arguments (0 given)");
    }

    #[test]
    fn ranges() {
        assert_eq!(call_simple("range", vec![json!(3)]).unwrap(), json!([0, 1, 2]));
        assert_eq!(call_simple("range", vec![json!(5), json!(0), json!(-2)]).unwrap(), json!([5, 3, 1]));
        assert!(call_simple("range", vec![json!(0), json!(1), json!(0)]).is_err());
        let err = call_simple("range", vec![json!(i64::MAX)]).unwrap_err();
        assert_eq!(err.to_string(), "OverflowError: range() result is too long");
    }

    #[test]
    fn emit_accepts_records_and_objects_only() {
        let mut emits = EmitBuffer::new();
        call("emit", vec![Val::Json(json!({"a": 1}))], &mut emits).unwrap();
        call("emit", vec![Val::Record(Record::empty())], &mut emits).unwrap();
        assert_eq!(emits.len(), 2);

        let err = call("emit", vec![Val::int(1)], &mut emits).unwrap_err();
        assert_eq!(err.kind, crate::error::FaultKind::TypeError);
        assert_eq!(emits.len(), 2);
    }

    #[test]
    fn record_methods_mutate_in_place() {
        let mut record = Record::try_from(json!({"a": {"b": 1}, "c": 2})).unwrap();

        let (value, mutated) =
            call_method(Receiver::Record(&mut record), "get", vec![Val::string("a/b")]).unwrap();
        assert_eq!(value, Val::int(1));
        assert!(!mutated);

        let (_, mutated) = call_method(
            Receiver::Record(&mut record),
            "set",
            vec![Val::string("x/#1"), Val::bool(true)],
        )
        .unwrap();
        assert!(mutated);
        assert_eq!(record.field("x"), Some(&json!([null, true])));

        let (removed, _) =
            call_method(Receiver::Record(&mut record), "remove", vec![Val::string("c")]).unwrap();
        assert_eq!(removed.into_json(), json!([2]));

        let err = call_method(Receiver::Record(&mut record), "explode", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "AttributeError: 'record' object has no attribute 'explode'");
    }

    #[test]
    fn array_and_string_methods() {
        let mut items = json!([1]);
        let (_, mutated) = call_method(Receiver::Value(&mut items), "append", vec![Val::int(2)]).unwrap();
        assert!(mutated);
        assert_eq!(items, json!([1, 2]));

        let mut s = json!("a,b");
        let (parts, _) = call_method(Receiver::Value(&mut s), "split", vec![Val::string(",")]).unwrap();
        assert_eq!(parts.into_json(), json!(["a", "b"]));

        let mut sep = json!("-");
        let (joined, _) = call_method(
            Receiver::Value(&mut sep),
            "join",
            vec![Val::Json(json!(["x", "y"]))],
        )
        .unwrap();
        assert_eq!(joined, Val::string("x-y"));
    }
}
