//! Tree-walking interpreter
//!
//! One [`Interpreter`] runs one program against one record. Locals live in a
//! single flat scope that starts empty for every record. The current record
//! is reachable as `r` or `record` and through `{{keyspec}}` templates, which
//! always resolve fuzzily.

use crate::ast::{Block, Expr, ExprKind, LogicalOp, Pattern, Program, Stmt, StmtKind, UnaryOp};
use crate::builtins::{self, Receiver};
use crate::error::Fault;
use crate::value::{self, json_type, Val};
use ahash::AHashMap;
use recs_core::limits::MAX_EVAL_DEPTH;
use recs_core::Record;
use recs_runner::{Bindings, EmitBuffer};
use regex::Regex;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::borrow::Cow;

/// Names bound to the current record
const RECORD_NAMES: [&str; 2] = ["r", "record"];

/// Runs a program against one record
pub struct Interpreter<'a> {
    record: &'a mut Record,
    line_num: u64,
    filename: &'a str,
    emits: &'a mut EmitBuffer,
    locals: AHashMap<String, Val>,
    depth: usize,
}

/// Where a place expression is rooted
enum Root {
    Current,
    Local(String),
    Binding(String, Val),
    Template(String),
}

/// One access step below the root
#[derive(Debug)]
enum Step {
    Attr(String),
    Item(Value),
}

/// A resolved storage location: root plus evaluated access steps
struct Place {
    root: Root,
    steps: SmallVec<[Step; 4]>,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over the runner's bindings
    pub fn new(bindings: Bindings<'a>) -> Self {
        Self {
            record: bindings.record,
            line_num: bindings.line_num,
            filename: bindings.filename,
            emits: bindings.emits,
            locals: AHashMap::new(),
            depth: 0,
        }
    }

    /// Run the whole program.
    ///
    /// Returns the value of the last statement when it is an expression.
    pub fn run(&mut self, program: &Program) -> Result<Option<Value>, Fault> {
        let mut last = None;
        for stmt in &program.body {
            last = self.exec(stmt)?;
        }
        Ok(last.map(Val::into_json))
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<Val>, Fault> {
        self.exec_kind(&stmt.kind).map_err(|mut fault| {
            fault.push_frame(stmt.span);
            fault
        })
    }

    fn nested<T>(&mut self, run: impl FnOnce(&mut Self) -> Result<T, Fault>) -> Result<T, Fault> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(Fault::overflow("maximum nesting depth exceeded"));
        }
        self.depth += 1;
        let result = run(self);
        self.depth -= 1;
        result
    }

    fn exec_block(&mut self, block: &Block) -> Result<(), Fault> {
        self.nested(|interp| {
            for stmt in block {
                interp.exec(stmt)?;
            }
            Ok(())
        })
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> Result<Option<Val>, Fault> {
        match kind {
            StmtKind::Expr(expr) => self.eval(expr).map(Some),
            StmtKind::Assign { target, op, value } => {
                match op {
                    None => {
                        let value = self.eval(value)?;
                        self.assign(target, value)?;
                    }
                    Some(op) => {
                        let place = self.resolve_place(target)?;
                        let current = self.read_place(&place)?;
                        let rhs = self.eval(value)?;
                        let updated = value::binary(*op, current, rhs)?;
                        self.store(place, updated)?;
                    }
                }
                Ok(None)
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (condition, block) in branches {
                    if self.eval(condition)?.is_truthy() {
                        self.exec_block(block)?;
                        return Ok(None);
                    }
                }
                if let Some(block) = otherwise {
                    self.exec_block(block)?;
                }
                Ok(None)
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                for item in iterate(self.eval(iterable)?)? {
                    self.assign_name(var, item)?;
                    self.exec_block(body)?;
                }
                Ok(None)
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Val, Fault> {
        self.nested(|interp| interp.eval_expr(expr))
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Val, Fault> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(Val::Json(value.clone())),
            _ if expr.is_place() => {
                let place = self.resolve_place(expr)?;
                self.read_place(&place)
            }
            ExprKind::Member(base, name) => {
                let base = self.eval(base)?;
                read_steps(base.as_value(), &[Step::Attr(name.clone())])
            }
            ExprKind::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?.into_json();
                read_steps(base.as_value(), &[Step::Item(index)])
            }
            ExprKind::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?.into_json());
                }
                Ok(Val::Json(Value::Array(out)))
            }
            ExprKind::Object(entries) => {
                let mut out = Map::new();
                for (key, item) in entries {
                    let item = self.eval(item)?.into_json();
                    out.insert(key.clone(), item);
                }
                Ok(Val::Json(Value::Object(out)))
            }
            ExprKind::Unary(UnaryOp::Neg, operand) => value::negate(self.eval(operand)?),
            ExprKind::Unary(UnaryOp::Not, operand) => {
                Ok(Val::bool(!self.eval(operand)?.is_truthy()))
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                value::binary(*op, lhs, rhs)
            }
            ExprKind::Logical(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let short_circuit = match op {
                    LogicalOp::And => !lhs.is_truthy(),
                    LogicalOp::Or => lhs.is_truthy(),
                };
                if short_circuit {
                    Ok(lhs)
                } else {
                    self.eval(rhs)
                }
            }
            ExprKind::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                value::compare(*op, &lhs, &rhs).map(Val::bool)
            }
            ExprKind::Match(subject, pattern) => {
                let subject = self.eval(subject)?;
                let Value::String(text) = subject.as_value() else {
                    return Err(Fault::type_error(format!(
                        "'=~' expects a string on the left, not {}",
                        subject.type_name()
                    )));
                };
                let matched = match pattern {
                    Pattern::Static(regex) => regex.is_match(text),
                    Pattern::Dynamic(source) => {
                        let source = self.eval(source)?;
                        let Value::String(source) = source.as_value() else {
                            return Err(Fault::type_error(format!(
                                "'=~' expects a string pattern, not {}",
                                source.type_name()
                            )));
                        };
                        Regex::new(source)
                            .map_err(|e| Fault::value_error(format!("invalid regex: {e}")))?
                            .is_match(text)
                    }
                };
                Ok(Val::bool(matched))
            }
            ExprKind::Call(name, args) => {
                let args = self.eval_all(args)?;
                if builtins::is_function(name) {
                    builtins::call(name, args, self.emits)
                } else if self.is_defined(name) {
                    Err(Fault::type_error(format!("'{name}' is not callable")))
                } else {
                    Err(Fault::name_error(name))
                }
            }
            ExprKind::MethodCall(receiver, name, args) => {
                if receiver.is_place() {
                    let place = self.resolve_place(receiver)?;
                    let args = self.eval_all(args)?;
                    self.call_on_place(place, name, args)
                } else {
                    let mut receiver = self.eval(receiver)?;
                    let args = self.eval_all(args)?;
                    let target = match &mut receiver {
                        Val::Record(record) => Receiver::Record(record),
                        Val::Json(value) => Receiver::Value(value),
                    };
                    builtins::call_method(target, name, args).map(|(value, _)| value)
                }
            }
            ExprKind::Ident(_) | ExprKind::Template(_) => {
                unreachable!("names and templates are places")
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Val>, Fault> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn is_defined(&self, name: &str) -> bool {
        self.locals.contains_key(name)
            || RECORD_NAMES.contains(&name)
            || name == "line_num"
            || name == "filename"
    }

    fn root(&self, name: &str) -> Result<Root, Fault> {
        if self.locals.contains_key(name) {
            return Ok(Root::Local(name.to_string()));
        }
        match name {
            "r" | "record" => Ok(Root::Current),
            "line_num" => Ok(Root::Binding(
                name.to_string(),
                Val::Json(Value::from(self.line_num)),
            )),
            "filename" => Ok(Root::Binding(name.to_string(), Val::string(self.filename))),
            _ if builtins::is_function(name) => Err(Fault::type_error(format!(
                "builtin '{name}' can only be called"
            ))),
            _ => Err(Fault::name_error(name)),
        }
    }

    fn resolve_place(&mut self, expr: &Expr) -> Result<Place, Fault> {
        match &expr.kind {
            ExprKind::Ident(name) => Ok(Place {
                root: self.root(name)?,
                steps: SmallVec::new(),
            }),
            ExprKind::Template(spec) => Ok(Place {
                root: Root::Template(spec.clone()),
                steps: SmallVec::new(),
            }),
            ExprKind::Member(base, name) => {
                let mut place = self.resolve_place(base)?;
                place.steps.push(Step::Attr(name.clone()));
                Ok(place)
            }
            ExprKind::Index(base, index) => {
                let mut place = self.resolve_place(base)?;
                let index = self.eval(index)?.into_json();
                place.steps.push(Step::Item(index));
                Ok(place)
            }
            _ => Err(Fault::type_error("expression is not assignable")),
        }
    }

    fn read_place(&self, place: &Place) -> Result<Val, Fault> {
        match &place.root {
            Root::Current => read_record(self.record, &place.steps),
            Root::Local(name) => match self.locals.get(name) {
                Some(Val::Record(record)) => read_record(record, &place.steps),
                Some(Val::Json(value)) if place.steps.is_empty() => Ok(Val::Json(value.clone())),
                Some(Val::Json(value)) => read_steps(value, &place.steps),
                None => Err(Fault::name_error(name)),
            },
            Root::Binding(_, value) if place.steps.is_empty() => Ok(value.clone()),
            Root::Binding(_, value) => read_steps(value.as_value(), &place.steps),
            Root::Template(spec) => {
                let value = self.template_get(spec)?;
                read_steps(&value, &place.steps)
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Val) -> Result<(), Fault> {
        if let ExprKind::Ident(name) = &target.kind {
            return self.assign_name(name, value);
        }
        let place = self.resolve_place(target)?;
        self.store(place, value)
    }

    fn assign_name(&mut self, name: &str, value: Val) -> Result<(), Fault> {
        if RECORD_NAMES.contains(&name) && !self.locals.contains_key(name) {
            return self.replace_record(value);
        }
        self.locals.insert(name.to_string(), value);
        Ok(())
    }

    fn replace_record(&mut self, value: Val) -> Result<(), Fault> {
        *self.record = match value {
            Val::Record(record) => record,
            Val::Json(Value::Object(map)) => Record::new(map),
            other => {
                return Err(Fault::type_error(format!(
                    "cannot replace the current record with {}",
                    other.type_name()
                )))
            }
        };
        Ok(())
    }

    fn store(&mut self, place: Place, value: Val) -> Result<(), Fault> {
        let Place { root, mut steps } = place;
        let Some(last) = steps.pop() else {
            return match root {
                Root::Current => self.replace_record(value),
                Root::Local(name) | Root::Binding(name, _) => {
                    self.locals.insert(name, value);
                    Ok(())
                }
                Root::Template(spec) => self.template_set(&spec, value.into_json()),
            };
        };

        let value = value.into_json();
        match root {
            Root::Current => store_in_record(self.record, &steps, &last, value),
            Root::Local(name) => match self.locals.get_mut(&name) {
                Some(Val::Record(record)) => store_in_record(record, &steps, &last, value),
                Some(Val::Json(target)) => store_in_value(target, &steps, &last, value),
                None => Err(Fault::name_error(&name)),
            },
            Root::Binding(_, binding) => {
                let mut scratch = binding.into_json();
                store_in_value(&mut scratch, &steps, &last, value)
            }
            Root::Template(spec) => {
                let mut target = self.template_get(&spec)?;
                store_in_value(&mut target, &steps, &last, value)?;
                self.template_set(&spec, target)
            }
        }
    }

    fn call_on_place(&mut self, place: Place, name: &str, args: Vec<Val>) -> Result<Val, Fault> {
        let Place { root, steps } = place;
        let (value, _) = match root {
            Root::Current => call_on_record(self.record, &steps, name, args)?,
            Root::Local(local) => match self.locals.get_mut(&local) {
                Some(Val::Record(record)) => call_on_record(record, &steps, name, args)?,
                Some(Val::Json(target)) => call_on_value(target, &steps, name, args)?,
                None => return Err(Fault::name_error(&local)),
            },
            Root::Binding(_, binding) => {
                let mut scratch = binding.into_json();
                call_on_value(&mut scratch, &steps, name, args)?
            }
            Root::Template(spec) => {
                let mut target = self.template_get(&spec)?;
                let (value, mutated) = call_on_value(&mut target, &steps, name, args)?;
                if mutated {
                    self.template_set(&spec, target)?;
                }
                (value, mutated)
            }
        };
        Ok(value)
    }

    fn template_get(&self, spec: &str) -> Result<Value, Fault> {
        let found = self.record.get(&format!("@{spec}"))?;
        Ok(found.cloned().unwrap_or(Value::Null))
    }

    fn template_set(&mut self, spec: &str, value: Value) -> Result<(), Fault> {
        self.record.set(&format!("@{spec}"), value)?;
        Ok(())
    }
}

fn iterate(value: Val) -> Result<Vec<Val>, Fault> {
    let key_list = |map: &Map<String, Value>| {
        map.keys()
            .map(|key| Val::string(key.as_str()))
            .collect::<Vec<_>>()
    };
    match value {
        Val::Record(record) => Ok(key_list(record.as_map())),
        Val::Json(Value::Object(map)) => Ok(key_list(&map)),
        Val::Json(Value::Array(items)) => Ok(items.into_iter().map(Val::Json).collect()),
        Val::Json(Value::String(s)) => Ok(s.chars().map(|c| Val::string(c.to_string())).collect()),
        other => Err(Fault::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn read_record(record: &Record, steps: &[Step]) -> Result<Val, Fault> {
    if steps.is_empty() {
        Ok(Val::Record(record.clone()))
    } else {
        read_steps(record.as_value(), steps)
    }
}

fn read_steps(root: &Value, steps: &[Step]) -> Result<Val, Fault> {
    let mut current = Cow::Borrowed(root);
    for step in steps {
        current = match current {
            Cow::Borrowed(value) => access(value, step)?,
            Cow::Owned(value) => Cow::Owned(access(&value, step)?.into_owned()),
        };
    }
    Ok(Val::Json(current.into_owned()))
}

// Python-style index: negative counts from the end.
fn normalize_index(index: &Value, len: usize, what: &str) -> Result<Option<usize>, Fault> {
    let Some(i) = index.as_i64() else {
        return Err(Fault::type_error(format!(
            "{what} indices must be integers, not {}",
            json_type(index)
        )));
    };
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let i = if i < 0 { i + len } else { i };
    Ok(if (0..len).contains(&i) {
        usize::try_from(i).ok()
    } else {
        None
    })
}

fn key_display(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn access<'v>(value: &'v Value, step: &Step) -> Result<Cow<'v, Value>, Fault> {
    match (value, step) {
        (Value::Object(map), Step::Attr(key)) | (Value::Object(map), Step::Item(Value::String(key))) => map
            .get(key)
            .map(Cow::Borrowed)
            .ok_or_else(|| Fault::key_error(key)),
        (Value::Object(_), Step::Item(key)) => Err(Fault::key_error(key_display(key))),
        (other, Step::Attr(name)) => Err(Fault::no_attribute(json_type(other), name)),
        (Value::Array(items), Step::Item(index)) => normalize_index(index, items.len(), "array")?
            .map(|i| Cow::Borrowed(&items[i]))
            .ok_or_else(|| Fault::index_error("array index out of range")),
        (Value::String(s), Step::Item(index)) => {
            let count = s.chars().count();
            normalize_index(index, count, "string")?
                .and_then(|i| s.chars().nth(i))
                .map(|c| Cow::Owned(Value::String(c.to_string())))
                .ok_or_else(|| Fault::index_error("string index out of range"))
        }
        (other, Step::Item(_)) => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            json_type(other)
        ))),
    }
}

fn access_mut<'v>(value: &'v mut Value, step: &Step) -> Result<&'v mut Value, Fault> {
    let type_name = json_type(value);
    match (value, step) {
        (Value::Object(map), Step::Attr(key)) | (Value::Object(map), Step::Item(Value::String(key))) => {
            map.get_mut(key).ok_or_else(|| Fault::key_error(key))
        }
        (Value::Object(_), Step::Item(key)) => Err(Fault::key_error(key_display(key))),
        (_, Step::Attr(name)) => Err(Fault::no_attribute(type_name, name)),
        (Value::Array(items), Step::Item(index)) => {
            match normalize_index(index, items.len(), "array")? {
                Some(i) => Ok(&mut items[i]),
                None => Err(Fault::index_error("array index out of range")),
            }
        }
        (_, Step::Item(_)) => Err(Fault::type_error(format!(
            "'{type_name}' object does not support item assignment"
        ))),
    }
}

fn put(target: &mut Value, step: &Step, value: Value) -> Result<(), Fault> {
    let type_name = json_type(target);
    match (target, step) {
        (Value::Object(map), Step::Attr(key)) | (Value::Object(map), Step::Item(Value::String(key))) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Value::Object(_), Step::Item(key)) => Err(Fault::type_error(format!(
            "object keys must be strings, not {}",
            json_type(key)
        ))),
        (_, Step::Attr(name)) => Err(Fault::no_attribute(type_name, name)),
        (Value::Array(items), Step::Item(index)) => {
            match normalize_index(index, items.len(), "array")? {
                Some(i) => {
                    items[i] = value;
                    Ok(())
                }
                None => Err(Fault::index_error("array assignment index out of range")),
            }
        }
        (_, Step::Item(_)) => Err(Fault::type_error(format!(
            "'{type_name}' object does not support item assignment"
        ))),
    }
}

fn store_in_value(root: &mut Value, steps: &[Step], last: &Step, value: Value) -> Result<(), Fault> {
    let mut target = root;
    for step in steps {
        target = access_mut(target, step)?;
    }
    put(target, last, value)
}

// Runs `f` on the record's object as a plain value. The record is restored
// afterwards even when `f` fails.
fn with_record_value<T>(record: &mut Record, f: impl FnOnce(&mut Value) -> T) -> T {
    let mut value = Value::Object(std::mem::take(record.as_map_mut()));
    let out = f(&mut value);
    if let Value::Object(map) = value {
        *record.as_map_mut() = map;
    }
    out
}

fn store_in_record(record: &mut Record, steps: &[Step], last: &Step, value: Value) -> Result<(), Fault> {
    with_record_value(record, |root| store_in_value(root, steps, last, value))
}

fn call_on_value(
    root: &mut Value,
    steps: &[Step],
    name: &str,
    args: Vec<Val>,
) -> builtins::MethodResult {
    let mut target = root;
    for step in steps {
        target = access_mut(target, step)?;
    }
    builtins::call_method(Receiver::Value(target), name, args)
}

fn call_on_record(
    record: &mut Record,
    steps: &[Step],
    name: &str,
    args: Vec<Val>,
) -> builtins::MethodResult {
    if steps.is_empty() {
        builtins::call_method(Receiver::Record(record), name, args)
    } else {
        with_record_value(record, |root| call_on_value(root, steps, name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::error::FaultKind;
    use crate::parser::parse;
    use serde_json::json;

    struct Outcome {
        record: Value,
        emitted: Vec<Value>,
        value: Option<Value>,
    }

    fn run(source: &str, data: Value) -> Result<Outcome, Fault> {
        let program = parse(source).unwrap();
        let mut record = Record::try_from(data).unwrap();
        let mut emits = EmitBuffer::new();
        let value = Interpreter::new(Bindings {
            record: &mut record,
            line_num: 7,
            filename: "in.json",
            emits: &mut emits,
        })
        .run(&program)?;
        Ok(Outcome {
            record: record.into_value(),
            emitted: emits.into_vec().into_iter().map(Record::into_value).collect(),
            value,
        })
    }

    fn value_of(source: &str, data: Value) -> Value {
        run(source, data).unwrap().value.unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(value_of("1 + 2 * 3 - 4 / 2", json!({})), json!(5));
        assert_eq!(value_of("(1 + 2) * 3", json!({})), json!(9));
        assert_eq!(value_of("-2 * -3", json!({})), json!(6));
        assert_eq!(value_of("7 % 3 + 10 / 4", json!({})), json!(3.5));
    }

    #[test]
    fn member_and_index_reads() {
        let data = json!({"age": 30, "tags": ["a", "b"], "info": {"city": "Oslo"}});
        assert_eq!(value_of("r.age > 20", data.clone()), json!(true));
        assert_eq!(value_of("record['tags'][-1]", data.clone()), json!("b"));
        assert_eq!(value_of("r.info.city.lower()", data.clone()), json!("oslo"));
        assert_eq!(value_of("'Oslo' in r.info.city", data), json!(true));
    }

    #[test]
    fn missing_field_is_key_error() {
        let err = run("r.missing", json!({"a": 1})).err().unwrap();
        assert_eq!(err.kind, FaultKind::KeyError);
        assert_eq!(err.message, "'missing'");
    }

    #[test]
    fn templates_resolve_fuzzily() {
        let data = json!({"first_name": "Ann", "items": [{"Price": 2}]});
        assert_eq!(value_of("{{first}}", data.clone()), json!("Ann"));
        assert_eq!(value_of("{{items/#0/price}}", data.clone()), json!(2));
        assert_eq!(value_of("{{nothing}}", data), json!(null));
    }

    #[test]
    fn template_writes_vivify() {
        let out = run("{{a/b/#1}} = 'x'", json!({})).unwrap();
        assert_eq!(out.record, json!({"a": {"b": [null, "x"]}}));
    }

    #[test]
    fn compound_assignment() {
        let out = run("{{count}} += 2; r.count *= 10; total = 1; total -= 3; r.t = total", json!({"count": 1})).unwrap();
        assert_eq!(out.record, json!({"count": 30, "t": -2}));
    }

    #[test]
    fn nested_member_assignment() {
        let out = run("r.info.city = 'Rome'; r.tags[0] = 'z'", json!({"info": {"city": "Oslo"}, "tags": ["a"]})).unwrap();
        assert_eq!(out.record, json!({"info": {"city": "Rome"}, "tags": ["z"]}));

        let err = run("r.tags[3] = 1", json!({"tags": []})).err().unwrap();
        assert_eq!(err.kind, FaultKind::IndexError);
    }

    #[test]
    fn failed_nested_write_keeps_record_intact() {
        let data = json!({"info": {"city": "Oslo"}});
        let program = parse("r.info.zip.code = 1").unwrap();
        let mut record = Record::try_from(data.clone()).unwrap();
        let mut emits = EmitBuffer::new();
        let err = Interpreter::new(Bindings {
            record: &mut record,
            line_num: 1,
            filename: "NONE",
            emits: &mut emits,
        })
        .run(&program)
        .unwrap_err();
        assert_eq!(err.kind, FaultKind::KeyError);
        assert_eq!(record.into_value(), data);
    }

    #[test]
    fn control_flow() {
        let source = "total = 0\nfor x in r.items {\n  if x > 2 { total += x } elif x == 2 { total += 100 } else { total -= 1 }\n}\nr.total = total";
        let out = run(source, json!({"items": [1, 2, 3, 4]})).unwrap();
        assert_eq!(out.record["total"], json!(106));
    }

    #[test]
    fn loops_over_record_keys_and_strings() {
        let out = run("n = ''\nfor k in r { n = n + k }\nfor c in 'xy' { n = n + c }\nr.n = n", json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(out.record["n"], json!("abxy"));
    }

    #[test]
    fn emit_collects_in_order() {
        let out = run("emit({'a': 1}); out = Record(); out.set('b', 2); emit(out)", json!({})).unwrap();
        assert_eq!(out.emitted, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn record_methods_on_current_record() {
        let out = run(
            "r.rename('old', 'new'); r.remove('gone'); r.set('deep/#0/x', r.has('keep'))",
            json!({"old": 1, "gone": 2, "keep": 3}),
        )
        .unwrap();
        assert_eq!(out.record, json!({"keep": 3, "new": 1, "deep": [{"x": true}]}));
    }

    #[test]
    fn array_methods_write_back_through_places() {
        let out = run("r.tags.append('c'); {{tags}}.append('d'); xs = []; xs.append(1); r.xs = xs", json!({"tags": ["a"]})).unwrap();
        assert_eq!(out.record, json!({"tags": ["a", "c", "d"], "xs": [1]}));
    }

    #[test]
    fn bindings_are_visible() {
        assert_eq!(value_of("[line_num, filename]", json!({})), json!([7, "in.json"]));
        assert_eq!(value_of("line_num = 1; line_num", json!({})), json!(1));
    }

    #[test]
    fn short_circuit_returns_operands() {
        assert_eq!(value_of("0 or 'fallback'", json!({})), json!("fallback"));
        assert_eq!(value_of("null and r.missing", json!({})), json!(null));
        assert_eq!(value_of("!r.a && true", json!({"a": 0})), json!(true));
    }

    #[test]
    fn regex_match() {
        assert_eq!(value_of("r.name =~ '^al'", json!({"name": "alice"})), json!(true));
        assert_eq!(value_of("pat = 'ICE$'; r.name =~ pat", json!({"name": "alice"})), json!(false));
        let err = run("r.n =~ 'x'", json!({"n": 1})).err().unwrap();
        assert_eq!(err.kind, FaultKind::TypeError);
    }

    #[test]
    fn unknown_names_and_uncallables() {
        assert_eq!(run("nope", json!({})).err().unwrap().kind, FaultKind::NameError);
        assert_eq!(run("nope()", json!({})).err().unwrap().kind, FaultKind::NameError);
        assert_eq!(run("x = 1; x()", json!({})).err().unwrap().kind, FaultKind::TypeError);
        assert_eq!(run("y = len", json!({})).err().unwrap().kind, FaultKind::TypeError);
    }

    #[test]
    fn replacing_the_record() {
        let out = run("r = {'fresh': true}", json!({"old": 1})).unwrap();
        assert_eq!(out.record, json!({"fresh": true}));
        assert!(run("r = 5", json!({})).is_err());
    }

    #[test]
    fn evaluation_depth_is_bounded() {
        // Hand-built tree deeper than anything the parser accepts
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut expr = Expr::new(ExprKind::Literal(json!(1)), Span::default());
                for _ in 0..MAX_EVAL_DEPTH * 2 {
                    expr = Expr::new(ExprKind::Unary(UnaryOp::Neg, Box::new(expr)), Span::default());
                }
                let stmt = Stmt {
                    kind: StmtKind::Expr(expr),
                    span: Span::default(),
                };
                let program = Program::new(vec![stmt], "");
                let mut record = Record::new(Map::new());
                let mut emits = EmitBuffer::new();
                Interpreter::new(Bindings {
                    record: &mut record,
                    line_num: 1,
                    filename: "NONE",
                    emits: &mut emits,
                })
                .run(&program)
                .unwrap_err()
            })
            .unwrap();
        let err = handle.join().unwrap();
        assert_eq!(err.to_string(), "OverflowError: maximum nesting depth exceeded");
    }

    #[test]
    fn faults_carry_enclosing_statements() {
        let source = "for x in r.items {\n  r.total = r.total + x\n}";
        let program = parse(source).unwrap();
        let err = run(source, json!({"items": ["a"], "total": 0})).err().unwrap();
        assert_eq!(
            err.render(&program),
            "  line 1, column 1: for x in r.items {\n  line 2, column 3: r.total = r.total + x\nTypeError: unsupported operand type(s) for +: 'int' and 'string'"
        );
    }
}
