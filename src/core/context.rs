//! Data context: property-path access over a JSON value graph plus a stack
//! of "current objects" and loop variables.
//!
//! Paths look like `user.age`, `items[0].name` or `attrs(key)`. A lookup
//! tries named loop variables first, then every frame from the innermost
//! current object down to the root. Writes land in the innermost frame.
//!
//! Loop variables shadow element fields of the same name (`index`, `prev`);
//! `this.index` still reaches the field on the current object.

use super::expr;
use crate::error::{StencilError, StencilResult};
use crate::types::{DataType, RecordType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name of the loop variable holding the previous element (null on the first step).
pub const PREV_VAR: &str = "prev";
/// Name of the loop variable holding the zero-based step index.
pub const INDEX_VAR: &str = "index";
/// Path referring to the innermost current object itself.
pub const THIS_PATH: &str = "this";

/// Capability the render and parse engines need from the data side.
pub trait DataContext {
    /// Value at `path`, or `None` when any segment is missing.
    fn get(&self, path: &str) -> StencilResult<Option<Value>>;

    /// Assign `value` at `path` in the innermost frame, creating
    /// intermediate objects and arrays as needed.
    fn set(&mut self, path: &str, value: Value) -> StencilResult<()>;

    /// Declared or inferred type of the property at `path`.
    fn resolve_type(&self, path: &str) -> StencilResult<Option<DataType>>;

    /// Make `value` the current object.
    fn push(&mut self, value: Value);

    /// Drop the current object and return it. The root is never popped.
    fn pop(&mut self) -> Option<Value>;

    /// Bind a named variable on the current frame.
    fn set_var(&mut self, name: &str, value: Value);

    /// Unbind a variable from the current frame.
    fn remove_var(&mut self, name: &str) -> Option<Value>;

    /// Evaluate a guard expression that must yield a boolean.
    fn eval_bool(&self, expression: &str) -> StencilResult<bool>;
}

/// One step of a property path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Split a property path into segments.
pub fn parse_path(path: &str) -> StencilResult<Vec<Segment>> {
    let bad = |why: &str| StencilError::Path(format!("'{}': {}", path, why));
    let mut segments = Vec::new();
    let mut chars = path.trim().chars().peekable();
    let mut name = String::new();
    let mut expect_name = true;

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if name.is_empty() && expect_name {
                    return Err(bad("empty segment"));
                }
                if !name.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut name)));
                }
                expect_name = true;
            }
            '[' => {
                if !name.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut name)));
                } else if segments.is_empty() {
                    return Err(bad("index without a property"));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) => digits.push(d),
                        None => return Err(bad("unclosed '['")),
                    }
                }
                let index = digits
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| bad("index must be a non-negative integer"))?;
                segments.push(Segment::Index(index));
                expect_name = false;
            }
            '(' => {
                if !name.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut name)));
                } else if segments.is_empty() {
                    return Err(bad("key without a property"));
                }
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(k) => key.push(k),
                        None => return Err(bad("unclosed '('")),
                    }
                }
                let key = key.trim().trim_matches(|q| q == '\'' || q == '"');
                segments.push(Segment::Key(key.to_string()));
                expect_name = false;
            }
            c if c.is_whitespace() => return Err(bad("unexpected whitespace")),
            c => {
                if !expect_name {
                    return Err(bad("expected '.' before property name"));
                }
                name.push(c);
            }
        }
    }
    if !name.is_empty() {
        segments.push(Segment::Key(name));
    } else if expect_name {
        return Err(bad("empty path or trailing '.'"));
    }
    Ok(segments)
}

fn lookup<'v>(value: &'v Value, segments: &[Segment]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, seg| match (seg, current) {
        (Segment::Key(k), Value::Object(map)) => map.get(k),
        (Segment::Index(i), Value::Array(items)) => items.get(*i),
        _ => None,
    })
}

fn assign(target: &mut Value, segments: &[Segment], value: Value) -> StencilResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };
    match first {
        Segment::Key(key) => {
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                return Err(StencilError::Path(format!(
                    "cannot set property '{}' on a non-object value",
                    key
                )));
            };
            let slot = map.entry(key.clone()).or_insert(Value::Null);
            assign(slot, rest, value)
        }
        Segment::Index(index) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return Err(StencilError::Path(format!(
                    "cannot index [{}] into a non-array value",
                    index
                )));
            };
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            assign(&mut items[*index], rest, value)
        }
    }
}

/// Infer a converter type from an existing JSON value.
pub fn infer_type(value: &Value) -> Option<DataType> {
    match value {
        Value::Bool(_) => Some(DataType::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(DataType::Long),
        Value::Number(_) => Some(DataType::Double),
        Value::String(_) => Some(DataType::Text),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Frame {
    value: Value,
    vars: BTreeMap<String, Value>,
    record: Option<RecordType>,
}

impl Frame {
    fn new(value: Value) -> Self {
        Self {
            value,
            vars: BTreeMap::new(),
            record: None,
        }
    }
}

/// [`DataContext`] over a `serde_json::Value` root.
///
/// Cloning yields a fully independent context.
#[derive(Debug, Clone)]
pub struct JsonContext {
    frames: Vec<Frame>,
}

impl Default for JsonContext {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl JsonContext {
    pub fn new(root: Value) -> Self {
        Self {
            frames: vec![Frame::new(root)],
        }
    }

    pub fn root(&self) -> &Value {
        &self.frames[0].value
    }

    pub fn into_root(mut self) -> Value {
        self.frames.truncate(1);
        self.frames.pop().map(|f| f.value).unwrap_or(Value::Null)
    }

    /// Number of frames above the root
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Push a record instance whose field types drive conversion.
    pub fn push_record(&mut self, value: Value, record: RecordType) {
        let mut frame = Frame::new(value);
        frame.record = Some(record);
        self.frames.push(frame);
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn find(&self, segments: &[Segment]) -> Option<&Value> {
        let (first, rest) = segments.split_first()?;
        if let Segment::Key(name) = first {
            if name == THIS_PATH {
                return self.frames.last().and_then(|f| lookup(&f.value, rest));
            }
            for frame in self.frames.iter().rev() {
                if let Some(var) = frame.vars.get(name) {
                    return lookup(var, rest);
                }
            }
        }
        self.frames
            .iter()
            .rev()
            .find_map(|frame| lookup(&frame.value, segments))
    }
}

impl DataContext for JsonContext {
    fn get(&self, path: &str) -> StencilResult<Option<Value>> {
        let segments = parse_path(path)?;
        Ok(self.find(&segments).cloned())
    }

    fn set(&mut self, path: &str, value: Value) -> StencilResult<()> {
        let segments = parse_path(path)?;
        let segments = match segments.first() {
            Some(Segment::Key(k)) if k == THIS_PATH => &segments[1..],
            _ => &segments[..],
        };
        assign(&mut self.top_mut().value, segments, value)
    }

    fn resolve_type(&self, path: &str) -> StencilResult<Option<DataType>> {
        let segments = parse_path(path)?;
        if let (Some(record), [Segment::Key(field)]) =
            (self.frames.last().and_then(|f| f.record.as_ref()), segments.as_slice())
        {
            if let Some(t) = record.fields.get(field) {
                return Ok(Some(*t));
            }
        }
        Ok(self.find(&segments).and_then(infer_type))
    }

    fn push(&mut self, value: Value) {
        self.frames.push(Frame::new(value));
    }

    fn pop(&mut self) -> Option<Value> {
        if self.frames.len() > 1 {
            self.frames.pop().map(|f| f.value)
        } else {
            None
        }
    }

    fn set_var(&mut self, name: &str, value: Value) {
        self.top_mut().vars.insert(name.to_string(), value);
    }

    fn remove_var(&mut self, name: &str) -> Option<Value> {
        self.top_mut().vars.remove(name)
    }

    fn eval_bool(&self, expression: &str) -> StencilResult<bool> {
        let parsed = expr::parse(expression)?;
        let result = parsed.eval(&|path: &str| -> StencilResult<Value> {
            Ok(self.get(path)?.unwrap_or(Value::Null))
        })?;
        match result {
            Value::Bool(b) => Ok(b),
            other => Err(StencilError::Expression(format!(
                "'{}' evaluated to {} instead of a boolean",
                expression, other
            ))),
        }
    }
}
