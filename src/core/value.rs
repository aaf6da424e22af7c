//! Purpose: The result domain of evaluation.
//! Exports: `Value`, `TimeZone`, `unique_items`, `unique_entries`.
//! Role: Produced by the evaluator and constructors, persisted by the cache, printed by the renderer.
//! Invariants: Set-like values hold unique elements; map-like values hold unique keys.
//! Invariants: Set and unordered map equality ignore order; `OrderedDict` equality does not.
//! Invariants: Floats compare and hash by bit pattern.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, PrimitiveDateTime, Time, UtcOffset};

use crate::core::eval::EvalError;
use crate::core::numeric::{Complex, Rational};

/// Fixed UTC offset with an optional display name.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TimeZone {
    pub offset: UtcOffset,
    pub name: Option<String>,
}

impl TimeZone {
    pub fn utc() -> Self {
        Self {
            offset: UtcOffset::UTC,
            name: None,
        }
    }

    pub fn is_utc(&self) -> bool {
        self.offset == UtcOffset::UTC && self.name.is_none()
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Decimal(Decimal),
    Rational(Rational),
    Str(String),
    Bytes(Vec<u8>),
    ByteArray(Vec<u8>),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    FrozenSet(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    OrderedDict(Vec<(Value, Value)>),
    Counter(Vec<(Value, Value)>),
    DefaultDict {
        factory: Option<String>,
        entries: Vec<(Value, Value)>,
    },
    Deque {
        items: Vec<Value>,
        maxlen: Option<u64>,
    },
    Date(Date),
    Time {
        time: Time,
        tz: Option<TimeZone>,
    },
    DateTime {
        value: PrimitiveDateTime,
        tz: Option<TimeZone>,
    },
    Duration(Duration),
    TimeZone(TimeZone),
    /// A bare reference to a registered constructor, e.g. `list` in `defaultdict(list)`.
    Type(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Decimal(_) => "decimal.Decimal",
            Value::Rational(_) => "fractions.Fraction",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::ByteArray(_) => "bytearray",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Dict(_) => "dict",
            Value::OrderedDict(_) => "collections.OrderedDict",
            Value::Counter(_) => "collections.Counter",
            Value::DefaultDict { .. } => "collections.defaultdict",
            Value::Deque { .. } => "collections.deque",
            Value::Date(_) => "datetime.date",
            Value::Time { .. } => "datetime.time",
            Value::DateTime { .. } => "datetime.datetime",
            Value::Duration(_) => "datetime.timedelta",
            Value::TimeZone(_) => "datetime.timezone",
            Value::Type(_) => "type",
        }
    }

    /// Type name of the first mutable component, if any; such values cannot be set
    /// elements or map keys.
    pub fn unhashable_type(&self) -> Option<&'static str> {
        match self {
            Value::ByteArray(_)
            | Value::List(_)
            | Value::Set(_)
            | Value::Dict(_)
            | Value::OrderedDict(_)
            | Value::Counter(_)
            | Value::DefaultDict { .. }
            | Value::Deque { .. } => Some(self.type_name()),
            Value::Tuple(items) | Value::FrozenSet(items) => {
                items.iter().find_map(Value::unhashable_type)
            }
            _ => None,
        }
    }

    /// Elements of any sequence or set-like value, or keys of a map-like value.
    pub fn iter_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Tuple(items)
            | Value::List(items)
            | Value::Set(items)
            | Value::FrozenSet(items)
            | Value::Deque { items, .. } => Some(items.clone()),
            Value::Dict(entries)
            | Value::OrderedDict(entries)
            | Value::Counter(entries)
            | Value::DefaultDict { entries, .. } => {
                Some(entries.iter().map(|(key, _)| key.clone()).collect())
            }
            Value::Str(text) => Some(text.chars().map(|ch| Value::Str(ch.to_string())).collect()),
            Value::Bytes(bytes) | Value::ByteArray(bytes) => {
                Some(bytes.iter().map(|byte| Value::Int(i64::from(*byte))).collect())
            }
            _ => None,
        }
    }

    /// Entries of a map-like value.
    pub fn map_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Dict(entries)
            | Value::OrderedDict(entries)
            | Value::Counter(entries)
            | Value::DefaultDict { entries, .. } => Some(entries),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Python-style truthiness, used by `bool(x)`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Complex(value) => value.re != 0.0 || value.im != 0.0,
            Value::Decimal(value) => !value.is_zero(),
            Value::Rational(value) => value.numer() != 0,
            Value::Str(text) => !text.is_empty(),
            Value::Bytes(bytes) | Value::ByteArray(bytes) => !bytes.is_empty(),
            Value::Tuple(items)
            | Value::List(items)
            | Value::Set(items)
            | Value::FrozenSet(items)
            | Value::Deque { items, .. } => !items.is_empty(),
            Value::Dict(entries)
            | Value::OrderedDict(entries)
            | Value::Counter(entries)
            | Value::DefaultDict { entries, .. } => !entries.is_empty(),
            Value::Duration(value) => !value.is_zero(),
            _ => true,
        }
    }
}

/// Deduplicates set elements, keeping the first occurrence.
pub fn unique_items(items: Vec<Value>) -> Result<Vec<Value>, EvalError> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(kind) = item.unhashable_type() {
            return Err(EvalError::unhashable(kind));
        }
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    Ok(out)
}

/// Merges map entries: a repeated key keeps its first position and takes the last value.
pub fn unique_entries(entries: Vec<(Value, Value)>) -> Result<Vec<(Value, Value)>, EvalError> {
    let mut index: HashMap<Value, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if let Some(kind) = key.unhashable_type() {
            return Err(EvalError::unhashable(kind));
        }
        match index.get(&key) {
            Some(&slot) => out[slot].1 = value,
            None => {
                index.insert(key.clone(), out.len());
                out.push((key, value));
            }
        }
    }
    Ok(out)
}

fn unordered_items_eq(left: &[Value], right: &[Value]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let right: HashSet<&Value> = right.iter().collect();
    left.iter().all(|item| right.contains(item))
}

fn unordered_entries_eq(left: &[(Value, Value)], right: &[(Value, Value)]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let right: HashMap<&Value, &Value> = right.iter().map(|(key, value)| (key, value)).collect();
    left.iter()
        .all(|(key, value)| right.get(key).is_some_and(|other| *other == value))
}

fn unordered_hash<T: Hash, H: Hasher>(items: impl Iterator<Item = T>, state: &mut H) {
    let mut combined: u64 = 0;
    let mut count: usize = 0;
    for item in items {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        combined = combined.wrapping_add(hasher.finish());
        count += 1;
    }
    count.hash(state);
    combined.hash(state);
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Complex(a), Value::Complex(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => {
                a == b && a.scale() == b.scale()
            }
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => unordered_items_eq(a, b),
            (Value::FrozenSet(a), Value::FrozenSet(b)) => unordered_items_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => unordered_entries_eq(a, b),
            (Value::OrderedDict(a), Value::OrderedDict(b)) => a == b,
            (Value::Counter(a), Value::Counter(b)) => unordered_entries_eq(a, b),
            (
                Value::DefaultDict {
                    factory: fa,
                    entries: ea,
                },
                Value::DefaultDict {
                    factory: fb,
                    entries: eb,
                },
            ) => fa == fb && unordered_entries_eq(ea, eb),
            (
                Value::Deque {
                    items: ia,
                    maxlen: ma,
                },
                Value::Deque {
                    items: ib,
                    maxlen: mb,
                },
            ) => ia == ib && ma == mb,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time { time: ta, tz: za }, Value::Time { time: tb, tz: zb }) => {
                ta == tb && za == zb
            }
            (
                Value::DateTime {
                    value: va,
                    tz: za,
                },
                Value::DateTime {
                    value: vb,
                    tz: zb,
                },
            ) => va == vb && za == zb,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::TimeZone(a), Value::TimeZone(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::None => {}
            Value::Bool(value) => value.hash(state),
            Value::Int(value) => value.hash(state),
            Value::Float(value) => value.to_bits().hash(state),
            Value::Complex(value) => value.hash(state),
            Value::Decimal(value) => {
                value.hash(state);
                value.scale().hash(state);
            }
            Value::Rational(value) => value.hash(state),
            Value::Str(text) => text.hash(state),
            Value::Bytes(bytes) | Value::ByteArray(bytes) => bytes.hash(state),
            Value::Tuple(items) | Value::List(items) => items.hash(state),
            Value::Set(items) | Value::FrozenSet(items) => unordered_hash(items.iter(), state),
            Value::OrderedDict(entries) => entries.hash(state),
            Value::Dict(entries) | Value::Counter(entries) => {
                unordered_hash(entries.iter(), state)
            }
            Value::DefaultDict { factory, entries } => {
                factory.hash(state);
                unordered_hash(entries.iter(), state);
            }
            Value::Deque { items, maxlen } => {
                items.hash(state);
                maxlen.hash(state);
            }
            Value::Date(value) => value.hash(state),
            Value::Time { time, tz } => {
                time.hash(state);
                tz.hash(state);
            }
            Value::DateTime { value, tz } => {
                value.hash(state);
                tz.hash(state);
            }
            Value::Duration(value) => value.hash(state),
            Value::TimeZone(value) => value.hash(state),
            Value::Type(name) => name.hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}
