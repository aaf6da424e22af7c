//! Purpose: Flat, post-order encoding of a `Value` for cache payloads.
//! Exports: `Node`, `flatten`, `rebuild`, `SnapshotError`.
//! Role: Lets the cache codec persist arbitrarily shaped values without recursive (de)serialization.
//! Invariants: Containers follow their children and name how many they take; maps take two per entry.
//! Invariants: `rebuild` is iterative and rejects streams nesting deeper than `MAX_CACHE_VALUE_DEPTH`.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, Duration, PrimitiveDateTime, Time};

use crate::core::format::MAX_CACHE_VALUE_DEPTH;
use crate::core::numeric::{Complex, Rational, decimal_bytes};
use crate::core::value::{TimeZone, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Decimal(#[serde(with = "decimal_bytes")] Decimal),
    Rational(Rational),
    Str(String),
    Bytes(Vec<u8>),
    ByteArray(Vec<u8>),
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
    Type(String),

    Tuple(u64),
    List(u64),
    Set(u64),
    FrozenSet(u64),
    Dict(u64),
    OrderedDict(u64),
    Counter(u64),
    DefaultDict { factory: Option<String>, len: u64 },
    Deque { maxlen: Option<u64>, len: u64 },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SnapshotError {
    TooDeep,
    MissingChildren { needed: u64, available: usize },
    Leftover(usize),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::TooDeep => {
                write!(f, "value nests deeper than {MAX_CACHE_VALUE_DEPTH} levels")
            }
            SnapshotError::MissingChildren { needed, available } => write!(
                f,
                "container needs {needed} values but only {available} precede it"
            ),
            SnapshotError::Leftover(count) => {
                write!(f, "stream leaves {count} values instead of one")
            }
        }
    }
}

enum Step<'a> {
    Visit(&'a Value, usize),
    Emit(Node),
}

fn len_of(len: usize) -> u64 {
    len as u64
}

/// Post-order node stream for `value`.
pub fn flatten(value: &Value) -> Result<Vec<Node>, SnapshotError> {
    let mut nodes = Vec::new();
    let mut steps = vec![Step::Visit(value, 1)];

    while let Some(step) = steps.pop() {
        let (value, depth) = match step {
            Step::Emit(node) => {
                nodes.push(node);
                continue;
            }
            Step::Visit(value, depth) => (value, depth),
        };
        if depth > MAX_CACHE_VALUE_DEPTH {
            return Err(SnapshotError::TooDeep);
        }

        let container = match value {
            Value::Tuple(items) => Some((Node::Tuple(len_of(items.len())), items.as_slice())),
            Value::List(items) => Some((Node::List(len_of(items.len())), items.as_slice())),
            Value::Set(items) => Some((Node::Set(len_of(items.len())), items.as_slice())),
            Value::FrozenSet(items) => {
                Some((Node::FrozenSet(len_of(items.len())), items.as_slice()))
            }
            Value::Deque { items, maxlen } => Some((
                Node::Deque {
                    maxlen: *maxlen,
                    len: len_of(items.len()),
                },
                items.as_slice(),
            )),
            _ => None,
        };
        if let Some((node, items)) = container {
            steps.push(Step::Emit(node));
            steps.extend(items.iter().rev().map(|item| Step::Visit(item, depth + 1)));
            continue;
        }

        let map = match value {
            Value::Dict(entries) => Some((Node::Dict(len_of(entries.len())), entries)),
            Value::OrderedDict(entries) => {
                Some((Node::OrderedDict(len_of(entries.len())), entries))
            }
            Value::Counter(entries) => Some((Node::Counter(len_of(entries.len())), entries)),
            Value::DefaultDict { factory, entries } => Some((
                Node::DefaultDict {
                    factory: factory.clone(),
                    len: len_of(entries.len()),
                },
                entries,
            )),
            _ => None,
        };
        if let Some((node, entries)) = map {
            steps.push(Step::Emit(node));
            for (key, item) in entries.iter().rev() {
                steps.push(Step::Visit(item, depth + 1));
                steps.push(Step::Visit(key, depth + 1));
            }
            continue;
        }

        nodes.push(leaf(value));
    }
    Ok(nodes)
}

fn leaf(value: &Value) -> Node {
    match value {
        Value::None => Node::None,
        Value::Bool(value) => Node::Bool(*value),
        Value::Int(value) => Node::Int(*value),
        Value::Float(value) => Node::Float(*value),
        Value::Complex(value) => Node::Complex(*value),
        Value::Decimal(value) => Node::Decimal(*value),
        Value::Rational(value) => Node::Rational(*value),
        Value::Str(text) => Node::Str(text.clone()),
        Value::Bytes(bytes) => Node::Bytes(bytes.clone()),
        Value::ByteArray(bytes) => Node::ByteArray(bytes.clone()),
        Value::Date(date) => Node::Date(*date),
        Value::Time { time, tz } => Node::Time {
            time: *time,
            tz: tz.clone(),
        },
        Value::DateTime { value, tz } => Node::DateTime {
            value: *value,
            tz: tz.clone(),
        },
        Value::Duration(duration) => Node::Duration(*duration),
        Value::TimeZone(tz) => Node::TimeZone(tz.clone()),
        Value::Type(name) => Node::Type(name.clone()),
        // Containers are expanded by `flatten` before reaching here.
        Value::Tuple(_)
        | Value::List(_)
        | Value::Set(_)
        | Value::FrozenSet(_)
        | Value::Deque { .. }
        | Value::Dict(_)
        | Value::OrderedDict(_)
        | Value::Counter(_)
        | Value::DefaultDict { .. } => Node::None,
    }
}

/// Reassembles the value a `flatten` stream describes.
pub fn rebuild(nodes: Vec<Node>) -> Result<Value, SnapshotError> {
    // Each entry carries the height of the subtree it holds.
    let mut stack: Vec<(Value, usize)> = Vec::new();

    for node in nodes {
        let built = match node {
            Node::Tuple(len) => items(&mut stack, len)?.map(Value::Tuple),
            Node::List(len) => items(&mut stack, len)?.map(Value::List),
            Node::Set(len) => items(&mut stack, len)?.map(Value::Set),
            Node::FrozenSet(len) => items(&mut stack, len)?.map(Value::FrozenSet),
            Node::Deque { maxlen, len } => {
                items(&mut stack, len)?.map(|items| Value::Deque { items, maxlen })
            }
            Node::Dict(len) => entries(&mut stack, len)?.map(Value::Dict),
            Node::OrderedDict(len) => entries(&mut stack, len)?.map(Value::OrderedDict),
            Node::Counter(len) => entries(&mut stack, len)?.map(Value::Counter),
            Node::DefaultDict { factory, len } => {
                entries(&mut stack, len)?.map(|entries| Value::DefaultDict { factory, entries })
            }
            other => Built {
                value: leaf_value(other),
                height: 1,
            },
        };
        if built.height > MAX_CACHE_VALUE_DEPTH {
            return Err(SnapshotError::TooDeep);
        }
        stack.push((built.value, built.height));
    }

    let count = stack.len();
    match stack.pop() {
        Some((value, _)) if count == 1 => Ok(value),
        _ => Err(SnapshotError::Leftover(count)),
    }
}

struct Built<T> {
    value: T,
    height: usize,
}

impl<T> Built<T> {
    fn map(self, f: impl FnOnce(T) -> Value) -> Built<Value> {
        Built {
            value: f(self.value),
            height: self.height,
        }
    }
}

fn take(stack: &mut Vec<(Value, usize)>, count: u64) -> Result<Vec<(Value, usize)>, SnapshotError> {
    let missing = SnapshotError::MissingChildren {
        needed: count,
        available: stack.len(),
    };
    let count = usize::try_from(count).map_err(|_| missing.clone())?;
    if count > stack.len() {
        return Err(missing);
    }
    Ok(stack.split_off(stack.len() - count))
}

fn items(stack: &mut Vec<(Value, usize)>, len: u64) -> Result<Built<Vec<Value>>, SnapshotError> {
    let children = take(stack, len)?;
    let height = children.iter().map(|(_, height)| *height).max().unwrap_or(0) + 1;
    Ok(Built {
        value: children.into_iter().map(|(value, _)| value).collect(),
        height,
    })
}

fn entries(
    stack: &mut Vec<(Value, usize)>,
    len: u64,
) -> Result<Built<Vec<(Value, Value)>>, SnapshotError> {
    let count = len.checked_mul(2).ok_or(SnapshotError::MissingChildren {
        needed: len,
        available: stack.len(),
    })?;
    let children = take(stack, count)?;
    let height = children.iter().map(|(_, height)| *height).max().unwrap_or(0) + 1;
    let mut pairs = Vec::with_capacity(children.len() / 2);
    let mut values = children.into_iter().map(|(value, _)| value);
    while let (Some(key), Some(value)) = (values.next(), values.next()) {
        pairs.push((key, value));
    }
    Ok(Built {
        value: pairs,
        height,
    })
}

fn leaf_value(node: Node) -> Value {
    match node {
        Node::None => Value::None,
        Node::Bool(value) => Value::Bool(value),
        Node::Int(value) => Value::Int(value),
        Node::Float(value) => Value::Float(value),
        Node::Complex(value) => Value::Complex(value),
        Node::Decimal(value) => Value::Decimal(value),
        Node::Rational(value) => Value::Rational(value),
        Node::Str(text) => Value::Str(text),
        Node::Bytes(bytes) => Value::Bytes(bytes),
        Node::ByteArray(bytes) => Value::ByteArray(bytes),
        Node::Date(date) => Value::Date(date),
        Node::Time { time, tz } => Value::Time { time, tz },
        Node::DateTime { value, tz } => Value::DateTime { value, tz },
        Node::Duration(duration) => Value::Duration(duration),
        Node::TimeZone(tz) => Value::TimeZone(tz),
        Node::Type(name) => Value::Type(name),
        Node::Tuple(_)
        | Node::List(_)
        | Node::Set(_)
        | Node::FrozenSet(_)
        | Node::Dict(_)
        | Node::OrderedDict(_)
        | Node::Counter(_)
        | Node::DefaultDict { .. }
        | Node::Deque { .. } => Value::None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, SnapshotError, flatten, rebuild};
    use crate::core::format::MAX_CACHE_VALUE_DEPTH;
    use crate::core::value::Value;

    fn nested_lists(depth: usize) -> Value {
        let mut value = Value::Int(0);
        for _ in 1..depth {
            value = Value::List(vec![value]);
        }
        value
    }

    #[test]
    fn containers_follow_their_children() {
        let value = Value::Dict(vec![(
            Value::from("k"),
            Value::Tuple(vec![Value::Int(1), Value::Int(2)]),
        )]);
        let nodes = flatten(&value).expect("flatten");
        assert_eq!(
            nodes,
            vec![
                Node::Str("k".to_string()),
                Node::Int(1),
                Node::Int(2),
                Node::Tuple(2),
                Node::Dict(1),
            ]
        );
        assert_eq!(rebuild(nodes).expect("rebuild"), value);
    }

    #[test]
    fn depth_limit_applies_both_ways() {
        let deepest = nested_lists(MAX_CACHE_VALUE_DEPTH);
        let nodes = flatten(&deepest).expect("flatten at limit");
        assert_eq!(rebuild(nodes).expect("rebuild at limit"), deepest);

        let too_deep = nested_lists(MAX_CACHE_VALUE_DEPTH + 1);
        assert_eq!(flatten(&too_deep), Err(SnapshotError::TooDeep));
    }

    #[test]
    fn hostile_streams_are_rejected_not_overflowed() {
        let mut nodes = vec![Node::Int(0)];
        nodes.extend(std::iter::repeat_n(Node::Set(1), 2_000_000));
        assert_eq!(rebuild(nodes), Err(SnapshotError::TooDeep));

        assert_eq!(
            rebuild(vec![Node::Int(1), Node::Dict(1)]),
            Err(SnapshotError::MissingChildren {
                needed: 2,
                available: 1
            })
        );
        assert_eq!(
            rebuild(vec![Node::List(u64::MAX)]),
            Err(SnapshotError::MissingChildren {
                needed: u64::MAX,
                available: 0
            })
        );
        assert_eq!(rebuild(vec![Node::Int(1), Node::Int(2)]), Err(SnapshotError::Leftover(2)));
        assert_eq!(rebuild(Vec::new()), Err(SnapshotError::Leftover(0)));
    }
}
