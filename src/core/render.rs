//! Purpose: Print a `Value` as literal text that parses and evaluates back to an equal value.
//! Exports: `render`, `to_literal`, `MAX_LINE_WIDTH`.
//! Role: Output side of the public API (`dumps`) and the `str()` constructor.
//! Invariants: Output uses only standard registry names and never spans a token across lines.
//! Invariants: A value is printed on one line when it fits `MAX_LINE_WIDTH`, otherwise one element per line.

use std::fmt::Write as _;

use time::Duration;

use crate::core::numeric::Complex;
use crate::core::stack::ensure_sufficient_stack;
use crate::core::value::{TimeZone, Value};

pub const MAX_LINE_WIDTH: usize = 79;
const INDENT: usize = 4;
const MICROS_PER_SECOND: i128 = 1_000_000;
const MICROS_PER_DAY: i128 = 86_400 * MICROS_PER_SECOND;

/// Multi-line aware rendering.
pub fn render(value: &Value) -> String {
    let node = build(value);
    let mut out = String::new();
    layout(&node, 0, 0, &mut out);
    out
}

/// Single-line rendering.
pub fn to_literal(value: &Value) -> String {
    flat(&build(value))
}

enum Node {
    Text(String),
    Seq {
        open: String,
        items: Vec<Node>,
        close: String,
        /// Tuples need `(x,)` for a single element.
        single_comma: bool,
    },
    Pair(Box<Node>, Box<Node>),
}

fn seq(open: &str, items: Vec<Node>, close: &str) -> Node {
    Node::Seq {
        open: open.to_string(),
        items,
        close: close.to_string(),
        single_comma: false,
    }
}

fn flat(node: &Node) -> String {
    ensure_sufficient_stack(|| match node {
        Node::Text(text) => text.clone(),
        Node::Seq {
            open,
            items,
            close,
            single_comma,
        } => {
            let mut out = open.clone();
            let parts: Vec<String> = items.iter().map(flat).collect();
            out.push_str(&parts.join(", "));
            if *single_comma && items.len() == 1 {
                out.push(',');
            }
            out.push_str(close);
            out
        }
        Node::Pair(key, value) => format!("{}: {}", flat(key), flat(value)),
    })
}

fn layout(node: &Node, indent: usize, column: usize, out: &mut String) {
    ensure_sufficient_stack(|| layout_node(node, indent, column, out));
}

fn layout_node(node: &Node, indent: usize, column: usize, out: &mut String) {
    let single = flat(node);
    if column + single.chars().count() <= MAX_LINE_WIDTH {
        out.push_str(&single);
        return;
    }
    match node {
        Node::Text(_) => out.push_str(&single),
        Node::Seq {
            open, items, close, ..
        } => {
            if items.is_empty() {
                out.push_str(&single);
                return;
            }
            let inner = indent + INDENT;
            out.push_str(open);
            out.push('\n');
            for item in items {
                out.push_str(&" ".repeat(inner));
                layout(item, inner, inner, out);
                out.push_str(",\n");
            }
            out.push_str(&" ".repeat(indent));
            out.push_str(close);
        }
        Node::Pair(key, value) => {
            let key = flat(key);
            out.push_str(&key);
            out.push_str(": ");
            layout(value, indent, column + key.chars().count() + 2, out);
        }
    }
}

fn build(value: &Value) -> Node {
    ensure_sufficient_stack(|| match value {
        Value::None => Node::Text("None".to_string()),
        Value::Bool(true) => Node::Text("True".to_string()),
        Value::Bool(false) => Node::Text("False".to_string()),
        Value::Int(value) => Node::Text(int_text(*value)),
        Value::Float(value) => Node::Text(float_text(*value)),
        Value::Complex(value) => Node::Text(complex_text(*value)),
        Value::Decimal(value) => Node::Text(format!("decimal.Decimal('{value}')")),
        Value::Rational(value) => Node::Text(format!(
            "fractions.Fraction({}, {})",
            int_text(value.numer()),
            int_text(value.denom())
        )),
        Value::Str(text) => Node::Text(quote_text(text)),
        Value::Bytes(bytes) => Node::Text(quote_bytes(bytes)),
        Value::ByteArray(bytes) => Node::Text(format!("bytearray({})", quote_bytes(bytes))),
        Value::Tuple(items) => Node::Seq {
            open: "(".to_string(),
            items: items.iter().map(build).collect(),
            close: ")".to_string(),
            single_comma: true,
        },
        Value::List(items) => seq("[", items.iter().map(build).collect(), "]"),
        Value::Set(items) if items.is_empty() => Node::Text("set()".to_string()),
        Value::Set(items) => seq("{", items.iter().map(build).collect(), "}"),
        Value::FrozenSet(items) if items.is_empty() => Node::Text("frozenset()".to_string()),
        Value::FrozenSet(items) => seq("frozenset({", items.iter().map(build).collect(), "})"),
        Value::Dict(entries) => seq("{", pairs(entries), "}"),
        Value::OrderedDict(entries) if entries.is_empty() => {
            Node::Text("collections.OrderedDict()".to_string())
        }
        Value::OrderedDict(entries) => {
            let items = entries
                .iter()
                .map(|(key, value)| Node::Seq {
                    open: "(".to_string(),
                    items: vec![build(key), build(value)],
                    close: ")".to_string(),
                    single_comma: true,
                })
                .collect();
            seq("collections.OrderedDict([", items, "])")
        }
        Value::Counter(entries) if entries.is_empty() => {
            Node::Text("collections.Counter()".to_string())
        }
        Value::Counter(entries) => seq("collections.Counter({", pairs(entries), "})"),
        Value::DefaultDict { factory, entries } => {
            let factory = factory.as_deref().unwrap_or("None");
            seq(
                &format!("collections.defaultdict({factory}, {{"),
                pairs(entries),
                "})",
            )
        }
        Value::Deque { items, maxlen } => {
            let close = match maxlen {
                Some(limit) => format!("], maxlen={limit})"),
                None => "])".to_string(),
            };
            seq("collections.deque([", items.iter().map(build).collect(), &close)
        }
        Value::Date(date) => Node::Text(format!(
            "datetime.date({}, {}, {})",
            date.year(),
            u8::from(date.month()),
            date.day()
        )),
        Value::Time { time, tz } => {
            let mut text = format!("datetime.time({}, {}", time.hour(), time.minute());
            push_seconds(&mut text, time.second(), time.microsecond());
            push_tzinfo(&mut text, tz.as_ref());
            text.push(')');
            Node::Text(text)
        }
        Value::DateTime { value, tz } => {
            let mut text = format!(
                "datetime.datetime({}, {}, {}, {}, {}",
                value.year(),
                u8::from(value.month()),
                value.day(),
                value.hour(),
                value.minute()
            );
            push_seconds(&mut text, value.second(), value.microsecond());
            push_tzinfo(&mut text, tz.as_ref());
            text.push(')');
            Node::Text(text)
        }
        Value::Duration(duration) => Node::Text(duration_text(*duration)),
        Value::TimeZone(tz) => Node::Text(timezone_text(tz)),
        Value::Type(name) => Node::Text(name.clone()),
    })
}

fn pairs(entries: &[(Value, Value)]) -> Vec<Node> {
    entries
        .iter()
        .map(|(key, value)| Node::Pair(Box::new(build(key)), Box::new(build(value))))
        .collect()
}

fn int_text(value: i64) -> String {
    if value == i64::MIN {
        format!("int('{value}')")
    } else {
        value.to_string()
    }
}

fn float_text(value: f64) -> String {
    if value.is_nan() {
        "float('nan')".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "float('inf')".to_string()
        } else {
            "float('-inf')".to_string()
        }
    } else {
        format!("{value:?}")
    }
}

fn complex_text(value: Complex) -> String {
    let Complex { re, im } = value;
    let negative_zero = |part: f64| part == 0.0 && part.is_sign_negative();
    // Signed zeros and non-finite parts do not survive the `(a+bj)` arithmetic.
    if !re.is_finite() || !im.is_finite() || negative_zero(re) || negative_zero(im) {
        return format!("complex({}, {})", float_text(re), float_text(im));
    }
    if re == 0.0 && !im.is_sign_negative() {
        return format!("{im:?}j");
    }
    if im.is_sign_negative() {
        format!("({re:?}-{:?}j)", -im)
    } else {
        format!("({re:?}+{im:?}j)")
    }
}

fn push_seconds(text: &mut String, second: u8, microsecond: u32) {
    if second != 0 || microsecond != 0 {
        let _ = write!(text, ", {second}");
    }
    if microsecond != 0 {
        let _ = write!(text, ", {microsecond}");
    }
}

fn push_tzinfo(text: &mut String, tz: Option<&TimeZone>) {
    if let Some(tz) = tz {
        let _ = write!(text, ", tzinfo={}", timezone_text(tz));
    }
}

fn duration_text(duration: Duration) -> String {
    let total = i128::from(duration.whole_seconds()) * MICROS_PER_SECOND
        + i128::from(duration.subsec_microseconds());
    if total == 0 {
        return "datetime.timedelta(0)".to_string();
    }
    let days = total.div_euclid(MICROS_PER_DAY);
    let rest = total.rem_euclid(MICROS_PER_DAY);
    let seconds = rest / MICROS_PER_SECOND;
    let micros = rest % MICROS_PER_SECOND;

    let mut parts = Vec::new();
    if days != 0 {
        parts.push(format!("days={days}"));
    }
    if seconds != 0 {
        parts.push(format!("seconds={seconds}"));
    }
    if micros != 0 {
        parts.push(format!("microseconds={micros}"));
    }
    format!("datetime.timedelta({})", parts.join(", "))
}

fn timezone_text(tz: &TimeZone) -> String {
    if tz.is_utc() {
        return "datetime.timezone.utc".to_string();
    }
    let offset = duration_text(Duration::seconds(i64::from(tz.offset.whole_seconds())));
    match &tz.name {
        Some(name) => format!("datetime.timezone({offset}, {})", quote_text(name)),
        None => format!("datetime.timezone({offset})"),
    }
}

fn pick_quote(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double { '"' } else { '\'' }
}

fn quote_text(text: &str) -> String {
    let quote = pick_quote(text.contains('\''), text.contains('"'));
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            ch if ch.is_control() => {
                let code = u32::from(ch);
                let _ = if code <= 0xff {
                    write!(out, "\\x{code:02x}")
                } else if code <= 0xffff {
                    write!(out, "\\u{code:04x}")
                } else {
                    write!(out, "\\U{code:08x}")
                };
            }
            ch => out.push(ch),
        }
    }
    out.push(quote);
    out
}

fn quote_bytes(bytes: &[u8]) -> String {
    let quote = pick_quote(bytes.contains(&b'\''), bytes.contains(&b'"'));
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote);
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            byte if char::from(byte) == quote => {
                out.push('\\');
                out.push(quote);
            }
            0x20..=0x7e => out.push(char::from(byte)),
            byte => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push(quote);
    out
}
