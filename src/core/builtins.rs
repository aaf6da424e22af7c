// Constructors installed by `NameRegistry::standard`.
use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use time::{Date, Duration, Month, PrimitiveDateTime, Time, UtcOffset};

use crate::core::eval::EvalError;
use crate::core::numeric::{Complex, Rational};
use crate::core::registry::{CallArgs, NameRegistry};
use crate::core::render;
use crate::core::value::{TimeZone, Value, unique_entries, unique_items};

const MAX_BYTES_LEN: i64 = 1 << 24;
const MAX_TIMEDELTA_DAYS: i128 = 999_999_999;
const MICROS_PER_SECOND: i128 = 1_000_000;
const MICROS_PER_DAY: i128 = 86_400 * MICROS_PER_SECOND;

pub(crate) fn install(registry: NameRegistry) -> NameRegistry {
    registry
        .with_constructor("int", int)
        .with_constructor("float", float)
        .with_constructor("complex", complex)
        .with_constructor("bool", bool_)
        .with_constructor("str", str_)
        .with_constructor("bytes", |args| bytes_like(args).map(Value::Bytes))
        .with_constructor("bytearray", |args| bytes_like(args).map(Value::ByteArray))
        .with_constructor("tuple", |args| sequence(args).map(Value::Tuple))
        .with_constructor("list", |args| sequence(args).map(Value::List))
        .with_constructor("set", |args| unique_items(sequence(args)?).map(Value::Set))
        .with_constructor("frozenset", |args| {
            unique_items(sequence(args)?).map(Value::FrozenSet)
        })
        .with_constructor("dict", |args| mapping(args).map(Value::Dict))
        .with_constructor("collections.OrderedDict", |args| {
            mapping(args).map(Value::OrderedDict)
        })
        .with_constructor("collections.Counter", counter)
        .with_constructor("collections.defaultdict", defaultdict)
        .with_constructor("collections.deque", deque)
        .with_constructor("decimal.Decimal", decimal)
        .with_constructor("fractions.Fraction", fraction)
        .with_constructor("datetime.date", date)
        .with_constructor("datetime.time", time_)
        .with_constructor("datetime.datetime", datetime)
        .with_constructor("datetime.timedelta", timedelta)
        .with_constructor("datetime.timezone", timezone)
        .with_constant("datetime.timezone.utc", Value::TimeZone(TimeZone::utc()))
}

fn slots<const N: usize>(
    args: CallArgs,
    params: &[&str; N],
    required: usize,
) -> Result<[Option<Value>; N], EvalError> {
    let mut bound = args.bind(params, required)?.into_iter();
    Ok(std::array::from_fn(|_| bound.next().flatten()))
}

/// `None` for a missing argument or an explicit `None`.
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|value| *value != Value::None)
}

fn integer_arg(value: &Value) -> Result<i64, EvalError> {
    value.as_int().ok_or_else(|| {
        EvalError::new(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

fn items_of(value: Value) -> Result<Vec<Value>, EvalError> {
    value
        .iter_items()
        .ok_or_else(|| EvalError::new(format!("'{}' object is not iterable", value.type_name())))
}

fn int(args: CallArgs) -> Result<Value, EvalError> {
    let [value, base] = slots(args, &["x", "base"], 0)?;
    match (value, base) {
        (None, None) => Ok(Value::Int(0)),
        (None, Some(_)) => Err(EvalError::new("int() missing string argument")),
        (Some(value), None) => int_from(&value).map(Value::Int),
        (Some(value), Some(base)) => {
            let base = integer_arg(&base)?;
            let text = match &value {
                Value::Str(text) => text.clone(),
                Value::Bytes(bytes) | Value::ByteArray(bytes) => {
                    String::from_utf8_lossy(bytes).into_owned()
                }
                _ => {
                    return Err(EvalError::new(
                        "int() can't convert non-string with explicit base",
                    ));
                }
            };
            parse_int_text(&text, base).map(Value::Int)
        }
    }
}

fn int_from(value: &Value) -> Result<i64, EvalError> {
    match value {
        Value::Int(value) => Ok(*value),
        Value::Bool(value) => Ok(i64::from(*value)),
        Value::Float(value) => float_to_int(*value),
        Value::Decimal(value) => value
            .trunc()
            .to_i64()
            .ok_or_else(|| EvalError::new("int too large to convert")),
        Value::Rational(value) => Ok(value.numer() / value.denom()),
        Value::Str(text) => parse_int_text(text, 10),
        Value::Bytes(bytes) | Value::ByteArray(bytes) => {
            parse_int_text(&String::from_utf8_lossy(bytes), 10)
        }
        other => Err(EvalError::new(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(value: f64) -> Result<i64, EvalError> {
    if value.is_nan() {
        return Err(EvalError::new("cannot convert float NaN to integer"));
    }
    if value.is_infinite() {
        return Err(EvalError::new("cannot convert float infinity to integer"));
    }
    let truncated = value.trunc();
    if truncated < -9_223_372_036_854_775_808.0 || truncated >= 9_223_372_036_854_775_808.0 {
        return Err(EvalError::new("int too large to convert"));
    }
    Ok(truncated as i64)
}

fn parse_int_text(text: &str, base: i64) -> Result<i64, EvalError> {
    let invalid = || {
        EvalError::new(format!(
            "invalid literal for int() with base {base}: '{text}'"
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(EvalError::new("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = unsigned.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &lower[2..]),
        (0 | 8, Some("0o")) => (8, &lower[2..]),
        (0 | 2, Some("0b")) => (2, &lower[2..]),
        (0, _) => (10, lower.as_str()),
        (base, _) => (base as u32, lower.as_str()),
    };
    let digits = digits.strip_prefix('_').unwrap_or(digits);
    if digits.is_empty() || digits.ends_with('_') || digits.contains("__") {
        return Err(invalid());
    }
    let magnitude =
        u64::from_str_radix(&digits.replace('_', ""), radix as u32).map_err(|_| invalid())?;
    let signed = if negative {
        -i128::from(magnitude)
    } else {
        i128::from(magnitude)
    };
    i64::try_from(signed).map_err(|_| EvalError::new("int too large to convert"))
}

fn float(args: CallArgs) -> Result<Value, EvalError> {
    let [value] = slots(args, &["x"], 0)?;
    match value {
        None => Ok(Value::Float(0.0)),
        Some(value) => float_from(&value).map(Value::Float),
    }
}

fn float_from(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Int(value) => Ok(*value as f64),
        Value::Bool(value) => Ok(if *value { 1.0 } else { 0.0 }),
        Value::Float(value) => Ok(*value),
        Value::Decimal(value) => value
            .to_f64()
            .ok_or_else(|| EvalError::new("decimal cannot be converted to float")),
        Value::Rational(value) => Ok(value.to_f64()),
        Value::Str(text) => parse_float_text(text),
        other => Err(EvalError::new(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_float_text(text: &str) -> Result<f64, EvalError> {
    let lower = text.trim().to_ascii_lowercase();
    let (sign, unsigned) = match lower.as_bytes().first() {
        Some(b'-') => (-1.0, &lower[1..]),
        Some(b'+') => (1.0, &lower[1..]),
        _ => (1.0, lower.as_str()),
    };
    let magnitude = match unsigned {
        "nan" => f64::NAN,
        "inf" | "infinity" => f64::INFINITY,
        digits if !digits.is_empty() && digits.bytes().all(|b| b"0123456789._e+-".contains(&b)) => {
            digits.replace('_', "").parse::<f64>().map_err(|_| {
                EvalError::new(format!("could not convert string to float: '{text}'"))
            })?
        }
        _ => {
            return Err(EvalError::new(format!(
                "could not convert string to float: '{text}'"
            )));
        }
    };
    Ok(sign * magnitude)
}

fn complex(args: CallArgs) -> Result<Value, EvalError> {
    let [real, imag] = slots(args, &["real", "imag"], 0)?;
    let real = real.unwrap_or(Value::Int(0));

    let (mut re, real_im) = match &real {
        Value::Complex(value) => (value.re, Some(value.im)),
        Value::Str(text) => {
            if imag.is_some() {
                return Err(EvalError::new(
                    "complex() can't take second arg if first is a string",
                ));
            }
            return parse_complex_text(text).map(Value::Complex);
        }
        other => (complex_part(other, "first")?, None),
    };

    let im = match imag {
        None => real_im.unwrap_or(0.0),
        Some(Value::Complex(value)) => {
            re -= value.im;
            real_im.map_or(value.re, |im| im + value.re)
        }
        Some(other) => {
            let part = complex_part(&other, "second")?;
            real_im.map_or(part, |im| im + part)
        }
    };
    Ok(Value::Complex(Complex::new(re, im)))
}

fn complex_part(value: &Value, which: &str) -> Result<f64, EvalError> {
    match value {
        Value::Int(_)
        | Value::Bool(_)
        | Value::Float(_)
        | Value::Decimal(_)
        | Value::Rational(_) => float_from(value),
        other => Err(EvalError::new(format!(
            "complex() {which} argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_complex_text(text: &str) -> Result<Complex, EvalError> {
    let invalid = || EvalError::new("complex() arg is a malformed string");
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed)
        .trim();
    let Some(body) = inner.strip_suffix(['j', 'J']) else {
        return Ok(Complex::new(parse_float_text(inner).map_err(|_| invalid())?, 0.0));
    };
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&idx| matches!(bytes[idx], b'+' | b'-') && !matches!(bytes[idx - 1], b'e' | b'E'));
    let (re_text, im_text) = match split {
        Some(idx) => (&body[..idx], &body[idx..]),
        None => ("0", body),
    };
    let im = match im_text {
        "" | "+" => 1.0,
        "-" => -1.0,
        other => parse_float_text(other).map_err(|_| invalid())?,
    };
    let re = parse_float_text(re_text).map_err(|_| invalid())?;
    Ok(Complex::new(re, im))
}

fn bool_(args: CallArgs) -> Result<Value, EvalError> {
    let [value] = slots(args, &["x"], 0)?;
    Ok(Value::Bool(value.is_some_and(|value| value.truthy())))
}

fn str_(args: CallArgs) -> Result<Value, EvalError> {
    let [value] = slots(args, &["object"], 0)?;
    let text = match value {
        None => String::new(),
        Some(Value::Str(text)) => text,
        Some(Value::Decimal(value)) => value.to_string(),
        Some(Value::Rational(value)) => value.to_string(),
        Some(other) => render::to_literal(&other),
    };
    Ok(Value::Str(text))
}

fn bytes_like(args: CallArgs) -> Result<Vec<u8>, EvalError> {
    let [source, encoding] = slots(args, &["source", "encoding"], 0)?;
    let Some(source) = source else {
        return Ok(Vec::new());
    };
    match (source, encoding) {
        (Value::Str(text), Some(Value::Str(encoding))) => encode_text(&text, &encoding),
        (Value::Str(_), _) => Err(EvalError::new("string argument without an encoding")),
        (_, Some(_)) => Err(EvalError::new("encoding without a string argument")),
        (Value::Bytes(bytes) | Value::ByteArray(bytes), None) => Ok(bytes),
        (Value::Int(count), None) => {
            if count < 0 {
                return Err(EvalError::new("negative count"));
            }
            if count > MAX_BYTES_LEN {
                return Err(EvalError::new("byte count too large"));
            }
            Ok(vec![0; count as usize])
        }
        (
            source @ (Value::Tuple(_)
            | Value::List(_)
            | Value::Set(_)
            | Value::FrozenSet(_)
            | Value::Deque { .. }),
            None,
        ) => items_of(source)?
            .iter()
            .map(|item| {
                let value = integer_arg(item)?;
                u8::try_from(value).map_err(|_| EvalError::new("bytes must be in range(0, 256)"))
            })
            .collect(),
        (other, None) => Err(EvalError::new(format!(
            "cannot convert '{}' object to bytes",
            other.type_name()
        ))),
    }
}

fn encode_text(text: &str, encoding: &str) -> Result<Vec<u8>, EvalError> {
    match encoding.to_ascii_lowercase().replace('_', "-").as_str() {
        "utf-8" | "utf8" => Ok(text.as_bytes().to_vec()),
        "ascii" | "us-ascii" => {
            if text.is_ascii() {
                Ok(text.as_bytes().to_vec())
            } else {
                Err(EvalError::new("'ascii' codec can't encode character"))
            }
        }
        "latin-1" | "latin1" | "iso-8859-1" => text
            .chars()
            .map(|ch| {
                u8::try_from(u32::from(ch))
                    .map_err(|_| EvalError::new("'latin-1' codec can't encode character"))
            })
            .collect(),
        other => Err(EvalError::new(format!("unknown encoding: {other}"))),
    }
}

fn sequence(args: CallArgs) -> Result<Vec<Value>, EvalError> {
    match args.positional_only(1)?.into_iter().next() {
        None => Ok(Vec::new()),
        Some(iterable) => items_of(iterable),
    }
}

fn mapping(args: CallArgs) -> Result<Vec<(Value, Value)>, EvalError> {
    let CallArgs {
        name,
        positional,
        keywords,
    } = args;
    if positional.len() > 1 {
        return Err(EvalError::new(format!(
            "{name}() expected at most 1 argument, got {}",
            positional.len()
        )));
    }
    let mut entries = match positional.into_iter().next() {
        None => Vec::new(),
        Some(source) => entries_from(source)?,
    };
    entries.extend(keywords.into_iter().map(|(key, value)| (Value::Str(key), value)));
    unique_entries(entries)
}

fn entries_from(source: Value) -> Result<Vec<(Value, Value)>, EvalError> {
    if let Some(entries) = source.map_entries() {
        return Ok(entries.to_vec());
    }
    items_of(source)?
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Tuple(pair) | Value::List(pair) => {
                let len = pair.len();
                let [key, value]: [Value; 2] = pair.try_into().map_err(|_| {
                    EvalError::new(format!(
                        "dictionary update sequence element #{idx} has length {len}; 2 is required"
                    ))
                })?;
                Ok((key, value))
            }
            _ => Err(EvalError::new(format!(
                "cannot convert dictionary update sequence element #{idx} to a sequence"
            ))),
        })
        .collect()
}

fn counter(args: CallArgs) -> Result<Value, EvalError> {
    let CallArgs {
        name,
        positional,
        keywords,
    } = args;
    if positional.len() > 1 {
        return Err(EvalError::new(format!(
            "{name}() expected at most 1 argument, got {}",
            positional.len()
        )));
    }

    let mut counts = CountTable::default();
    if let Some(source) = positional.into_iter().next() {
        match source.map_entries() {
            Some(entries) => {
                for (key, count) in entries.to_vec() {
                    counts.add(key, count)?;
                }
            }
            None => {
                for item in items_of(source)? {
                    counts.add(item, Value::Int(1))?;
                }
            }
        }
    }
    for (key, count) in keywords {
        counts.add(Value::Str(key), count)?;
    }
    Ok(Value::Counter(counts.entries))
}

#[derive(Default)]
struct CountTable {
    index: HashMap<Value, usize>,
    entries: Vec<(Value, Value)>,
}

impl CountTable {
    fn add(&mut self, key: Value, count: Value) -> Result<(), EvalError> {
        if let Some(kind) = key.unhashable_type() {
            return Err(EvalError::unhashable(kind));
        }
        let Some(&slot) = self.index.get(&key) else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, count));
            return Ok(());
        };
        let current = &mut self.entries[slot].1;
        *current = match (&*current, &count) {
            (Value::Int(a), Value::Int(b)) => Value::Int(
                a.checked_add(*b)
                    .ok_or_else(|| EvalError::new("count overflows a 64-bit integer"))?,
            ),
            (a, b) => {
                return Err(EvalError::new(format!(
                    "unsupported operand type(s) for +: '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };
        Ok(())
    }
}

fn defaultdict(args: CallArgs) -> Result<Value, EvalError> {
    let CallArgs {
        name,
        mut positional,
        keywords,
    } = args;
    let factory = if positional.is_empty() {
        None
    } else {
        match positional.remove(0) {
            Value::None => None,
            Value::Type(factory) => Some(factory),
            _ => return Err(EvalError::new("first argument must be callable or None")),
        }
    };
    let entries = mapping(CallArgs::new(name, positional, keywords))?;
    Ok(Value::DefaultDict { factory, entries })
}

fn deque(args: CallArgs) -> Result<Value, EvalError> {
    let [iterable, maxlen] = slots(args, &["iterable", "maxlen"], 0)?;
    let mut items = match iterable {
        None => Vec::new(),
        Some(iterable) => items_of(iterable)?,
    };
    let maxlen = match present(maxlen) {
        None => None,
        Some(value) => {
            let value = integer_arg(&value)?;
            Some(u64::try_from(value).map_err(|_| EvalError::new("maxlen must be non-negative"))?)
        }
    };
    if let Some(limit) = maxlen {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let excess = items.len().saturating_sub(limit);
        items.drain(..excess);
    }
    Ok(Value::Deque { items, maxlen })
}

fn decimal(args: CallArgs) -> Result<Value, EvalError> {
    let [value] = slots(args, &["value"], 0)?;
    let decimal = match value {
        None => Decimal::ZERO,
        Some(Value::Int(value)) => Decimal::from(value),
        Some(Value::Bool(value)) => Decimal::from(i64::from(value)),
        Some(Value::Decimal(value)) => value,
        Some(Value::Float(value)) => {
            if !value.is_finite() {
                return Err(EvalError::new(
                    "Decimal special values (NaN, Infinity) are not supported",
                ));
            }
            Decimal::from_f64_retain(value)
                .ok_or_else(|| EvalError::new(format!("float {value} is out of Decimal range")))?
        }
        Some(Value::Str(text)) => parse_decimal_text(&text)?,
        Some(other) => {
            return Err(EvalError::new(format!(
                "conversion from {} to Decimal is not supported",
                other.type_name()
            )));
        }
    };
    Ok(Value::Decimal(decimal))
}

fn parse_decimal_text(text: &str) -> Result<Decimal, EvalError> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("nan") || lower.contains("inf") {
        return Err(EvalError::new(
            "Decimal special values (NaN, Infinity) are not supported",
        ));
    }
    let parsed = if lower.contains('e') {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };
    parsed.map_err(|_| EvalError::new(format!("invalid literal for Decimal: '{text}'")))
}

fn fraction(args: CallArgs) -> Result<Value, EvalError> {
    let [numerator, denominator] = slots(args, &["numerator", "denominator"], 0)?;
    let numerator = numerator.unwrap_or(Value::Int(0));
    let value = match (numerator, present(denominator)) {
        (numerator, None) => match numerator {
            Value::Int(value) => Rational::from_integer(value),
            Value::Bool(value) => Rational::from_integer(i64::from(value)),
            Value::Rational(value) => value,
            Value::Float(value) => Rational::from_float(value)?,
            Value::Decimal(value) => Rational::from_decimal(value)?,
            Value::Str(text) => Rational::from_str(&text)?,
            other => {
                return Err(EvalError::new(format!(
                    "argument should be a string or a Rational instance, not '{}'",
                    other.type_name()
                )));
            }
        },
        (Value::Int(numer), Some(Value::Int(denom))) => Rational::new(numer, denom)?,
        (numerator, Some(denominator)) => {
            match (rational_arg(&numerator), rational_arg(&denominator)) {
                (Some(numer), Some(denom)) => numer.div(denom)?,
                _ => {
                    return Err(EvalError::new(
                        "both arguments should be Rational instances",
                    ));
                }
            }
        }
    };
    Ok(Value::Rational(value))
}

fn rational_arg(value: &Value) -> Option<Rational> {
    match value {
        Value::Int(value) => Some(Rational::from_integer(*value)),
        Value::Bool(value) => Some(Rational::from_integer(i64::from(*value))),
        Value::Rational(value) => Some(*value),
        _ => None,
    }
}

fn date(args: CallArgs) -> Result<Value, EvalError> {
    let [year, month, day] = slots(args, &["year", "month", "day"], 3)?;
    build_date(year, month, day).map(Value::Date)
}

fn build_date(
    year: Option<Value>,
    month: Option<Value>,
    day: Option<Value>,
) -> Result<Date, EvalError> {
    let year = integer_arg(&year.unwrap_or(Value::None))?;
    let month = integer_arg(&month.unwrap_or(Value::None))?;
    let day = integer_arg(&day.unwrap_or(Value::None))?;
    if !(1..=9999).contains(&year) {
        return Err(EvalError::new(format!("year {year} is out of range")));
    }
    let month = u8::try_from(month)
        .ok()
        .and_then(|month| Month::try_from(month).ok())
        .ok_or_else(|| EvalError::new("month must be in 1..12"))?;
    let day = u8::try_from(day).map_err(|_| EvalError::new("day is out of range for month"))?;
    Date::from_calendar_date(year as i32, month, day)
        .map_err(|_| EvalError::new("day is out of range for month"))
}

fn build_time(
    hour: Option<Value>,
    minute: Option<Value>,
    second: Option<Value>,
    microsecond: Option<Value>,
) -> Result<Time, EvalError> {
    fn component(value: Option<Value>, max: i64, message: &str) -> Result<i64, EvalError> {
        let value = match value {
            None => 0,
            Some(value) => integer_arg(&value)?,
        };
        if (0..=max).contains(&value) {
            Ok(value)
        } else {
            Err(EvalError::new(message))
        }
    }
    let hour = component(hour, 23, "hour must be in 0..23")?;
    let minute = component(minute, 59, "minute must be in 0..59")?;
    let second = component(second, 59, "second must be in 0..59")?;
    let micro = component(microsecond, 999_999, "microsecond must be in 0..999999")?;
    Time::from_hms_micro(hour as u8, minute as u8, second as u8, micro as u32)
        .map_err(|err| EvalError::new(err.to_string()))
}

fn tzinfo_arg(value: Option<Value>) -> Result<Option<TimeZone>, EvalError> {
    match present(value) {
        None => Ok(None),
        Some(Value::TimeZone(tz)) => Ok(Some(tz)),
        Some(other) => Err(EvalError::new(format!(
            "tzinfo argument must be None or of a tzinfo subclass, not type '{}'",
            other.type_name()
        ))),
    }
}

fn time_(args: CallArgs) -> Result<Value, EvalError> {
    let [hour, minute, second, microsecond, tzinfo] = slots(
        args,
        &["hour", "minute", "second", "microsecond", "tzinfo"],
        0,
    )?;
    let time = build_time(hour, minute, second, microsecond)?;
    let tz = tzinfo_arg(tzinfo)?;
    Ok(Value::Time { time, tz })
}

fn datetime(args: CallArgs) -> Result<Value, EvalError> {
    let [year, month, day, hour, minute, second, microsecond, tzinfo] = slots(
        args,
        &[
            "year",
            "month",
            "day",
            "hour",
            "minute",
            "second",
            "microsecond",
            "tzinfo",
        ],
        3,
    )?;
    let date = build_date(year, month, day)?;
    let time = build_time(hour, minute, second, microsecond)?;
    let tz = tzinfo_arg(tzinfo)?;
    Ok(Value::DateTime {
        value: PrimitiveDateTime::new(date, time),
        tz,
    })
}

fn timedelta(args: CallArgs) -> Result<Value, EvalError> {
    const PARAMS: [&str; 7] = [
        "days",
        "seconds",
        "microseconds",
        "milliseconds",
        "minutes",
        "hours",
        "weeks",
    ];
    const WEIGHTS: [i128; 7] = [
        MICROS_PER_DAY,
        MICROS_PER_SECOND,
        1,
        1_000,
        60 * MICROS_PER_SECOND,
        3_600 * MICROS_PER_SECOND,
        7 * MICROS_PER_DAY,
    ];
    let values = slots(args, &PARAMS, 0)?;

    let mut exact: i128 = 0;
    let mut fractional: f64 = 0.0;
    for ((value, weight), param) in values.into_iter().zip(WEIGHTS).zip(PARAMS) {
        match value {
            None => {}
            Some(Value::Int(value)) => exact += i128::from(value) * weight,
            Some(Value::Bool(value)) => exact += i128::from(value) * weight,
            Some(Value::Float(value)) if value.is_finite() => {
                fractional += value * weight as f64;
            }
            Some(Value::Float(_)) => {
                return Err(EvalError::new(format!(
                    "cannot convert non-finite {param} to timedelta"
                )));
            }
            Some(other) => {
                return Err(EvalError::new(format!(
                    "unsupported type for timedelta {param} component: {}",
                    other.type_name()
                )));
            }
        }
    }
    if fractional.abs() > 1e30 {
        return Err(EvalError::new("timedelta out of range"));
    }
    let total = exact + fractional.round_ties_even() as i128;

    let days = total.div_euclid(MICROS_PER_DAY);
    if days.abs() > MAX_TIMEDELTA_DAYS {
        return Err(EvalError::new(format!(
            "days={days}; must have magnitude <= {MAX_TIMEDELTA_DAYS}"
        )));
    }
    let seconds = (total / MICROS_PER_SECOND) as i64;
    let nanos = ((total % MICROS_PER_SECOND) * 1_000) as i32;
    Ok(Value::Duration(Duration::new(seconds, nanos)))
}

fn timezone(args: CallArgs) -> Result<Value, EvalError> {
    let [offset, name] = slots(args, &["offset", "name"], 1)?;
    let offset = match offset {
        Some(Value::Duration(offset)) => offset,
        other => {
            let found = other.map_or("NoneType", |value| value.type_name());
            return Err(EvalError::new(format!(
                "timezone() argument 1 must be datetime.timedelta, not {found}"
            )));
        }
    };
    if offset.whole_hours().abs() >= 24 {
        return Err(EvalError::new(
            "offset must be a timedelta strictly between -timedelta(hours=24) and timedelta(hours=24)",
        ));
    }
    if offset.subsec_nanoseconds() != 0 {
        return Err(EvalError::new("offset must be a whole number of seconds"));
    }
    let offset = UtcOffset::from_whole_seconds(offset.whole_seconds() as i32)
        .map_err(|err| EvalError::new(err.to_string()))?;
    let name = match present(name) {
        None => None,
        Some(Value::Str(name)) => Some(name),
        Some(other) => {
            return Err(EvalError::new(format!(
                "timezone() argument 2 must be str, not {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::TimeZone(TimeZone { offset, name }))
}

#[cfg(test)]
mod tests {
    use super::{parse_complex_text, parse_float_text, parse_int_text};
    use crate::core::numeric::{Complex, Rational};
    use crate::core::registry::{Binding, CallArgs, NameRegistry};
    use crate::core::value::{TimeZone, Value};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use time::{Duration, Month, UtcOffset};

    fn call(
        name: &str,
        positional: Vec<Value>,
        keywords: Vec<(&str, Value)>,
    ) -> Result<Value, String> {
        let registry = NameRegistry::standard();
        let Some(Binding::Constructor(constructor)) = registry.get(name) else {
            panic!("{name} is not a constructor");
        };
        let keywords = keywords
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        constructor(CallArgs::new(name, positional, keywords)).map_err(|err| err.to_string())
    }

    fn text(value: &str) -> Value {
        Value::Str(value.to_string())
    }

    #[test]
    fn int_parsing_follows_bases() {
        assert_eq!(parse_int_text(" 42 ", 10), Ok(42));
        assert_eq!(parse_int_text("-0x1f", 0), Ok(-31));
        assert_eq!(parse_int_text("1_000", 10), Ok(1000));
        assert_eq!(parse_int_text("-9223372036854775808", 10), Ok(i64::MIN));
        assert_eq!(
            parse_int_text("abc", 10).expect_err("bad").to_string(),
            "invalid literal for int() with base 10: 'abc'"
        );
        assert!(parse_int_text("9223372036854775808", 10).is_err());
    }

    #[test]
    fn float_parsing_accepts_special_values() {
        assert!(parse_float_text("nan").expect("nan").is_nan());
        assert_eq!(parse_float_text("-inf"), Ok(f64::NEG_INFINITY));
        assert_eq!(parse_float_text(" 1e3 "), Ok(1000.0));
        assert!(parse_float_text("one").is_err());
    }

    #[test]
    fn complex_string_forms() {
        assert_eq!(parse_complex_text("1+2j"), Ok(Complex::new(1.0, 2.0)));
        assert_eq!(parse_complex_text("(1.5e-3-2j)"), Ok(Complex::new(0.0015, -2.0)));
        assert_eq!(parse_complex_text("-j"), Ok(Complex::new(0.0, -1.0)));
        assert_eq!(parse_complex_text("3"), Ok(Complex::new(3.0, 0.0)));
    }

    #[test]
    fn complex_keeps_signed_zero_parts() {
        let value =
            call("complex", vec![Value::Float(-0.0), Value::Float(0.0)], vec![]).expect("complex");
        let Value::Complex(value) = value else {
            panic!("expected complex");
        };
        assert!(value.re.is_sign_negative());
        assert_eq!(
            call("complex", vec![Value::Int(2), Value::Int(2)], vec![]),
            Ok(Value::Complex(Complex::new(2.0, 2.0)))
        );
    }

    #[test]
    fn dict_binds_keywords() {
        let keywords = vec![("a", Value::Int(11)), ("b", Value::Int(12))];
        let value = call("dict", vec![], keywords).expect("dict");
        assert_eq!(
            value,
            Value::Dict(vec![(text("a"), Value::Int(11)), (text("b"), Value::Int(12))])
        );
    }

    #[test]
    fn dict_from_pairs_validates_length() {
        let pairs = Value::List(vec![Value::Tuple(vec![Value::Int(1)])]);
        assert_eq!(
            call("dict", vec![pairs], vec![]).expect_err("short pair"),
            "dictionary update sequence element #0 has length 1; 2 is required"
        );
    }

    #[test]
    fn counter_counts_characters() {
        let value = call("collections.Counter", vec![text("abca")], vec![]).expect("counter");
        assert_eq!(
            value,
            Value::Counter(vec![
                (text("a"), Value::Int(2)),
                (text("b"), Value::Int(1)),
                (text("c"), Value::Int(1)),
            ])
        );
    }

    #[test]
    fn defaultdict_requires_type_factory() {
        let value = call(
            "collections.defaultdict",
            vec![Value::Type("list".into()), Value::Dict(vec![(text("k"), Value::List(vec![]))])],
            vec![],
        )
        .expect("defaultdict");
        assert_eq!(
            value,
            Value::DefaultDict {
                factory: Some("list".into()),
                entries: vec![(text("k"), Value::List(vec![]))],
            }
        );
        assert_eq!(
            call("collections.defaultdict", vec![Value::Int(1)], vec![]).expect_err("bad factory"),
            "first argument must be callable or None"
        );
    }

    #[test]
    fn deque_honours_maxlen() {
        let items = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let value = call("collections.deque", vec![items], vec![("maxlen", Value::Int(2))])
            .expect("deque");
        assert_eq!(
            value,
            Value::Deque {
                items: vec![Value::Int(2), Value::Int(3)],
                maxlen: Some(2),
            }
        );
    }

    #[test]
    fn set_rejects_unhashable_elements() {
        let source = Value::Tuple(vec![Value::List(vec![])]);
        assert_eq!(
            call("set", vec![source], vec![]).expect_err("list in set"),
            "unhashable type: 'list'"
        );
    }

    #[test]
    fn sequence_constructors_take_no_keywords() {
        assert_eq!(
            call("tuple", vec![], vec![("iterable", Value::List(vec![]))]).expect_err("keyword"),
            "tuple(): takes no keyword arguments, got 'iterable'"
        );
    }

    #[test]
    fn bytes_from_ints_and_text() {
        let ints = Value::List(vec![Value::Int(104), Value::Int(105)]);
        assert_eq!(call("bytes", vec![ints], vec![]), Ok(Value::Bytes(b"hi".to_vec())));
        assert_eq!(
            call("bytearray", vec![text("hi"), text("utf-8")], vec![]),
            Ok(Value::ByteArray(b"hi".to_vec()))
        );
        assert_eq!(
            call("bytes", vec![text("hi")], vec![]).expect_err("no encoding"),
            "string argument without an encoding"
        );
        assert_eq!(
            call("bytes", vec![Value::List(vec![Value::Int(256)])], vec![]).expect_err("range"),
            "bytes must be in range(0, 256)"
        );
    }

    #[test]
    fn fraction_forms() {
        assert_eq!(
            call("fractions.Fraction", vec![Value::Int(22), Value::Int(7)], vec![]),
            Ok(Value::Rational(Rational::new(22, 7).expect("r")))
        );
        assert_eq!(
            call("fractions.Fraction", vec![text("3/6")], vec![]),
            Ok(Value::Rational(Rational::new(1, 2).expect("r")))
        );
        assert_eq!(
            call("fractions.Fraction", vec![Value::Int(1), Value::Int(0)], vec![])
                .expect_err("zero"),
            "division by zero: Fraction(1, 0)"
        );
        assert_eq!(
            call("fractions.Fraction", vec![Value::Float(1.5), Value::Int(2)], vec![])
                .expect_err("float"),
            "both arguments should be Rational instances"
        );
    }

    #[test]
    fn decimal_keeps_scale() {
        let value = call("decimal.Decimal", vec![text("1.50")], vec![]).expect("decimal");
        assert_eq!(value, Value::Decimal(Decimal::from_str("1.50").expect("d")));
        assert!(call("decimal.Decimal", vec![text("NaN")], vec![]).is_err());
    }

    #[test]
    fn date_validates_components() {
        let ymd = |y, m, d| vec![Value::Int(y), Value::Int(m), Value::Int(d)];
        let value = call("datetime.date", ymd(2024, 2, 29), vec![]).expect("date");
        let Value::Date(date) = value else {
            panic!("expected date");
        };
        assert_eq!((date.year(), date.month(), date.day()), (2024, Month::February, 29));
        assert_eq!(
            call("datetime.date", ymd(2023, 2, 29), vec![]).expect_err("feb"),
            "day is out of range for month"
        );
        assert_eq!(
            call("datetime.date", ymd(2023, 13, 1), vec![]).expect_err("month"),
            "month must be in 1..12"
        );
    }

    #[test]
    fn timedelta_normalizes_components() {
        let value = call(
            "datetime.timedelta",
            vec![],
            vec![("hours", Value::Int(1)), ("minutes", Value::Float(1.5))],
        )
        .expect("timedelta");
        assert_eq!(value, Value::Duration(Duration::seconds(3_690)));
        let negative = call("datetime.timedelta", vec![Value::Int(-1)], vec![]).expect("negative");
        assert_eq!(negative, Value::Duration(Duration::days(-1)));
    }

    #[test]
    fn timezone_offsets_are_bounded() {
        let value = call(
            "datetime.timezone",
            vec![Value::Duration(Duration::hours(2))],
            vec![("name", text("CEST"))],
        )
        .expect("timezone");
        assert_eq!(
            value,
            Value::TimeZone(TimeZone {
                offset: UtcOffset::from_hms(2, 0, 0).expect("offset"),
                name: Some("CEST".to_string()),
            })
        );
        let full_day = vec![Value::Duration(Duration::hours(24))];
        assert!(call("datetime.timezone", full_day, vec![]).is_err());
    }

    #[test]
    fn utc_constant_is_registered() {
        let registry = NameRegistry::standard();
        assert!(matches!(
            registry.get("datetime.timezone.utc"),
            Some(Binding::Constant(Value::TimeZone(tz))) if tz.is_utc()
        ));
    }
}
