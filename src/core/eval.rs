//! Purpose: Reduce a validated tree to a `Value`.
//! Exports: `evaluate`, `EvalError`.
//! Role: Final pipeline stage; the registry is the only environment it can read.
//! Invariants: Accepts only `Validated` trees; never introduces or mutates bindings.
//! Invariants: Failures are `ErrorKind::Evaluation` errors carrying the `EvalError`, never diagnostics.

use std::error::Error as StdError;
use std::fmt;

use crate::core::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::core::error::{Error, ErrorKind};
use crate::core::numeric::Complex;
use crate::core::registry::{Binding, CallArgs, NameRegistry};
use crate::core::validate::Validated;
use crate::core::value::{Value, unique_entries, unique_items};

/// A constructor or operator rejected its evaluated operands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EvalError {
    message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unhashable(type_name: &str) -> Self {
        Self::new(format!("unhashable type: '{type_name}'"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for EvalError {}

pub fn evaluate(validated: &Validated, registry: &NameRegistry) -> Result<Value, Error> {
    let evaluator = Evaluator { registry };
    evaluator.eval(validated.expr()).map_err(|err| {
        Error::new(ErrorKind::Evaluation)
            .with_message(err.to_string())
            .with_source(err)
    })
}

struct Evaluator<'r> {
    registry: &'r NameRegistry,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(Value::Int(*value)),
            ExprKind::Float(value) => Ok(Value::Float(*value)),
            ExprKind::Imaginary(value) => Ok(Value::Complex(Complex::new(0.0, *value))),
            ExprKind::Str(text) => Ok(Value::Str(text.clone())),
            ExprKind::Bytes(bytes) => Ok(Value::Bytes(bytes.clone())),
            ExprKind::Bool(value) => Ok(Value::Bool(*value)),
            ExprKind::None => Ok(Value::None),
            ExprKind::Name(_) | ExprKind::Attribute { .. } => self.lookup(expr),
            ExprKind::Tuple(items) => self.eval_all(items).map(Value::Tuple),
            ExprKind::List(items) => self.eval_all(items).map(Value::List),
            ExprKind::Set(items) => unique_items(self.eval_all(items)?).map(Value::Set),
            ExprKind::Dict(entries) => {
                let entries = entries
                    .iter()
                    .map(|(key, value)| Ok((self.eval(key)?, self.eval(value)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                unique_entries(entries).map(Value::Dict)
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let name = func.dotted_name().unwrap_or_default();
                let Some(Binding::Constructor(constructor)) = self.registry.get(&name) else {
                    return Err(EvalError::new(format!("'{name}' is not callable")));
                };
                let positional = self.eval_all(args)?;
                let keywords = keywords
                    .iter()
                    .map(|keyword| Ok((keyword.name.clone(), self.eval(&keyword.value)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                constructor(CallArgs::new(name, positional, keywords))
            }
            ExprKind::BinOp { left, op, right } => {
                let left = as_complex(self.eval(left)?)?;
                let right = as_complex(self.eval(right)?)?;
                match op {
                    BinaryOp::Add => Ok(Value::Complex(left.add(right))),
                    BinaryOp::Sub => Ok(Value::Complex(left.sub(right))),
                    other => Err(EvalError::new(format!("unsupported operator {other:?}"))),
                }
            }
            ExprKind::UnaryOp {
                op: UnaryOp::Neg,
                operand,
            } => negate(self.eval(operand)?),
            _ => Err(EvalError::new(format!(
                "unsupported node: '{}'",
                expr.node_name()
            ))),
        }
    }

    fn eval_all(&self, items: &[Expr]) -> Result<Vec<Value>, EvalError> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn lookup(&self, expr: &Expr) -> Result<Value, EvalError> {
        let name = expr.dotted_name().unwrap_or_default();
        match self.registry.get(&name) {
            Some(Binding::Constant(value)) => Ok(value.clone()),
            Some(Binding::Constructor(_)) => Ok(Value::Type(name)),
            None => Err(EvalError::new(format!("name '{name}' is not defined"))),
        }
    }
}

fn as_complex(value: Value) -> Result<Complex, EvalError> {
    match value {
        Value::Int(value) => Ok(Complex::new(value as f64, 0.0)),
        Value::Float(value) => Ok(Complex::new(value, 0.0)),
        Value::Complex(value) => Ok(value),
        other => Err(EvalError::new(format!(
            "unsupported operand type for complex arithmetic: '{}'",
            other.type_name()
        ))),
    }
}

fn negate(value: Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(value) => value
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::new(format!("integer overflow negating {value}"))),
        Value::Bool(value) => Ok(Value::Int(-i64::from(value))),
        Value::Float(value) => Ok(Value::Float(-value)),
        Value::Complex(value) => Ok(Value::Complex(value.neg())),
        Value::Decimal(value) => Ok(Value::Decimal(-value)),
        Value::Rational(value) => value
            .checked_neg()
            .map(Value::Rational)
            .ok_or_else(|| EvalError::new(format!("integer overflow negating {value}"))),
        other => Err(EvalError::new(format!(
            "bad operand type for unary -: '{}'",
            other.type_name()
        ))),
    }
}
