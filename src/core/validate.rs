//! Purpose: Enforce the literal grammar and the name whitelist on a parsed tree.
//! Exports: `Validated`, `validate`.
//! Role: Second pipeline stage; its output is the only input the evaluator accepts.
//! Invariants: Single pre-order pass; the first violation is reported as a diagnostic.
//! Invariants: Only exact registry keys are accepted as names; no value is ever inspected.

use std::collections::HashSet;

use crate::core::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::core::diagnostic::SourceMap;
use crate::core::error::{Error, ErrorKind};
use crate::core::registry::{Binding, NameRegistry};

/// An expression tree that passed validation against a particular registry.
#[derive(Clone, Debug, PartialEq)]
pub struct Validated {
    expr: Expr,
}

impl Validated {
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

pub fn validate(
    expr: Expr,
    registry: &NameRegistry,
    source: &SourceMap<'_>,
) -> Result<Validated, Error> {
    let validator = Validator { registry, source };
    validator.check(&expr)?;
    Ok(Validated { expr })
}

struct Validator<'r, 's, 'a> {
    registry: &'r NameRegistry,
    source: &'s SourceMap<'a>,
}

impl Validator<'_, '_, '_> {
    fn fail(&self, kind: ErrorKind, expr: &Expr, message: String) -> Error {
        self.source.error(kind, expr.pos, message)
    }

    fn unsupported_node(&self, expr: &Expr) -> Error {
        self.fail(
            ErrorKind::Unsupported,
            expr,
            format!("Unsupported type of node: '{}'", expr.node_name()),
        )
    }

    fn check(&self, expr: &Expr) -> Result<(), Error> {
        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Imaginary(_)
            | ExprKind::Str(_)
            | ExprKind::Bytes(_)
            | ExprKind::Bool(_)
            | ExprKind::None => Ok(()),
            ExprKind::Name(_) | ExprKind::Attribute { .. } => self.resolve(expr).map(|_| ()),
            ExprKind::Tuple(items) | ExprKind::List(items) | ExprKind::Set(items) => {
                items.iter().try_for_each(|item| self.check(item))
            }
            ExprKind::Dict(entries) => entries.iter().try_for_each(|(key, value)| {
                self.check(key)?;
                self.check(value)
            }),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.check_callee(func)?;
                let mut seen = HashSet::new();
                for keyword in keywords {
                    if !seen.insert(keyword.name.as_str()) {
                        return Err(self.source.error(
                            ErrorKind::Grammar,
                            keyword.pos,
                            format!("keyword argument repeated: '{}'", keyword.name),
                        ));
                    }
                }
                args.iter().try_for_each(|arg| self.check(arg))?;
                keywords
                    .iter()
                    .try_for_each(|keyword| self.check(&keyword.value))
            }
            ExprKind::BinOp { left, op, right } => {
                if matches!(op, BinaryOp::Add | BinaryOp::Sub) && is_complex_pair(left, right) {
                    Ok(())
                } else {
                    Err(self.fail(
                        ErrorKind::IllegalCombine,
                        expr,
                        "Illegal expression, only complex numbers are allowed".to_string(),
                    ))
                }
            }
            ExprKind::UnaryOp {
                op: UnaryOp::Neg,
                operand,
            } => {
                if !can_negate(operand) {
                    return Err(self.fail(
                        ErrorKind::IllegalCombine,
                        expr,
                        "Illegal expression, only numbers can be negated".to_string(),
                    ));
                }
                self.check(operand)
            }
            ExprKind::UnaryOp { .. } => Err(self.fail(
                ErrorKind::Unsupported,
                expr,
                "Unsupported unary operator, only negative numbers are allowed".to_string(),
            )),
            _ => Err(self.unsupported_node(expr)),
        }
    }

    /// Resolves a name or dotted name to its registry binding.
    fn resolve(&self, expr: &Expr) -> Result<&Binding, Error> {
        let Some(name) = expr.dotted_name() else {
            let root = attribute_root(expr);
            return Err(self.fail(
                ErrorKind::Unsupported,
                expr,
                format!(
                    "Only names are supported in attributes, found '{}'",
                    root.node_name()
                ),
            ));
        };
        self.registry.get(&name).ok_or_else(|| {
            self.fail(
                ErrorKind::NameNotAllowed,
                expr,
                format!("'{name}' is not allowed name"),
            )
        })
    }

    fn check_callee(&self, func: &Expr) -> Result<(), Error> {
        if !matches!(func.kind, ExprKind::Name(_) | ExprKind::Attribute { .. }) {
            return Err(self.fail(
                ErrorKind::Unsupported,
                func,
                format!("Only names can be called, found '{}'", func.node_name()),
            ));
        }
        match self.resolve(func)? {
            Binding::Constructor(_) => Ok(()),
            Binding::Constant(_) => Err(self.fail(
                ErrorKind::NameNotAllowed,
                func,
                format!(
                    "'{}' is not callable",
                    func.dotted_name().unwrap_or_default()
                ),
            )),
        }
    }
}

fn attribute_root(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Attribute { value, .. } => attribute_root(value),
        _ => expr,
    }
}

/// Numeric literal, optionally negated; reports whether it is imaginary.
fn numeric_operand(expr: &Expr) -> Option<bool> {
    match &expr.kind {
        ExprKind::Int(_) | ExprKind::Float(_) => Some(false),
        ExprKind::Imaginary(_) => Some(true),
        ExprKind::UnaryOp {
            op: UnaryOp::Neg,
            operand,
        } if operand.kind.is_numeric_atom() => numeric_operand(operand),
        _ => None,
    }
}

fn is_complex_pair(left: &Expr, right: &Expr) -> bool {
    match (numeric_operand(left), numeric_operand(right)) {
        (Some(left), Some(right)) => left || right,
        _ => false,
    }
}

fn can_negate(operand: &Expr) -> bool {
    matches!(
        operand.kind,
        ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Imaginary(_)
            | ExprKind::BinOp { .. }
            | ExprKind::Call { .. }
            | ExprKind::Name(_)
            | ExprKind::Attribute { .. }
            | ExprKind::UnaryOp {
                op: UnaryOp::Neg,
                ..
            }
    )
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::core::diagnostic::SourceMap;
    use crate::core::error::ErrorKind;
    use crate::core::parser::parse;
    use crate::core::registry::NameRegistry;

    fn check(text: &str) -> Result<(), (ErrorKind, String, u32, u32)> {
        let source = SourceMap::new("<string>", text);
        let expr = parse(&source).expect("parse");
        let registry = NameRegistry::standard();
        validate(expr, &registry, &source).map(|_| ()).map_err(|err| {
            let diagnostic = err.diagnostic().expect("diagnostic").clone();
            (err.kind(), diagnostic.message, diagnostic.line, diagnostic.column)
        })
    }

    fn failure(
        kind: ErrorKind,
        message: &str,
        line: u32,
        column: u32,
    ) -> Result<(), (ErrorKind, String, u32, u32)> {
        Err((kind, message.to_string(), line, column))
    }

    #[test]
    fn accepts_literals_and_registered_calls() {
        for text in [
            "42",
            "-6",
            "3.2-6.5j",
            "-1-.42j",
            "6.5j-4",
            "{'the': 'dict'}",
            "set(('the', 'set'))",
            "dict(a=11, b=12)",
            "fractions.Fraction(22, 7)",
            "datetime.timezone.utc",
            "-int('5')",
        ] {
            assert_eq!(check(text), Ok(()), "{text}");
        }
    }

    #[test]
    fn rejects_not_operator() {
        assert_eq!(
            check("not True"),
            failure(
                ErrorKind::Unsupported,
                "Unsupported unary operator, only negative numbers are allowed",
                1,
                1
            )
        );
    }

    #[test]
    fn rejects_non_complex_combinations() {
        for text in ["1 + 2", "'a' + 'b'", "(1, 2) + (3, 4)", "2 * 3j"] {
            assert_eq!(
                check(text),
                failure(
                    ErrorKind::IllegalCombine,
                    "Illegal expression, only complex numbers are allowed",
                    1,
                    1
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn rejects_negated_strings() {
        assert_eq!(
            check("-'x'"),
            failure(
                ErrorKind::IllegalCombine,
                "Illegal expression, only numbers can be negated",
                1,
                1
            )
        );
    }

    #[test]
    fn rejects_attribute_on_value() {
        assert_eq!(
            check("\"foo bar\".split(\" \")"),
            failure(
                ErrorKind::Unsupported,
                "Only names are supported in attributes, found 'Str'",
                1,
                1
            )
        );
    }

    #[test]
    fn rejects_unregistered_names() {
        assert_eq!(
            check("Counter(\"abcdefghaa\")"),
            failure(ErrorKind::NameNotAllowed, "'Counter' is not allowed name", 1, 1)
        );
        assert_eq!(
            check("fractions.gcd(1, 2)"),
            failure(ErrorKind::NameNotAllowed, "'fractions.gcd' is not allowed name", 1, 1)
        );
        assert_eq!(
            check("[1, os]"),
            failure(ErrorKind::NameNotAllowed, "'os' is not allowed name", 1, 5)
        );
    }

    #[test]
    fn rejects_calling_a_constant() {
        assert_eq!(
            check("datetime.timezone.utc()"),
            failure(ErrorKind::NameNotAllowed, "'datetime.timezone.utc' is not callable", 1, 1)
        );
    }

    #[test]
    fn rejects_lambda_inside_call() {
        assert_eq!(
            check("set((lambda x:42, ))"),
            failure(ErrorKind::Unsupported, "Unsupported type of node: 'Lambda'", 1, 6)
        );
    }

    #[test]
    fn rejects_comprehensions_by_kind() {
        for (text, kind) in [
            ("(x for x in y)", "GeneratorExp"),
            ("[x for x in y]", "ListComp"),
            ("{x: 1 for x in y}", "DictComp"),
            ("{x for x in y}", "SetComp"),
        ] {
            assert_eq!(
                check(text),
                failure(
                    ErrorKind::Unsupported,
                    &format!("Unsupported type of node: '{kind}'"),
                    1,
                    1
                )
            );
        }
    }

    #[test]
    fn rejects_splats_and_formatted_strings() {
        assert_eq!(
            check("list(*[1])"),
            failure(ErrorKind::Unsupported, "Unsupported type of node: 'Starred'", 1, 6)
        );
        assert_eq!(
            check("f'{x}'"),
            failure(ErrorKind::Unsupported, "Unsupported type of node: 'JoinedStr'", 1, 1)
        );
    }

    #[test]
    fn rejects_non_name_callee() {
        assert_eq!(
            check("(1)(2)"),
            failure(ErrorKind::Unsupported, "Only names can be called, found 'Num'", 1, 2)
        );
    }

    #[test]
    fn rejects_repeated_keywords() {
        assert_eq!(
            check("dict(a=1, a=2)"),
            failure(ErrorKind::Grammar, "keyword argument repeated: 'a'", 1, 11)
        );
    }
}
