//! Purpose: The whitelist of names a literal document may reference.
//! Exports: `NameRegistry`, `Binding`, `Constructor`, `CallArgs`.
//! Role: Injected into validation and evaluation; the only namespace either pass can see.
//! Invariants: Immutable once built; extension produces a new registry.
//! Invariants: Keys are exact dotted strings; there is no prefix or attribute resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::builtins;
use crate::core::eval::EvalError;
use crate::core::value::Value;

pub type Constructor = Arc<dyn Fn(CallArgs) -> Result<Value, EvalError> + Send + Sync>;

#[derive(Clone)]
pub enum Binding {
    Constant(Value),
    Constructor(Constructor),
}

impl Binding {
    pub fn is_constructor(&self) -> bool {
        matches!(self, Binding::Constructor(_))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Binding::Constructor(_) => f.write_str("Constructor(..)"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NameRegistry {
    bindings: HashMap<String, Binding>,
}

impl NameRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Numeric, collection and temporal constructors plus `datetime.timezone.utc`.
    pub fn standard() -> Self {
        builtins::install(Self::empty())
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), Binding::Constant(value));
        self
    }

    pub fn with_constructor<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(CallArgs) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.bindings
            .insert(name.into(), Binding::Constructor(Arc::new(constructor)));
        self
    }

    /// Copy of `self` overlaid with `extra`; entries in `extra` take precedence.
    pub fn merged(&self, extra: &NameRegistry) -> NameRegistry {
        let mut bindings = self.bindings.clone();
        for (name, binding) in &extra.bindings {
            bindings.insert(name.clone(), binding.clone());
        }
        NameRegistry { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Evaluated arguments of one constructor call.
#[derive(Clone, Debug, PartialEq)]
pub struct CallArgs {
    pub name: String,
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(
        name: impl Into<String>,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> Self {
        Self {
            name: name.into(),
            positional,
            keywords,
        }
    }

    pub fn error(&self, message: impl fmt::Display) -> EvalError {
        EvalError::new(format!("{}(): {message}", self.name))
    }

    /// Binds arguments to named parameters. The first `required` parameters must be supplied.
    pub fn bind(self, params: &[&str], required: usize) -> Result<Vec<Option<Value>>, EvalError> {
        if self.positional.len() > params.len() {
            return Err(self.error(format_args!(
                "takes at most {} arguments ({} given)",
                params.len(),
                self.positional.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = vec![None; params.len()];
        let given = self.positional.len();
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (keyword, value) in self.keywords {
            let Some(idx) = params.iter().position(|param| *param == keyword) else {
                return Err(EvalError::new(format!(
                    "{}(): '{keyword}' is an invalid keyword argument",
                    self.name
                )));
            };
            if idx < given {
                return Err(EvalError::new(format!(
                    "{}(): argument '{keyword}' given by name and position ({})",
                    self.name,
                    idx + 1
                )));
            }
            slots[idx] = Some(value);
        }
        for (idx, param) in params.iter().enumerate().take(required) {
            if slots[idx].is_none() {
                return Err(EvalError::new(format!(
                    "{}(): missing required argument '{param}' (pos {})",
                    self.name,
                    idx + 1
                )));
            }
        }
        Ok(slots)
    }

    /// Splits off keywords for constructors that only accept positional arguments.
    pub fn positional_only(self, max: usize) -> Result<Vec<Value>, EvalError> {
        if let Some((keyword, _)) = self.keywords.first() {
            return Err(self.error(format_args!("takes no keyword arguments, got '{keyword}'")));
        }
        if self.positional.len() > max {
            return Err(self.error(format_args!(
                "takes at most {max} arguments ({} given)",
                self.positional.len()
            )));
        }
        Ok(self.positional)
    }
}
