//! Purpose: Configurable entry point that turns literal text, readers, or files into values.
//! Exports: `Loader`, `CachePolicy`, `loads`, `dumps`.
//! Role: Wires lexer, parser, validator, evaluator, renderer and the snapshot cache together.
//! Invariants: Every value produced here passed validation against `Loader::registry`.
//! Invariants: Stale or unreadable records fall back to the full pipeline.
//! Invariants: Cache IO failures propagate; a cached load never silently skips its cache.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::api::validation::CheckReport;
use crate::core::cache::{CacheCodec, CacheLookup, CacheOptions, default_cache_path};
use crate::core::diagnostic::{DEFAULT_SOURCE_NAME, SourceMap};
use crate::core::error::{Error, ErrorKind, io_error};
use crate::core::eval::evaluate;
use crate::core::parser::parse;
use crate::core::registry::NameRegistry;
use crate::core::render::render;
use crate::core::validate::{Validated, validate};
use crate::core::value::Value;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CachePolicy {
    #[default]
    Disabled,
    /// Use fresh records but never write.
    ReadOnly,
    ReadWrite,
}

impl CachePolicy {
    pub fn reads(self) -> bool {
        !matches!(self, CachePolicy::Disabled)
    }

    pub fn writes(self) -> bool {
        matches!(self, CachePolicy::ReadWrite)
    }
}

#[derive(Clone, Debug)]
pub struct Loader {
    registry: Arc<NameRegistry>,
    cache: CachePolicy,
    cache_path: Option<PathBuf>,
    cache_options: CacheOptions,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    /// Standard registry, cache disabled.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(NameRegistry::standard()),
            cache: CachePolicy::Disabled,
            cache_path: None,
            cache_options: CacheOptions::default(),
        }
    }

    pub fn with_registry(mut self, registry: NameRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Overlays `extra` on the current registry; `extra` wins on conflicts.
    pub fn with_bindings(mut self, extra: &NameRegistry) -> Self {
        self.registry = Arc::new(self.registry.merged(extra));
        self
    }

    pub fn with_cache(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    /// Fixed cache file used instead of `default_cache_path(source)`.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_cache_options(mut self, options: CacheOptions) -> Self {
        self.cache_options = options;
        self
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache
    }

    pub fn cache_path_for(&self, source: &Path) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| default_cache_path(source))
    }

    fn codec(&self) -> CacheCodec {
        CacheCodec::new(self.cache_options)
    }

    /// Lexes, parses and validates without evaluating.
    pub fn parse(&self, text: &str, name: &str) -> Result<Validated, Error> {
        let source = SourceMap::new(name, text);
        let expr = parse(&source)?;
        validate(expr, &self.registry, &source)
    }

    pub fn loads(&self, text: &str) -> Result<Value, Error> {
        self.loads_named(text, DEFAULT_SOURCE_NAME)
    }

    pub fn loads_named(&self, text: &str, name: &str) -> Result<Value, Error> {
        let validated = self.parse(text, name)?;
        debug!(source = name, "validated");
        evaluate(&validated, &self.registry)
    }

    /// Each item is one physical line; a missing terminator is supplied.
    pub fn load_lines<I, S>(&self, lines: I, name: &str) -> Result<Value, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for line in lines {
            let line = line.as_ref();
            text.push_str(line);
            if !line.ends_with('\n') {
                text.push('\n');
            }
        }
        self.loads_named(&text, name)
    }

    pub fn load_reader<R: Read>(&self, mut reader: R, name: &str) -> Result<Value, Error> {
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read {name}"))
                .with_source(err)
        })?;
        self.loads_named(&text, name)
    }

    /// Loads a file, consulting and repopulating the snapshot cache per `CachePolicy`.
    pub fn load_path(&self, path: impl AsRef<Path>) -> Result<Value, Error> {
        let path = path.as_ref();
        let cache_path = self.cache_path_for(path);
        let codec = self.codec();

        if self.cache.reads() {
            match codec.read(path, &cache_path)? {
                CacheLookup::Fresh(value) => return Ok(value),
                CacheLookup::Stale(reason) => {
                    debug!(
                        source = %path.display(),
                        reason = %reason,
                        "falling back to evaluation"
                    );
                }
            }
        }

        let text = fs::read_to_string(path)
            .map_err(|err| io_error(err, path, "failed to read source file"))?;
        let name = path.display().to_string();
        let value = self.loads_named(&text, &name)?;

        if self.cache.writes() {
            codec.write(&value, path, &cache_path)?;
        }
        Ok(value)
    }

    pub fn dumps(&self, value: &Value) -> String {
        render(value)
    }

    /// Writes `value` as literal text; a read-write cache is populated for the new file.
    pub fn dump_path(&self, value: &Value, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let mut text = render(value);
        text.push('\n');
        fs::write(path, text).map_err(|err| io_error(err, path, "failed to write literal file"))?;
        if self.cache.writes() {
            self.codec().write(value, path, &self.cache_path_for(path))?;
        }
        Ok(())
    }

    /// Parse and validate only; failures become a rejected report instead of an `Err`.
    pub fn check(&self, text: &str, name: &str) -> CheckReport {
        match self.parse(text, name) {
            Ok(_) => CheckReport::ok(name),
            Err(err) => CheckReport::rejected(name, &err),
        }
    }
}

/// Evaluates `text` against the standard registry.
pub fn loads(text: &str) -> Result<Value, Error> {
    Loader::new().loads(text)
}

pub fn dumps(value: &Value) -> String {
    render(value)
}
