//! Purpose: `safelit` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, prints literals or JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Every evaluation goes through `api::Loader`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use safelit::api::{Error, ErrorKind, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `safelit --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command)
        .map_err(add_io_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "safelit",
    version,
    about = "Evaluate literal documents against a fixed whitelist of value constructors",
    long_about = None,
    after_help = r#"EXAMPLES
  $ safelit eval settings.lit
  $ echo "{'retries': 3, 'ratio': fractions.Fraction(2, 3)}" | safelit eval -
  $ safelit check --json settings.lit
  $ safelit cache write settings.lit
  $ safelit names

NOTES
  - Set RUST_LOG=debug to trace cache hits and misses on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Evaluate a literal document and print it back in canonical form",
        after_help = r#"EXAMPLES
  $ safelit eval settings.lit
  $ safelit eval --cache settings.lit
  $ safelit eval --name inline - < settings.lit"#
    )]
    Eval {
        #[arg(help = "Source file, or - for stdin", value_hint = ValueHint::FilePath)]
        path: String,
        #[arg(
            long,
            conflicts_with = "cache",
            help = "Source name used in diagnostics (default: the path)"
        )]
        name: Option<String>,
        #[arg(long, help = "Use the snapshot cache for file sources")]
        cache: bool,
        #[arg(
            long = "cache-file",
            value_name = "PATH",
            help = "Cache file (default: <dir>/__litcache__/<file>.cache)",
            value_hint = ValueHint::FilePath
        )]
        cache_file: Option<PathBuf>,
        #[arg(long = "no-write-cache", help = "Read the cache but never write it")]
        no_write_cache: bool,
        #[arg(long = "verify-digest", help = "Require the cached source digest to match")]
        verify_digest: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Parse and validate a document without evaluating it"
    )]
    Check {
        #[arg(help = "Source file, or - for stdin", value_hint = ValueHint::FilePath)]
        path: String,
        #[arg(long, help = "Source name used in diagnostics (default: the path)")]
        name: Option<String>,
        #[arg(long, help = "Print the check report as JSON on stdout")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Write, verify, or inspect snapshot cache records"
    )]
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    #[command(about = "List the names a document may reference")]
    Names,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completion scripts"
    )]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "Evaluate a source file and write its snapshot")]
    Write {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long = "cache-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
        cache_file: Option<PathBuf>,
        #[arg(long = "verify-digest", help = "Store a SHA-256 of the source")]
        verify_digest: bool,
    },
    #[command(about = "Report whether a snapshot still matches its source")]
    Check {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long = "cache-file", value_name = "PATH", value_hint = ValueHint::FilePath)]
        cache_file: Option<PathBuf>,
        #[arg(long = "verify-digest", help = "Require the stored digest to match")]
        verify_digest: bool,
    },
    #[command(about = "Print the header fields of a snapshot file")]
    Info {
        #[arg(help = "Cache file", value_hint = ValueHint::FilePath)]
        cache_file: PathBuf,
    },
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Grammar => "invalid syntax".to_string(),
        ErrorKind::NameNotAllowed => "name not allowed".to_string(),
        ErrorKind::IllegalCombine => "illegal expression".to_string(),
        ErrorKind::Unsupported => "unsupported construct".to_string(),
        ErrorKind::Evaluation => "evaluation failed".to_string(),
        ErrorKind::CacheMismatch => "cache does not match source".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(diagnostic) = err.diagnostic() {
        inner.insert("source_name".to_string(), json!(diagnostic.source_name));
        inner.insert("line".to_string(), json!(diagnostic.line));
        inner.insert("column".to_string(), json!(diagnostic.column));
        inner.insert(
            "source_line_text".to_string(),
            json!(diagnostic.source_line_text),
        );
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    match err.diagnostic() {
        Some(diagnostic) => lines.push(format!(
            "{} {diagnostic}",
            colorize_label("error:", use_color, AnsiColor::Red)
        )),
        None => lines.push(format!(
            "{} {}",
            colorize_label("error:", use_color, AnsiColor::Red),
            error_message(err)
        )),
    }

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::NotFound => err.with_hint("Check that the path exists."),
        ErrorKind::Permission => err.with_hint("Check file permissions for the path."),
        _ => err,
    }
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, error_json, error_text};
    use clap::CommandFactory;
    use safelit::api::{Error, ErrorKind, Loader};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn error_json_includes_diagnostic_fields() {
        let err = Loader::new()
            .loads_named("[1, os]", "conf.lit")
            .expect_err("not allowed");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "NameNotAllowed");
        assert_eq!(value["error"]["message"], "'os' is not allowed name");
        assert_eq!(value["error"]["source_name"], "conf.lit");
        assert_eq!(value["error"]["line"], 1);
        assert_eq!(value["error"]["column"], 5);
        assert_eq!(value["error"]["source_line_text"], "[1, os]");
    }

    #[test]
    fn error_text_points_at_column() {
        let err = Loader::new()
            .loads_named("not True", "conf.lit")
            .expect_err("unsupported");
        let text = error_text(&err, false);
        assert!(text.starts_with("error: conf.lit:1:1: Unsupported unary operator"));
        assert!(text.contains("    not True\n    ^"));
    }

    #[test]
    fn error_without_diagnostic_uses_message() {
        let err = Error::new(ErrorKind::Usage).with_hint("Try `safelit --help`.");
        let text = error_text(&err, false);
        assert_eq!(text, "error: usage error\nhint: Try `safelit --help`.");
    }
}
