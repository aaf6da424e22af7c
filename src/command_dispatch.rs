//! Purpose: Hold top-level CLI command dispatch for `safelit`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Values go to stdout as literal text; reports and cache facts go to stdout as JSON.
//! Invariants: Failures return `Error` so `main` owns stderr formatting and exit codes.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use safelit::api::{
    CacheCodec, CacheLookup, CacheOptions, CachePolicy, CheckReport, Loader, default_cache_path,
};
use safelit::core::error::io_error;

use super::*;

const STDIN_PATH: &str = "-";
const STDIN_NAME: &str = "<stdin>";

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "safelit", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Names => {
            let loader = Loader::new();
            for name in loader.registry().names() {
                println!("{name}");
            }
            Ok(RunOutcome::ok())
        }
        Command::Eval {
            path,
            name,
            cache,
            cache_file,
            no_write_cache,
            verify_digest,
        } => {
            let mut loader = Loader::new().with_cache_options(CacheOptions { verify_digest });
            if cache {
                if path == STDIN_PATH {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("--cache requires a file path")
                        .with_hint("Pass the source file instead of -."));
                }
                let policy = if no_write_cache {
                    CachePolicy::ReadOnly
                } else {
                    CachePolicy::ReadWrite
                };
                loader = loader.with_cache(policy);
                if let Some(cache_file) = cache_file {
                    loader = loader.with_cache_path(cache_file);
                }
            }
            let value = if loader.cache_policy().reads() {
                loader.load_path(&path)?
            } else {
                let text = read_source(&path)?;
                loader.loads_named(&text, &source_name(&path, name))?
            };
            println!("{}", loader.dumps(&value));
            Ok(RunOutcome::ok())
        }
        Command::Check { path, name, json } => {
            let text = read_source(&path)?;
            let name = source_name(&path, name);
            let loader = Loader::new();
            match loader.parse(&text, &name) {
                Ok(_) => {
                    if json {
                        emit_json(report_json(&CheckReport::ok(&name))?);
                    } else {
                        println!("ok: {name}");
                    }
                    Ok(RunOutcome::ok())
                }
                Err(err) if json => {
                    emit_json(report_json(&CheckReport::rejected(&name, &err))?);
                    Ok(RunOutcome::with_code(to_exit_code(err.kind())))
                }
                Err(err) => Err(err),
            }
        }
        Command::Cache { command } => dispatch_cache_command(command),
    }
}

fn dispatch_cache_command(command: CacheCommand) -> Result<RunOutcome, Error> {
    match command {
        CacheCommand::Write {
            path,
            cache_file,
            verify_digest,
        } => {
            let value = Loader::new().load_path(&path)?;
            let target = cache_target(&path, cache_file);
            let codec = CacheCodec::new(CacheOptions { verify_digest });
            let written = codec.write(&value, &path, &target)?;
            emit_json(json!({
                "source": path.display().to_string(),
                "cache": written.display().to_string(),
                "verify_digest": verify_digest,
            }));
            Ok(RunOutcome::ok())
        }
        CacheCommand::Check {
            path,
            cache_file,
            verify_digest,
        } => {
            let target = cache_target(&path, cache_file);
            let codec = CacheCodec::new(CacheOptions { verify_digest });
            match codec.read(&path, &target)? {
                CacheLookup::Fresh(_) => {
                    emit_json(json!({
                        "source": path.display().to_string(),
                        "cache": target.display().to_string(),
                        "status": "fresh",
                    }));
                    Ok(RunOutcome::ok())
                }
                CacheLookup::Stale(mismatch) => Err(mismatch
                    .into_error()
                    .with_path(&target)
                    .with_hint("Run `safelit cache write <path>` to refresh the snapshot.")),
            }
        }
        CacheCommand::Info { cache_file } => {
            let info = CacheCodec::default().inspect(&cache_file)?;
            let value = serde_json::to_value(&info).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode cache info")
                    .with_source(err)
            })?;
            emit_json(value);
            Ok(RunOutcome::ok())
        }
    }
}

fn cache_target(source: &Path, cache_file: Option<PathBuf>) -> PathBuf {
    cache_file.unwrap_or_else(|| default_cache_path(source))
}

fn source_name(path: &str, name: Option<String>) -> String {
    name.unwrap_or_else(|| {
        if path == STDIN_PATH {
            STDIN_NAME.to_string()
        } else {
            path.to_string()
        }
    })
}

fn read_source(path: &str) -> Result<String, Error> {
    if path == STDIN_PATH {
        let mut text = String::new();
        io::stdin().lock().read_to_string(&mut text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read stdin")
                .with_source(err)
        })?;
        return Ok(text);
    }
    let path = Path::new(path);
    fs::read_to_string(path).map_err(|err| io_error(err, path, "failed to read source file"))
}

fn report_json(report: &CheckReport) -> Result<Value, Error> {
    serde_json::to_value(report).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode check report")
            .with_source(err)
    })
}
