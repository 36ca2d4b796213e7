//! Logging bootstrap shared by the binary and integration tests.
//!
//! [`init_logging`] installs one global `tracing` subscriber writing to a
//! daily rolling file, optionally mirrored to `stderr`. Only the first call
//! installs anything; later calls return the path resolved by the first.
//!
//! Pipeline events use the targets `warrant.command`, `warrant.fetch`,
//! `warrant.extract` and `warrant.query`, so `RUST_LOG=warrant.fetch=debug`
//! narrows output to page loads.

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Overrides the log directory when none is configured.
pub const LOG_DIR_ENV: &str = "WARRANT_LOG_DIR";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Output encoding for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Used for the file name and the default directory.
    pub app_name: &'static str,
    /// Falls back to [`LOG_DIR_ENV`], then to `~/.local/share/<app_name>`.
    pub log_dir: Option<PathBuf>,
    pub emit_stderr: bool,
    pub format: LogFormat,
    /// Applied when `RUST_LOG` is unset.
    pub default_filter: &'static str,
    /// Daily files kept on disk; `None` keeps everything.
    pub retention_days: Option<usize>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "warrant-bot",
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info,warrant=info",
            retention_days: Some(14),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn layer_for<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(ansi).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    }
}

/// Install the global subscriber and return the path of today's log file.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let dir = log_dir(config.app_name, config.log_dir.clone());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let mut appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(config.app_name)
        .filename_suffix("log");
    if let Some(days) = config.retention_days {
        appender = appender.max_log_files(days.max(1));
    }
    let appender = appender
        .build(&dir)
        .with_context(|| format!("cannot open rolling log in {}", dir.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let mut layers = vec![layer_for(config.format, file_writer, false)];
    if config.emit_stderr {
        layers.push(layer_for(config.format, std::io::stderr, true));
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter));

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber already set: {e}"))?;

    let _ = LOG_GUARD.set(guard);
    let today = Local::now().format("%Y-%m-%d");
    let path = dir.join(format!("{}.{today}.log", config.app_name));
    let _ = LOG_PATH.set(path.clone());
    Ok(path)
}

/// Explicit setting, then [`LOG_DIR_ENV`], then the per-user data directory.
fn log_dir(app_name: &str, explicit: Option<PathBuf>) -> PathBuf {
    let home = env::var_os("HOME").map(PathBuf::from);
    explicit
        .or_else(|| env::var_os(LOG_DIR_ENV).map(PathBuf::from))
        .map(|dir| match (dir.strip_prefix("~"), &home) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => dir,
        })
        .unwrap_or_else(|| match home {
            Some(home) => home.join(".local/share").join(app_name),
            None => PathBuf::from(app_name),
        })
}
