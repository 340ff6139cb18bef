//! Tracing setup shared by the `portwatch` binary and integration tests.
//!
//! Events always go to a daily-rolling file and optionally to stderr, as
//! text or JSON. [`init_logging`] installs the subscriber once per process;
//! later calls get back the path chosen by the first one.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_DIR_ENV: &str = "PORTWATCH_LOG_DIR";

struct Installed {
    path: PathBuf,
    _guard: WorkerGuard,
}

static INSTALLED: OnceLock<Installed> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Used for the default directory and the log file name.
    pub app_name: &'static str,
    /// Explicit log directory. Otherwise `PORTWATCH_LOG_DIR`, then
    /// `~/.local/share/<app_name>`.
    pub log_dir: Option<PathBuf>,
    /// Mirror events to stderr.
    pub emit_stderr: bool,
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: &'static str,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "portwatch",
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info",
        }
    }
}

/// Install the global subscriber and return today's log file.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(installed) = INSTALLED.get() {
        return Ok(installed.path.clone());
    }

    let dir = resolve_log_dir(config.app_name, config.log_dir.as_deref());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

    let file_name = format!("{}.log", config.app_name);
    let path = daily_log_file(&dir, &file_name, Local::now().date_naive());
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, &file_name));

    let mut layers: Vec<BoxedLayer> = vec![layer_for(config.format, file_writer, false)];
    if config.emit_stderr {
        layers.push(layer_for(config.format, std::io::stderr, true));
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.default_filter));

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    let _ = INSTALLED.set(Installed {
        path: path.clone(),
        _guard: guard,
    });
    Ok(path)
}

fn layer_for<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(ansi).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    }
}

/// File the daily appender writes on `date`: `<dir>/<file_name>.<YYYY-MM-DD>`.
fn daily_log_file(dir: &Path, file_name: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{file_name}.{}", date.format("%Y-%m-%d")))
}

fn resolve_log_dir(app_name: &str, explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return expand_home(dir);
    }
    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => expand_home(Path::new(&dir)),
        _ => match home_dir() {
            Some(home) => home.join(".local").join("share").join(app_name),
            None => PathBuf::from(".").join(app_name),
        },
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins_and_expands_home() {
        let resolved = resolve_log_dir("portwatch", Some(Path::new("~/logs")));
        match home_dir() {
            Some(home) => assert_eq!(resolved, home.join("logs")),
            None => assert_eq!(resolved, PathBuf::from("~/logs")),
        }
    }

    #[test]
    fn absolute_dir_is_kept() {
        let resolved = resolve_log_dir("portwatch", Some(Path::new("/var/log/portwatch")));
        assert_eq!(resolved, PathBuf::from("/var/log/portwatch"));
    }

    #[test]
    fn daily_file_matches_appender_naming() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            daily_log_file(Path::new("/logs"), "portwatch.log", date),
            PathBuf::from("/logs/portwatch.log.2024-01-01")
        );
    }
}
