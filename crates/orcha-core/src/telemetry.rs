//! Tracing setup for the orcha binary.
//!
//! Console output goes to stderr, so `orcha history` stays clean on stdout.
//! Every event is also appended as plain text to a durable log file
//! (`orchestrator.log` by default) that outlives the terminal session.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::{warn, Level, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILE: &str = "orchestrator.log";

/// Initialise the global tracing subscriber.
///
/// `json` switches the console to newline-delimited JSON; `level` applies
/// when `RUST_LOG` is unset. When `log_file` is given, events are appended
/// to it as well. A log file that cannot be opened is reported on the
/// console and skipped.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level, log_file: Option<&Path>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (file, file_error) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let console = if json {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file.map(file_layer))
        .try_init()
        .is_ok();

    if let (true, Some(e), Some(path)) = (installed, file_error, log_file) {
        warn!(path = %path.display(), error = %e, "log file unavailable, logging to console only");
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Plain-text layer appending to `file`.
fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(false, Level::INFO, None);
        init_tracing(true, Level::DEBUG, None);
    }

    #[test]
    fn test_file_layer_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/orchestrator.log");
        let file = open_log_file(&path).unwrap();

        let subscriber = tracing_subscriber::registry().with(file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            info!(agent = "aider", "agent finished");
        });

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("agent finished"));
        assert!(body.contains("agent=\"aider\""));
        assert!(!body.contains('\u{1b}'), "log file must not contain ANSI escapes");
    }

    #[test]
    fn test_log_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let subscriber = tracing_subscriber::registry().with(file_layer(open_log_file(&path).unwrap()));
        tracing::subscriber::with_default(subscriber, || info!("later run"));

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("earlier run\n"));
        assert!(body.contains("later run"));
    }

    #[test]
    fn test_unopenable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(open_log_file(&blocker.join("orchestrator.log")).is_err());
    }
}
