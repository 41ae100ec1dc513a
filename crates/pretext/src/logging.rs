//! Console and file logging, plus a replay of every error at the end of a run.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Layer};

pub const ERROR_BANNER: &str = "While running pretext, the following errors occurred:";

/// Severity of console messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "lower")]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Verbosity {
    fn directive(self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warning => "warn",
            Verbosity::Error | Verbosity::Critical => "error",
        }
    }
}

/// Records the message of every ERROR event.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    errors: Arc<Mutex<Vec<String>>>,
}

impl ErrorCollector {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().map(|errors| errors.clone()).unwrap_or_default()
    }

    /// Print the collected errors under [`ERROR_BANNER`]. Returns whether there were any.
    pub fn replay(&self) -> bool {
        let errors = self.errors();
        if errors.is_empty() {
            return false;
        }
        eprintln!();
        eprintln!("{}", ERROR_BANNER);
        for error in &errors {
            eprintln!("  * {}", error);
        }
        true
    }
}

impl<S: Subscriber> Layer<S> for ErrorCollector {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(visitor.message);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message.insert_str(0, &format!("{:?}", value));
        } else {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// `logs/<YYYYmmdd-HHMMSS>.log` below `project_dir`.
pub fn log_file_path(project_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    project_dir.join("logs").join(format!("{}.log", stamp))
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `verbosity` on the console.
/// With `log_file`, DEBUG and above is also written there.
pub fn init(verbosity: Verbosity, log_file: Option<&Path>) -> Result<ErrorCollector> {
    let console_filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.is_empty() => EnvFilter::new(value),
        _ => EnvFilter::new(verbosity.directive()),
    };
    let console = tracing_fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                tracing_fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    let collector = ErrorCollector::default();
    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(collector.clone())
        .try_init()
        .context("Failed to install the logger")?;
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_only_errors() {
        let collector = ErrorCollector::default();
        let subscriber = tracing_subscriber::registry().with(collector.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("fine");
            tracing::warn!("careful");
            tracing::error!("Target {} could not be built", "web");
            tracing::error!(code = 2, "core failed");
        });

        assert_eq!(
            collector.errors(),
            vec!["Target web could not be built".to_string(), "core failed code=2".to_string()]
        );
        assert!(collector.replay());
    }

    #[test]
    fn nothing_to_replay_without_errors() {
        assert!(!ErrorCollector::default().replay());
    }

    #[test]
    fn log_files_live_under_logs() {
        let path = log_file_path(Path::new("/book"));

        assert_eq!(path.parent(), Some(Path::new("/book/logs")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("log"));
    }

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(Verbosity::Warning.directive(), "warn");
        assert_eq!(Verbosity::Critical.directive(), "error");
        assert_eq!(Verbosity::default(), Verbosity::Info);
    }
}
