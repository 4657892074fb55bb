use anyhow::{Context as _, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "BIDS_LOG_LEVEL";

#[derive(Debug, Default)]
pub struct LogCounts {
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl LogCounts {
    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Counts warning and error events so the run can report them at exit.
pub struct LevelCounter {
    counts: Arc<LogCounts>,
}

impl LevelCounter {
    pub fn new(counts: Arc<LogCounts>) -> Self {
        Self { counts }
    }
}

impl<S: Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => {
                self.counts.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Level::ERROR => {
                self.counts.errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

pub struct LogGuard {
    pub counts: Arc<LogCounts>,
    pub log_file: Option<PathBuf>,
}

pub fn resolve_level(debug: bool, configured: &str) -> String {
    if debug {
        return "debug".to_string();
    }
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(level) if !level.trim().is_empty() => level,
        _ => configured.to_string(),
    }
}

/// Installs the global subscriber: stderr always, plus `<run>.log` (all
/// enabled events) and `<run>.err` (warnings and errors) under `log_dir`.
pub fn init_logging(level: &str, log_dir: Option<&Path>, run_id: &str) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let counts = Arc::new(LogCounts::default());

    let (log_layer, err_layer, log_file) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
            let log_path = dir.join(format!("bids-{run_id}.log"));
            let err_path = dir.join(format!("bids-{run_id}.err"));
            let log_file = open_log(&log_path)?;
            let err_file = open_log(&err_path)?;
            (
                Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file))),
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(err_file))
                        .with_filter(LevelFilter::WARN),
                ),
                Some(log_path),
            )
        }
        None => (None, None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_layer)
        .with(err_layer)
        .with(LevelCounter::new(counts.clone()));
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialized");
    }

    Ok(LogGuard { counts, log_file })
}

fn open_log(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to open log file {}", path.display()))
}
