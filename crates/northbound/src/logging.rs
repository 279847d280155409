//! Tracing subscriber setup.
//!
//! The binary calls [`init_with_config`] once at startup; everything else just
//! uses `tracing` macros.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter (e.g. "info", "northbound=debug").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Also append JSON lines to this file.
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            log_path: None,
        }
    }
}

/// Append-only, line-flushed file writer.
#[derive(Clone)]
pub struct JsonlWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlWriter {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for JsonlWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for JsonlWriter {
    type Writer = JsonlWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// Fails if the log file cannot be opened.
pub fn init_with_config(config: &LogConfig) -> io::Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(io::stderr)
        .with_filter(env_filter(&config.default_level));

    let file_layer = match &config.log_path {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(JsonlWriter::open(path)?)
                .with_filter(env_filter(&config.default_level)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(path) = &config.log_path {
        tracing::info!(log_path = %path.display(), "Logging initialized");
    }

    Ok(())
}
