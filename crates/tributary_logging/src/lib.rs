//! Tracing setup shared by Tributary processes.
//!
//! Every process logs to a size-rotated file under the Tributary home and to
//! stderr. `RUST_LOG` overrides the default filter for both sinks.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "tributary_manager=info,tributary_broker=info,tributary_catalog=info,tributary_status_store=info";
const HOME_ENV: &str = "TRIBUTARY_HOME";

/// Size-based rotation for the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    /// Files kept, including the live one.
    pub max_files: usize,
    pub max_bytes: u64,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Logging configuration for a Tributary process.
#[derive(Debug, Clone)]
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Print debug output on stderr regardless of `RUST_LOG`.
    pub verbose: bool,
    /// Defaults to `<tributary home>/logs`.
    pub log_dir: Option<PathBuf>,
    pub rotation: Rotation,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            verbose: false,
            log_dir: None,
            rotation: Rotation::default(),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir()?,
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;
    let file_writer = RollingWriter::open(&log_dir, config.app_name, config.rotation)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

/// Tributary home directory: `$TRIBUTARY_HOME` or `~/.tributary`.
pub fn tributary_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".tributary"))
        .context("Could not determine home directory")
}

/// `<tributary home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(tributary_home()?.join("logs"))
}

// ============================================================================
// Rolling file writer
// ============================================================================

struct RollingFile {
    dir: PathBuf,
    stem: String,
    rotation: Rotation,
    file: Option<File>,
    written: u64,
}

impl RollingFile {
    fn open(dir: &Path, app_name: &str, rotation: Rotation) -> io::Result<Self> {
        let mut rolling = Self {
            dir: dir.to_path_buf(),
            stem: file_stem(app_name),
            rotation: Rotation {
                max_files: rotation.max_files.max(1),
                ..rotation
            },
            file: None,
            written: 0,
        };
        rolling.reopen()?;
        if rolling.written > rolling.rotation.max_bytes {
            rolling.roll()?;
        }
        Ok(rolling)
    }

    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn archived_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.live_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Shift `app.log.N` to `app.log.N+1`, dropping the oldest, then start a
    /// fresh live file.
    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.rotation.max_files - 1;
        if oldest > 0 {
            let expired = self.archived_path(oldest);
            if expired.exists() {
                fs::remove_file(&expired)?;
            }
            for generation in (1..oldest).rev() {
                let from = self.archived_path(generation);
                if from.exists() {
                    fs::rename(&from, self.archived_path(generation + 1))?;
                }
            }
            let live = self.live_path();
            if live.exists() {
                fs::rename(live, self.archived_path(1))?;
            }
        } else {
            fs::remove_file(self.live_path())?;
        }

        self.reopen()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.rotation.max_bytes {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` handing out cheap handles to one shared rolling file.
#[derive(Clone)]
struct RollingWriter {
    inner: Arc<Mutex<RollingFile>>,
}

impl RollingWriter {
    fn open(dir: &Path, app_name: &str, rotation: Rotation) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingFile::open(dir, app_name, rotation)?)),
        })
    }
}

struct RollingWriterHandle {
    inner: Arc<Mutex<RollingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingWriter {
    type Writer = RollingWriterHandle;

    fn make_writer(&'a self) -> Self::Writer {
        RollingWriterHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RollingWriterHandle {
    fn with_file<T>(&self, f: impl FnOnce(&mut RollingFile) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut guard)
    }
}

impl Write for RollingWriterHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if stem.is_empty() {
        "tributary".to_string()
    } else {
        stem
    }
}
