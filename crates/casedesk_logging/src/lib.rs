//! Logging setup shared by the casedesk binary and its tests.
//!
//! Two sinks: a size-rotated log file under `<home>/logs/` and stderr.
//! The stderr sink is quietened in TUI mode because anything written there
//! lands on top of the alternate screen.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "casedesk=info,casedesk_api=info,casedesk_export=info";
const KEEP_GENERATIONS: usize = 5;
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

/// How the process wants its logs.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    pub tui_mode: bool,
    /// Overrides `<home>/logs` (tests, packaged installs).
    pub log_dir: Option<PathBuf>,
}

/// Install the global tracing subscriber.
///
/// Returns the log file path so callers can mention it in error output.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    let dir = match config.log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            dir
        }
        None => ensure_logs_dir().context("Failed to ensure log directory")?,
    };
    let writer = SharedLogWriter::open(&dir, config.app_name)
        .context("Failed to initialize rotating log writer")?;
    let log_path = writer.path();

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = if config.tui_mode && !config.verbose {
        EnvFilter::new("warn")
    } else if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(log_path)
}

/// casedesk home: `$CASEDESK_HOME`, else `~/.casedesk`.
///
/// Falls back to `./.casedesk` on systems without a resolvable home directory.
pub fn casedesk_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("CASEDESK_HOME") {
        if !override_path.trim().is_empty() {
            return PathBuf::from(override_path);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".casedesk")
}

/// `<home>/logs`
pub fn logs_dir() -> PathBuf {
    casedesk_home().join("logs")
}

/// Create the logs directory if needed.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// A log file that shifts `name.log` → `name.log.1` → ... once it grows past
/// `limit` bytes. At most `generations` files exist at any time.
struct RotatingLog {
    dir: PathBuf,
    stem: String,
    generations: usize,
    limit: u64,
    file: Option<File>,
    written: u64,
}

impl RotatingLog {
    fn open(dir: &Path, name: &str, generations: usize, limit: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut log = Self {
            dir: dir.to_path_buf(),
            stem: sanitize_name(name),
            generations: generations.max(1),
            limit,
            file: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.limit {
            log.rotate()?;
        }
        Ok(log)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn generation_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.stem, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.generations - 1;
        if oldest == 0 {
            // Single generation: truncate in place.
            fs::remove_file(self.active_path()).or_else(ignore_missing)?;
            return self.reopen();
        }

        fs::remove_file(self.generation_path(oldest)).or_else(ignore_missing)?;
        for generation in (1..oldest).rev() {
            let from = self.generation_path(generation);
            if from.exists() {
                fs::rename(&from, self.generation_path(generation + 1))?;
            }
        }
        let active = self.active_path();
        if active.exists() {
            fs::rename(&active, self.generation_path(1))?;
        }
        self.reopen()
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.rotate()?;
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

/// `MakeWriter` handle; every event locks the shared file briefly.
#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<RotatingLog>>,
}

impl SharedLogWriter {
    fn open(dir: &Path, name: &str) -> Result<Self> {
        let log = RotatingLog::open(dir, name, KEEP_GENERATIONS, ROTATE_AT_BYTES)
            .with_context(|| format!("Failed to open log file for {}", name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(log)),
        })
    }

    fn path(&self) -> PathBuf {
        match self.inner.lock() {
            Ok(log) => log.active_path(),
            Err(poisoned) => poisoned.into_inner().active_path(),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        log.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut log = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        log.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "casedesk".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("casedesk"), "casedesk");
        assert_eq!(sanitize_name("case desk/tui"), "case_desk_tui");
        assert_eq!(sanitize_name(""), "casedesk");
    }

    #[test]
    fn test_rotation_keeps_bounded_generations() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = RotatingLog::open(tmp.path(), "app", 3, 16).unwrap();

        for _ in 0..10 {
            log.write_all(b"0123456789abcdef").unwrap();
        }
        log.flush().unwrap();

        assert!(tmp.path().join("app.log").exists());
        assert!(tmp.path().join("app.log.1").exists());
        assert!(tmp.path().join("app.log.2").exists());
        assert!(!tmp.path().join("app.log.3").exists());
    }

    #[test]
    fn test_single_generation_truncates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = RotatingLog::open(tmp.path(), "solo", 1, 8).unwrap();
        log.write_all(b"12345678").unwrap();
        log.write_all(b"abcdefgh").unwrap();
        log.flush().unwrap();

        let content = fs::read_to_string(tmp.path().join("solo.log")).unwrap();
        assert_eq!(content, "abcdefgh");
        assert!(!tmp.path().join("solo.log.1").exists());
    }

    #[test]
    fn test_existing_file_size_counts_toward_limit() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("big.log"), vec![b'x'; 64]).unwrap();

        let log = RotatingLog::open(tmp.path(), "big", 2, 32).unwrap();
        assert_eq!(log.written, 0);
        assert!(tmp.path().join("big.log.1").exists());
    }
}
