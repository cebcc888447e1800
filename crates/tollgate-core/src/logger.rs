//! # Structured JSON Logger
//!
//! Leveled, line-oriented log sink. Each entry is a single JSON object:
//!
//! ```text
//! {"level":"INFO","time":"2024-05-01T12:00:00Z","message":"starting server","properties":{"addr":":4000"}}
//! ```
//!
//! `properties` is omitted when empty; `trace` is attached only to `ERROR`
//! and `FATAL` entries. Entries below the minimum level are dropped before
//! any serialization or I/O.
//!
//! ## Concurrency
//!
//! All writes go through one `parking_lot::Mutex` around the output, so
//! entries written from concurrent requests never interleave.
//!
//! ## Lifetime
//!
//! Construct one `Logger` in `main` and clone it into every component.
//! Clones share the same writer and lock.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// String-keyed entry properties. Key order in the output is irrelevant.
pub type Properties = BTreeMap<String, String>;

/// Build a [`Properties`] map from key/value pairs.
pub fn props<const N: usize>(pairs: [(&str, String); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Log entry severity, ordered `Info < Error < Fatal < Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Routine operational events.
    Info,
    /// Failures that were handled but need operator attention.
    Error,
    /// Failures that terminate the process.
    Fatal,
    /// Minimum level that suppresses every entry.
    Off,
}

impl Level {
    /// Uppercase label written into the `level` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Off => "",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level \"{0}\" (expected info, error, fatal or off)")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "error" => Ok(Self::Error),
            "fatal" => Ok(Self::Fatal),
            "off" => Ok(Self::Off),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

#[derive(Serialize)]
struct Entry<'a> {
    level: &'static str,
    time: String,
    message: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: &'a Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

struct Inner {
    out: Mutex<Box<dyn Write + Send>>,
    min_level: Level,
}

/// Process-wide structured logger. Cheap to clone.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("min_level", &self.inner.min_level)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Create a logger writing to `out`, dropping entries below `min_level`.
    pub fn new<W: Write + Send + 'static>(out: W, min_level: Level) -> Self {
        Self {
            inner: Arc::new(Inner {
                out: Mutex::new(Box::new(out)),
                min_level,
            }),
        }
    }

    /// Create a logger writing to standard output.
    pub fn stdout(min_level: Level) -> Self {
        Self::new(io::stdout(), min_level)
    }

    /// Create a logger writing into memory, returning the handle used to
    /// read the captured entries back.
    pub fn capture(min_level: Level) -> (Self, CapturedLog) {
        let buf = CapturedLog::default();
        (Self::new(buf.clone(), min_level), buf)
    }

    /// The configured minimum level.
    pub fn min_level(&self) -> Level {
        self.inner.min_level
    }

    /// Write an `INFO` entry.
    pub fn info(&self, message: &str, properties: Properties) {
        let _ = self.print(Level::Info, message, &properties);
    }

    /// Write an `ERROR` entry whose message is the error's display text.
    pub fn error(&self, err: impl fmt::Display, properties: Properties) {
        let _ = self.print(Level::Error, &err.to_string(), &properties);
    }

    /// Write a `FATAL` entry and terminate the process with exit status 1.
    pub fn fatal(&self, err: impl fmt::Display, properties: Properties) -> ! {
        let _ = self.print(Level::Fatal, &err.to_string(), &properties);
        std::process::exit(1)
    }

    fn print(&self, level: Level, message: &str, properties: &Properties) -> io::Result<usize> {
        if level < self.inner.min_level {
            return Ok(0);
        }

        let entry = Entry {
            level: level.as_str(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message,
            properties,
            trace: (level >= Level::Error).then(|| Backtrace::force_capture().to_string()),
        };

        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => format!(
                "{}: failed to marshal log message: {e}",
                Level::Error.as_str()
            )
            .into_bytes(),
        };
        line.push(b'\n');

        let mut out = self.inner.out.lock();
        out.write_all(&line)?;
        out.flush()?;
        Ok(line.len())
    }
}

/// In-memory log sink returned by [`Logger::capture`].
#[derive(Clone, Default)]
pub struct CapturedLog {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLog {
    /// Raw captured output.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Captured entries parsed as JSON. Lines that are not JSON are skipped.
    pub fn entries(&self) -> Vec<serde_json::Value> {
        self.contents()
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
