//! Logging for a single run.
//!
//! The rest of the program logs through [Log], a cheap, cloneable handle. Every [Log] feeds one
//! channel, and a [LogReceiver] on its own thread drains that channel into a [Logger], which does
//! the actual writing.
//!
//! # Lifecycle
//!
//! 1. Call [init] once per process with a [Logger] and a threshold [Level]. It starts the writer
//!    thread and returns the first [Log] and a [LogGuard].
//! 2. Clone the [Log] wherever it is needed. [Log::for_host] tags a clone with a host name.
//! 3. When the run is over, drop every [Log] and call [LogGuard::finish], which waits for the
//!    writer thread to drain the channel, flushes the [Logger], and hands it back.
//!
//! [LogGuard::finish] blocks until the last [Log] is dropped, so do not hold on to one across it.

use anyhow::anyhow;
use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The name of the log file that [FileLogger] writes.
pub const DEFAULT_LOG_FILE: &str = "netpilot.log";

/// Severity classifications for log entries and task results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Detail that is only interesting while troubleshooting.
    Debug,

    /// Just a status update; nothing's wrong.
    #[default]
    Info,

    /// Something minor went wrong, but the run is continuing.
    Warning,

    /// Something significant went wrong. The run may still be continuing for other hosts.
    Error,
}

impl Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// A single log message.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub level: Level,

    /// The host the message is about, if any.
    pub host: Option<Arc<str>>,
    pub message: String,
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} - {} - {} - {}",
            self.time.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.host.as_deref().unwrap_or("netpilot"),
            self.level,
            self.message,
        )
    }
}

/// A logging handle for use throughout the program.
///
/// Clone one of these and store it in your types that need to send log messages.
///
/// If sending fails because the writer thread is gone, this type will failover to standard error
/// automatically.
#[derive(Clone, Debug)]
pub struct Log {
    sender: Sender<LogEntry>,
    threshold: Level,
    host: Option<Arc<str>>,
}

impl Log {
    /// Returns a clone of this handle that tags every entry with `host`.
    pub fn for_host(&self, host: &str) -> Self {
        Self {
            host: Some(host.into()),
            ..self.clone()
        }
    }

    /// Returns `true` if entries at `level` will be recorded.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.threshold
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        if !self.enabled(level) {
            return;
        }

        let entry = LogEntry {
            time: Local::now(),
            level,
            host: self.host.clone(),
            message: message.into(),
        };
        if let Err(err) = self.sender.send(entry) {
            eprint!("{}", err.into_inner());
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }
}

/// An interface to a physical logging mechanism, e.g. a disk logger.
///
/// If you're implementing your own logging system, you simply need to implement this trait on your
/// type.
pub trait Logger: Send + 'static {
    /// Write one entry. [LogEntry] implements [Display] with the default line format, so
    /// `entry.to_string()` is usually all you need.
    fn log(&mut self, entry: &LogEntry) -> io::Result<()>;

    /// Called once, after the last entry.
    fn flush(&mut self) -> io::Result<()>;
}

/// Processes log messages from the rest of the program and passes them to a [Logger].
pub struct LogReceiver<L: Logger> {
    receiver: Receiver<LogEntry>,

    /// The mechanism for writing logs, e.g. to disk.
    logger: L,
}

impl<L: Logger> LogReceiver<L> {
    /// Creates a [LogReceiver] and the first [Log] that feeds it.
    pub fn new(logger: L, threshold: Level) -> (Self, Log) {
        let (sender, receiver) = channel::unbounded();
        let log = Log {
            sender,
            threshold,
            host: None,
        };
        (Self { receiver, logger }, log)
    }

    /// Writes entries until every [Log] is dropped, then flushes and returns the [Logger].
    ///
    /// A [Logger] that fails to write an entry does not stop the run; the entry goes to standard
    /// error instead.
    pub fn run(mut self) -> L {
        for entry in self.receiver.iter() {
            if let Err(err) = self.logger.log(&entry) {
                eprint!("failed to write log entry ({err}): {entry}");
            }
        }
        if let Err(err) = self.logger.flush() {
            eprintln!("failed to flush log: {err}");
        }
        self.logger
    }
}

/// Owns the writer thread started by [init].
#[derive(Debug)]
pub struct LogGuard<L> {
    handle: JoinHandle<L>,
}

impl<L> LogGuard<L> {
    /// Waits for every outstanding entry to be written and flushed, then returns the [Logger].
    ///
    /// Blocks until every [Log] has been dropped.
    pub fn finish(self) -> anyhow::Result<L> {
        self.handle
            .join()
            .map_err(|_| anyhow!("the log writer thread panicked"))
    }
}

/// Starts the writer thread for `logger` and returns the first [Log] and the thread's guard.
pub fn init<L: Logger>(logger: L, threshold: Level) -> (Log, LogGuard<L>) {
    let (receiver, log) = LogReceiver::new(logger, threshold);
    let handle = thread::spawn(move || receiver.run());
    (log, LogGuard { handle })
}

/// Opens a log file for appending, or creates it if it did not exist.
fn open_log_file(path: impl AsRef<Path>) -> io::Result<File> {
    OpenOptions::new()
        .append(true)
        .create(true)
        .open(path.as_ref())
}

/// A [Logger] that appends every entry to [DEFAULT_LOG_FILE] inside a directory.
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    file: BufWriter<File>,
}

impl FileLogger {
    /// Create a new [FileLogger] that stores its file in `directory`.
    ///
    /// Attempts to create `directory` if it does not exist.
    ///
    /// # Returns
    ///
    /// A new [FileLogger], or any [io::Error] encountered when trying to ensure that `directory`
    /// exists and is a directory, or when opening the log file.
    pub fn new(directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();

        match fs::metadata(&directory) {
            Ok(md) if !md.is_dir() => {
                // There's something at this path, but it's not a directory. We can't continue.
                return Err(io::Error::new(
                    ErrorKind::NotFound,
                    anyhow!("not a directory: {}", directory.display()),
                ));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&directory)?;
            }
            _ => {}
        }

        let path = directory.join(DEFAULT_LOG_FILE);
        let file = BufWriter::new(open_log_file(&path)?);
        Ok(Self { path, file })
    }

    /// The path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Logger for FileLogger {
    fn log(&mut self, entry: &LogEntry) -> io::Result<()> {
        self.file.write_all(entry.to_string().as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
