//! File sink for the fmt layer.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

use crate::logger::LoggerError;
use crate::logger::config::FileConfig;

enum Sink {
    File(BufWriter<File>),
    /// Entered after the first failed file write and never left.
    Stderr,
}

/// Buffered log file shared by every event. A failed write moves the sink
/// to stderr for the rest of the process.
#[derive(Clone)]
pub struct LogFileWriter {
    sink: Arc<Mutex<Sink>>,
}

impl LogFileWriter {
    pub fn new(config: &FileConfig) -> Result<Self, LoggerError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)?;

        Ok(Self {
            sink: Arc::new(Mutex::new(Sink::File(BufWriter::new(file)))),
        })
    }

    pub fn is_in_fallback_mode(&self) -> bool {
        matches!(*self.lock(), Sink::Stderr)
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileGuard {
            writer: self.clone(),
        }
    }
}

/// Handle for one event; flushes the file buffer when dropped.
pub struct LogFileGuard {
    writer: LogFileWriter,
}

impl Write for LogFileGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sink = self.writer.lock();
        let Sink::File(file) = &mut *sink else {
            return io::stderr().write(buf);
        };

        match file.write(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                *sink = Sink::Stderr;
                eprintln!("log file write failed, logging to stderr: {}", e);
                io::stderr().write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.writer.lock() {
            Sink::File(file) => file.flush(),
            Sink::Stderr => io::stderr().flush(),
        }
    }
}

impl Drop for LogFileGuard {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
