//! Logging setup
//!
//! Two `tracing` outputs: the console, and a size-rotated log file with lines
//! shaped `LEVEL file:line message`. `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{DefaultFields, Writer};
use tracing_subscriber::fmt::{
    FmtContext, FormatEvent, FormatFields, Layer as FmtLayer, MakeWriter,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LoggingConfig};

/// Install the global subscriber
///
/// # Errors
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file = RotatingFileWriter::open(&config.logging)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer(file))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Formatting layer writing [`LineFormat`] lines to `writer`
pub fn file_layer<S, W>(writer: W) -> FmtLayer<S, DefaultFields, LineFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .event_format(LineFormat)
        .with_writer(writer)
}

/// `LEVEL file:line message`, file without its directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let file = meta
            .file()
            .and_then(|f| Path::new(f).file_name())
            .and_then(|f| f.to_str())
            .unwrap_or("?");
        write!(writer, "{} {}:{} ", meta.level(), file, meta.line().unwrap_or(0))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Debug)]
struct RotatingState {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    file: Option<File>,
    size: u64,
}

/// Log file that rolls over once it would grow past `max_bytes`
///
/// On rollover `blog.log.N` becomes `blog.log.N+1` (the oldest beyond
/// `backup_count` is dropped) and `blog.log` becomes `blog.log.1`.
#[derive(Debug, Clone)]
pub struct RotatingFileWriter {
    state: Arc<Mutex<RotatingState>>,
}

impl RotatingFileWriter {
    /// Open (or create) the log file, creating its directory as needed
    pub fn open(config: &LoggingConfig) -> Result<Self> {
        if let Some(parent) = config.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }
        let file = open_append(&config.file)
            .with_context(|| format!("Failed to open log file: {:?}", config.file))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            state: Arc::new(Mutex::new(RotatingState {
                path: config.file.clone(),
                max_bytes: config.max_bytes,
                backup_count: config.backup_count,
                file: Some(file),
                size,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotatingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.size > 0 && state.size + buf.len() as u64 > state.max_bytes {
            // A failed rollover keeps appending to the current file
            let _ = state.rotate();
        }
        let file = state.reopen()?;
        file.write_all(buf)?;
        state.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl RotatingState {
    /// Roll the file over, then reopen `path` whether or not that worked
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        let shifted = self.shift_backups();
        self.reopen()?;
        shifted
    }

    /// The open log file, opening `path` again if it was closed
    fn reopen(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let file = open_append(&self.path)?;
            self.size = file.metadata().map(|m| m.len()).unwrap_or(0);
            self.file = Some(file);
        }
        match self.file.as_mut() {
            Some(file) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file is closed")),
        }
    }

    fn shift_backups(&self) -> io::Result<()> {
        if self.backup_count > 0 {
            remove_if_exists(&backup_path(&self.path, self.backup_count))?;
            for index in (1..self.backup_count).rev() {
                let from = backup_path(&self.path, index);
                if from.exists() {
                    fs::rename(&from, backup_path(&self.path, index + 1))?;
                }
            }
            if self.path.exists() {
                fs::rename(&self.path, backup_path(&self.path, 1))?;
            }
        } else {
            remove_if_exists(&self.path)?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// `blog.log` + 3 → `blog.log.3`
pub fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn writer(
        dir: &TempDir,
        max_bytes: u64,
        backup_count: usize,
    ) -> (RotatingFileWriter, PathBuf) {
        let file = dir.path().join("logs").join("blog.log");
        let config = LoggingConfig {
            level: None,
            file: file.clone(),
            max_bytes,
            backup_count,
        };
        (RotatingFileWriter::open(&config).unwrap(), file)
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let (_writer, file) = writer(&dir, 1024, 3);
        assert!(file.exists());
    }

    #[test]
    fn test_writes_below_limit_stay_in_one_file() {
        let dir = TempDir::new().unwrap();
        let (mut writer, file) = writer(&dir, 1024, 3);

        writer.write_all(b"INFO a.rs:1 one\n").unwrap();
        writer.write_all(b"INFO a.rs:2 two\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "INFO a.rs:1 one\nINFO a.rs:2 two\n"
        );
        assert!(!backup_path(&file, 1).exists());
    }

    #[test]
    fn test_rotation_shifts_backups_and_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let (mut writer, file) = writer(&dir, 10, 2);

        for line in ["aaaaaaaa\n", "bbbbbbbb\n", "cccccccc\n", "dddddddd\n"] {
            writer.write_all(line.as_bytes()).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "dddddddd\n");
        assert_eq!(fs::read_to_string(backup_path(&file, 1)).unwrap(), "cccccccc\n");
        assert_eq!(fs::read_to_string(backup_path(&file, 2)).unwrap(), "bbbbbbbb\n");
        assert!(!backup_path(&file, 3).exists());
    }

    #[test]
    fn test_oversized_line_is_written_whole() {
        let dir = TempDir::new().unwrap();
        let (mut writer, file) = writer(&dir, 4, 1);

        writer.write_all(b"much longer than four\n").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "much longer than four\n");
    }

    #[test]
    fn test_no_backups_truncates() {
        let dir = TempDir::new().unwrap();
        let (mut writer, file) = writer(&dir, 10, 0);

        writer.write_all(b"aaaaaaaa\n").unwrap();
        writer.write_all(b"bbbbbbbb\n").unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "bbbbbbbb\n");
        assert!(!backup_path(&file, 1).exists());
    }

    #[test]
    fn test_existing_file_size_counts_toward_limit() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("blog.log");
        fs::write(&file, "previous run\n").unwrap();
        let config = LoggingConfig {
            level: None,
            file: file.clone(),
            max_bytes: 16,
            backup_count: 1,
        };
        let mut writer = RotatingFileWriter::open(&config).unwrap();

        writer.write_all(b"new line\n").unwrap();

        assert_eq!(fs::read_to_string(backup_path(&file, 1)).unwrap(), "previous run\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "new line\n");
    }

    #[test]
    fn test_failed_rotation_keeps_logging() {
        let dir = TempDir::new().unwrap();
        let (mut writer, file) = writer(&dir, 10, 1);
        let blocker = backup_path(&file, 1);
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        writer.write_all(b"aaaaaaaa\n").unwrap();
        writer.write_all(b"bbbbbbbb\n").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "aaaaaaaa\nbbbbbbbb\n");

        fs::remove_dir_all(&blocker).unwrap();
        writer.write_all(b"cccccccc\n").unwrap();
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "aaaaaaaa\nbbbbbbbb\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "cccccccc\n");
    }

    #[test]
    fn test_file_lines_are_level_file_line_message() {
        let dir = TempDir::new().unwrap();
        let (writer, file) = writer(&dir, 1024 * 1024, 1);
        let subscriber = tracing_subscriber::registry().with(file_layer(writer));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello world");
            tracing::warn!(user = 7, "careful");
        });

        let contents = fs::read_to_string(&file).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let (head, message) = lines[0].split_once(' ').unwrap();
        assert_eq!(head, "INFO");
        let (location, message) = message.split_once(' ').unwrap();
        let (file_name, line) = location.split_once(':').unwrap();
        assert_eq!(file_name, "logging.rs");
        assert!(line.parse::<u32>().unwrap() > 0);
        assert_eq!(message, "hello world");

        assert!(lines[1].starts_with("WARN logging.rs:"));
        assert!(lines[1].contains("careful"));
        assert!(lines[1].contains("user=7"));
    }

    proptest! {
        #[test]
        fn prop_backup_path_appends_index(name in "[a-z]{1,10}", index in 1usize..100) {
            let path = PathBuf::from(format!("logs/{name}.log"));
            prop_assert_eq!(
                backup_path(&path, index),
                PathBuf::from(format!("logs/{name}.log.{index}"))
            );
        }

        #[test]
        fn prop_backups_never_exceed_count(lines in 1usize..40, backup_count in 1usize..5) {
            let dir = TempDir::new().unwrap();
            let (mut writer, file) = writer(&dir, 16, backup_count);
            for _ in 0..lines {
                writer.write_all(b"0123456789\n").unwrap();
            }
            prop_assert!(!backup_path(&file, backup_count + 1).exists());
        }
    }
}
