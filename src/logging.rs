use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::time_utils::{path_safe_timestamp, record_timestamp};

const SESSION_ID_LEN: usize = 6;

/// Where one logging session writes: `{directory}/{port}_SES_START_{stamp}_{id}/{base}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogDestination {
    directory: PathBuf,
    base_filename: String,
    session_folder: String,
}

impl LogDestination {
    pub fn new(directory: impl Into<PathBuf>, base_filename: &str, port_name: &str) -> Self {
        Self::at(directory, base_filename, port_name, &Local::now(), &session_id())
    }

    pub fn at(
        directory: impl Into<PathBuf>,
        base_filename: &str,
        port_name: &str,
        started: &DateTime<Local>,
        id: &str,
    ) -> Self {
        Self {
            directory: directory.into(),
            base_filename: base_filename.to_string(),
            session_folder: format!(
                "{}_SES_START_{}_{}",
                path_safe_port_name(port_name),
                path_safe_timestamp(started),
                id
            ),
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.directory.join(&self.session_folder)
    }

    /// Path the daily roll is derived from; the file itself never exists under this name.
    pub fn base_path(&self) -> PathBuf {
        self.session_dir().join(&self.base_filename)
    }

    pub fn create(&self) -> io::Result<PathBuf> {
        let dir = self.session_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// `/dev/ttyUSB0` -> `dev_ttyUSB0`, `COM3` stays `COM3`.
fn path_safe_port_name(port_name: &str) -> String {
    port_name
        .trim_start_matches(['/', '\\'])
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// `serial.log` on 2026-10-16 -> `serial20261016.log`
pub fn rolled_file_name(base_filename: &str, day: NaiveDate) -> String {
    let stamp = day.format("%Y%m%d");
    match base_filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}{stamp}.{ext}"),
        _ => format!("{base_filename}{stamp}"),
    }
}

/// Append-only writer opened so concurrent readers and writers are never refused.
pub fn open_shared_append(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(crate::tail::FILE_SHARE_READ | crate::tail::FILE_SHARE_WRITE);
    }
    options.open(path)
}

/// Durable, append-only record of completed serial lines, rolled per calendar day.
pub struct LogSink {
    base_path: PathBuf,
    day: NaiveDate,
    current_path: PathBuf,
    writer: BufWriter<File>,
}

impl LogSink {
    pub fn open(base_path: PathBuf) -> io::Result<Self> {
        Self::open_on(base_path, Local::now().date_naive())
    }

    fn open_on(base_path: PathBuf, day: NaiveDate) -> io::Result<Self> {
        let current_path = Self::path_for(&base_path, day);
        let writer = BufWriter::new(open_shared_append(&current_path)?);
        log::info!("Serial log file: {}", current_path.display());
        Ok(Self {
            base_path,
            day,
            current_path,
            writer,
        })
    }

    fn path_for(base_path: &Path, day: NaiveDate) -> PathBuf {
        let base_filename = base_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "serial.log".to_string());
        base_path.with_file_name(rolled_file_name(&base_filename, day))
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn append(&mut self, line: &str) -> io::Result<()> {
        self.append_at(line, &Local::now())
    }

    fn append_at(&mut self, line: &str, now: &DateTime<Local>) -> io::Result<()> {
        let today = now.date_naive();
        if today != self.day {
            self.writer.flush()?;
            *self = Self::open_on(self.base_path.clone(), today)?;
        }

        writeln!(self.writer, "{} [INF] {}", record_timestamp(now), line)?;
        self.writer.flush()
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        log::info!("Closed serial log file {}", self.current_path.display());
        Ok(())
    }
}

/// Diagnostics for the application itself. With a file, records go there so the
/// terminal UI stays clean; otherwise to stderr.
pub fn init_app_logging(log_file: Option<&Path>, verbosity: u8) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    let base_level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.format(|fmt, record| {
        writeln!(
            fmt,
            "{} [{}] {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = open_shared_append(path)
            .with_context(|| format!("Failed to open application log {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}
