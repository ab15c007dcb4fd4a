use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

#[cfg(windows)]
pub const FILE_SHARE_READ: u32 = 0x0000_0001;
#[cfg(windows)]
pub const FILE_SHARE_WRITE: u32 = 0x0000_0002;

pub const MIN_POLL: Duration = Duration::from_millis(10);
pub const MAX_POLL: Duration = Duration::from_millis(50);

fn open_shared_read(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE);
    }
    options.open(path)
}

/// Read a file that another handle may be appending to, without locking it.
///
/// Exactly the length seen at open time is read; anything appended after
/// that shows up on the next call.
pub fn read_file(path: &Path) -> io::Result<String> {
    let file = open_shared_read(path)?;
    let len = file.metadata()?.len();

    let mut bytes = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut bytes)?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Most recently modified regular file in `dir`, ties broken by name.
pub fn newest_file_in(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified()?;
        let path = entry.path();
        let is_newer = match &newest {
            None => true,
            Some((t, p)) => modified > *t || (modified == *t && path > *p),
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Follows the newest file of a session directory and reports content changes.
pub struct TailReader {
    dir: PathBuf,
    last_seen: String,
}

impl TailReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_seen: String::new(),
        }
    }

    /// `Some(content)` only when the content differs from the previous poll.
    pub fn poll(&mut self) -> io::Result<Option<String>> {
        let Some(path) = newest_file_in(&self.dir)? else {
            return Ok(None);
        };
        let content = read_file(&path)?;
        if content == self.last_seen {
            return Ok(None);
        }
        self.last_seen.clone_from(&content);
        Ok(Some(content))
    }
}

pub fn clamp_poll_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_POLL, MAX_POLL)
}

/// Poll `dir` until `running` goes false, publishing changed content to `visible`.
pub async fn run_tail(
    dir: PathBuf,
    interval: Duration,
    running: Arc<AtomicBool>,
    visible: Arc<watch::Sender<String>>,
) {
    let interval = clamp_poll_interval(interval);
    let mut reader = TailReader::new(dir);

    while running.load(Ordering::SeqCst) {
        match reader.poll() {
            Ok(Some(content)) => {
                visible.send_replace(content);
            }
            Ok(None) => {}
            Err(e) => log::debug!("Tail read of {} failed: {e}", reader.dir.display()),
        }
        tokio::time::sleep(interval).await;
    }
}
