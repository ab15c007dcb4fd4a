//! Commands the terminal UI drives: start/stop logging, send bytes, rescan
//! ports, load defaults. Each returns an error the UI can show as a message.

use anyhow::{Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::logging::LogDestination;
use crate::payload::format_bytes_text;
use crate::serial_io::{ArrivalMonitor, SerialSession, SessionEvent, SessionStatus, SharedSession};
use crate::settings::{DisplaySettings, SerialSelection, Settings};
use crate::tail::run_tail;

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn<F>(make: impl FnOnce(Arc<AtomicBool>) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(make(running.clone()));
        Self { running, handle }
    }

    async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.handle.await {
            log::warn!("Background task ended abnormally: {e}");
        }
    }
}

pub struct LoggerApp {
    settings: Settings,
    settings_path: PathBuf,
    session: SharedSession,
    ports: Vec<String>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    visible_tx: Arc<watch::Sender<String>>,
    visible_rx: watch::Receiver<String>,
    monitor: Option<Worker>,
    tail: Option<Worker>,
    session_dir: Option<PathBuf>,
}

impl LoggerApp {
    pub fn new(
        settings: Settings,
        settings_path: PathBuf,
        session: SerialSession,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let ports = session.catalog().list_ports();
        let (visible_tx, visible_rx) = watch::channel(String::new());
        Self {
            settings,
            settings_path,
            session: Arc::new(Mutex::new(session)),
            ports,
            events_tx,
            visible_tx: Arc::new(visible_tx),
            visible_rx,
            monitor: None,
            tail: None,
            session_dir: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    pub fn session_dir(&self) -> Option<&PathBuf> {
        self.session_dir.as_ref()
    }

    pub fn is_logging(&self) -> bool {
        self.monitor.is_some()
    }

    /// Latest tailed content of the active log file.
    pub fn visible_log(&self) -> watch::Receiver<String> {
        self.visible_rx.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.session.lock().await.status()
    }

    pub async fn start_logging(&mut self) -> Result<()> {
        if self.settings.log.last_directory.trim().is_empty() {
            bail!("Log to directory is empty. Set a directory to log serial data to and try again.");
        }
        let policy = self.settings.display.formatting_policy()?;

        let session_dir = {
            let mut session = self.session.lock().await;
            if session.status() == SessionStatus::Logging {
                return Err(SessionError::AlreadyLogging.into());
            }
            if session.status() == SessionStatus::Closed {
                session.open_port(&self.settings.serial)?;
            }
            if let Some(port_name) = session.port_name() {
                self.settings.serial.last_port = port_name.to_string();
            }
            let destination = LogDestination::new(
                self.settings.log.directory(),
                &self.settings.log.base_filename,
                &self.settings.serial.last_port,
            );
            match session.start_logging(&destination, policy) {
                Ok(dir) => dir,
                Err(e) => {
                    let _ = session.close();
                    return Err(e.into());
                }
            }
        };

        let session = self.session.clone();
        let events = self.events_tx.clone();
        self.monitor = Some(Worker::spawn(move |running| {
            ArrivalMonitor::new(session, running, events).run()
        }));

        let dir = session_dir.clone();
        let interval = self.settings.log.tail_interval();
        let visible = self.visible_tx.clone();
        self.visible_tx.send_replace(String::new());
        self.tail = Some(Worker::spawn(move |running| run_tail(dir, interval, running, visible)));
        self.session_dir = Some(session_dir);

        // logging is running at this point, a failed save only loses the preferences
        if let Err(e) = self.settings.save(&self.settings_path) {
            log::warn!("Logging started but settings could not be saved: {e:#}");
        }
        Ok(())
    }

    /// Stops logging and closes the port. Safe to call when nothing runs.
    pub async fn stop_logging(&mut self) -> Result<()> {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop().await;
        }
        let closed = self.session.lock().await.close();

        // one last poll so the final lines make it to the display
        if let Some(tail) = self.tail.take() {
            tokio::time::sleep(self.settings.log.tail_interval()).await;
            tail.stop().await;
        }
        closed?;
        Ok(())
    }

    /// Called when the arrival monitor reports the port is gone.
    pub async fn on_session_ended(&mut self) {
        if let Err(e) = self.stop_logging().await {
            log::warn!("Cleanup after session end: {e:#}");
        }
    }

    /// Returns the canonical text of what went out on the wire.
    pub async fn send_bytes(&mut self, text: &str) -> Result<String> {
        let sent = self.session.lock().await.write_to_serial(text)?;
        Ok(format_bytes_text(&sent))
    }

    pub async fn rescan_ports(&mut self) {
        let session = self.session.lock().await;
        let catalog = session.catalog();
        self.ports = catalog.list_ports();
        if !catalog.port_exists(&self.settings.serial.last_port) {
            self.settings.serial.last_port = catalog.first_port();
        }
        log::info!("Rescanned ports: {}", self.ports.join(", "));
    }

    /// Reset port and display choices. The log directory is kept.
    pub async fn load_defaults(&mut self) -> Result<()> {
        if self.is_logging() {
            bail!("Stop logging before loading defaults");
        }
        let session = self.session.lock().await;
        self.settings.serial = SerialSelection::defaults(session.catalog());
        self.settings.display = DisplaySettings::default();
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        if self.is_logging() || self.tail.is_some() {
            if let Err(e) = self.stop_logging().await {
                log::warn!("Shutdown: {e:#}");
            }
        }
    }
}
