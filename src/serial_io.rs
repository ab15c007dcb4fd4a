use chrono::{DateTime, Local};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};

use crate::config::{FormattingPolicy, Parity, PortConfiguration, StopBits};
use crate::error::SessionError;
use crate::format::LineAssembler;
use crate::logging::{LogDestination, LogSink};
use crate::payload::parse_bytes_text;
use crate::port_discovery::PortCatalog;
use crate::settings::SerialSelection;
use crate::time_utils::{FORMATTING_WARNING_WINDOW, WarningThrottle};

const READ_CHUNK: usize = 4096;

/// Quiet time after which a line still waiting for its terminator is logged anyway.
pub const IDLE_FLUSH: Duration = Duration::from_millis(100);

/// The slice of a serial port the session needs.
pub trait SerialLink: Send {
    /// Bytes that can be read right now without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

pub trait PortOpener: Send + Sync {
    fn open(&self, config: &PortConfiguration) -> Result<Box<dyn SerialLink>, SessionError>;
}

/// Opens real hardware through the `serialport` crate.
pub struct SystemOpener;

impl PortOpener for SystemOpener {
    fn open(&self, config: &PortConfiguration) -> Result<Box<dyn SerialLink>, SessionError> {
        let unsupported = |what: String| SessionError::PortUnavailable {
            port: config.port_name().to_string(),
            reason: format!("{what} is not supported by the serial driver"),
        };

        let data_bits = match config.data_bits() {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(unsupported(format!("{other} data bits"))),
        };
        let parity = match config.parity() {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
            other => return Err(unsupported(format!("{other} parity"))),
        };
        let stop_bits = match config.stop_bits() {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
            other => return Err(unsupported(format!("{other} stop bits"))),
        };

        let port = serialport::new(config.port_name(), config.baud_rate())
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| SessionError::PortUnavailable {
                port: config.port_name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(port))
    }
}

struct OpenPort {
    config: PortConfiguration,
    opened_at: DateTime<Local>,
    link: Box<dyn SerialLink>,
}

struct ActiveLog {
    assembler: LineAssembler,
    sink: LogSink,
    throttle: WarningThrottle,
}

impl ActiveLog {
    fn append(&mut self, line: &str) -> Result<(), SessionError> {
        self.sink.append(line).map_err(|source| SessionError::LogWrite {
            path: self.sink.current_path().to_path_buf(),
            source,
        })
    }
}

enum SessionState {
    Closed,
    Open(OpenPort),
    Logging(OpenPort, ActiveLog),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Open,
    Logging,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub bytes: usize,
    pub lines: usize,
    pub dropped: usize,
    /// Set when dropped bytes produced a warning that got past the throttle.
    pub formatting_warning: bool,
}

/// One serial port, from open to close, and the log fed by it.
pub struct SerialSession {
    catalog: PortCatalog,
    opener: Box<dyn PortOpener>,
    state: SessionState,
    read_buf: Vec<u8>,
}

impl SerialSession {
    pub fn new(catalog: PortCatalog, opener: impl PortOpener + 'static) -> Self {
        Self {
            catalog,
            opener: Box::new(opener),
            state: SessionState::Closed,
            read_buf: vec![0u8; READ_CHUNK],
        }
    }

    pub fn system() -> Self {
        Self::new(PortCatalog::system(), SystemOpener)
    }

    pub fn catalog(&self) -> &PortCatalog {
        &self.catalog
    }

    /// Name of the open port as the OS enumerates it.
    pub fn port_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Closed => None,
            SessionState::Open(port) | SessionState::Logging(port, _) => Some(port.config.port_name()),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Closed => SessionStatus::Closed,
            SessionState::Open(_) => SessionStatus::Open,
            SessionState::Logging(..) => SessionStatus::Logging,
        }
    }

    pub fn open_port(&mut self, selection: &SerialSelection) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Closed) {
            return Err(SessionError::AlreadyOpen);
        }

        let config = PortConfiguration::validate(selection, &self.catalog)?;
        let link = self.opener.open(&config)?;
        log::info!("Opened serial port {}", config.describe());

        self.state = SessionState::Open(OpenPort {
            config,
            opened_at: Local::now(),
            link,
        });
        Ok(())
    }

    /// Begin framing bytes into `destination`. The line ending rule is checked
    /// here so a bad rule never reaches the read path.
    pub fn start_logging(
        &mut self,
        destination: &LogDestination,
        policy: FormattingPolicy,
    ) -> Result<PathBuf, SessionError> {
        let port_name = match &self.state {
            SessionState::Closed => return Err(SessionError::PortClosed),
            SessionState::Logging(..) => return Err(SessionError::AlreadyLogging),
            SessionState::Open(port) => port.config.port_name().to_string(),
        };

        let assembler = LineAssembler::new(policy)?;
        let session_dir = destination.create().map_err(|source| SessionError::LogWrite {
            path: destination.session_dir(),
            source,
        })?;
        let sink = LogSink::open(destination.base_path()).map_err(|source| SessionError::LogWrite {
            path: destination.base_path(),
            source,
        })?;

        let active = ActiveLog {
            assembler,
            sink,
            throttle: WarningThrottle::new(FORMATTING_WARNING_WINDOW),
        };
        self.state = match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Open(port) => {
                log::info!(
                    "Started logging {} (open since {}) to {}",
                    port_name,
                    port.opened_at.format("%H:%M:%S"),
                    session_dir.display()
                );
                SessionState::Logging(port, active)
            }
            other => other,
        };
        Ok(session_dir)
    }

    /// Drain everything the port has buffered right now. Completed lines go to
    /// the sink; a trailing partial line stays buffered for the next call.
    ///
    /// A read failure ends the session and is returned as `PortLost`.
    pub fn on_bytes_available(&mut self) -> Result<DrainReport, SessionError> {
        let result = match &mut self.state {
            SessionState::Closed => return Err(SessionError::PortClosed),
            SessionState::Open(_) => return Ok(DrainReport::default()),
            SessionState::Logging(port, active) => drain(port.link.as_mut(), active, &mut self.read_buf),
        };

        if let Err(SessionError::PortLost(e)) = &result {
            log::error!("Serial read failed, closing session: {e}");
            if let Err(close_err) = self.close() {
                log::error!("Closing after read failure: {close_err}");
            }
        }
        result
    }

    /// Write out the buffered partial line, if any. Returns whether a line was written.
    pub fn flush_pending(&mut self) -> Result<bool, SessionError> {
        let SessionState::Logging(_, active) = &mut self.state else {
            return Ok(false);
        };
        match active.assembler.flush_partial() {
            Some(line) => active.append(&line).map(|()| true),
            None => Ok(false),
        }
    }

    /// Parse `raw_text` and send it in one write. Nothing is sent unless every
    /// value parses.
    pub fn write_to_serial(&mut self, raw_text: &str) -> Result<Vec<u8>, SessionError> {
        let bytes = parse_bytes_text(raw_text)?;
        let port = match &mut self.state {
            SessionState::Closed => return Err(SessionError::PortClosed),
            SessionState::Open(port) | SessionState::Logging(port, _) => port,
        };

        log::debug!("Writing {} bytes to {}", bytes.len(), port.config.port_name());
        port.link.send(&bytes).map_err(SessionError::WriteFailed)?;
        Ok(bytes)
    }

    /// Back to `Closed` from any state. Closing twice is fine.
    pub fn close(&mut self) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Closed => {
                log::warn!("Close requested but no serial port is open");
                Ok(())
            }
            SessionState::Open(port) => {
                log::info!("Closed serial port {}", port.config.port_name());
                Ok(())
            }
            SessionState::Logging(port, mut active) => {
                let flushed = match active.assembler.flush_partial() {
                    Some(line) => active.append(&line),
                    None => Ok(()),
                };
                let path = active.sink.current_path().to_path_buf();
                let closed = active
                    .sink
                    .close()
                    .map_err(|source| SessionError::LogWrite { path, source });
                log::info!("Stopped logging and closed {}", port.config.port_name());
                flushed.and(closed)
            }
        }
    }
}

fn drain(link: &mut dyn SerialLink, active: &mut ActiveLog, buf: &mut [u8]) -> Result<DrainReport, SessionError> {
    let mut report = DrainReport::default();

    loop {
        let available = link.bytes_available().map_err(SessionError::PortLost)?;
        if available == 0 {
            break;
        }

        let want = available.min(buf.len());
        let n = match link.read_chunk(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => break,
            Err(e) => return Err(SessionError::PortLost(e)),
        };
        report.bytes += n;

        for &byte in &buf[..n] {
            match active.assembler.feed(byte) {
                Ok(Some(line)) => {
                    active.append(&line)?;
                    report.lines += 1;
                }
                Ok(None) => {}
                Err(SessionError::FormattingUnconfigured) => report.dropped += 1,
                Err(e) => return Err(e),
            }
        }
    }

    if report.dropped > 0 && active.throttle.allow() {
        log::warn!(
            "Invalid formatting option, {} bytes dropped. Select a display mode and restart logging",
            report.dropped
        );
        report.formatting_warning = true;
    }

    Ok(report)
}

pub type SharedSession = Arc<Mutex<SerialSession>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Warning(String),
    Ended(String),
}

/// Stands in for a data-received callback: waits for bytes on the port and
/// drains the session each time some arrive, one drain at a time.
pub struct ArrivalMonitor {
    session: SharedSession,
    running: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<SessionEvent>,
    idle_wait: Duration,
    idle_flush: Duration,
}

impl ArrivalMonitor {
    pub fn new(
        session: SharedSession,
        running: Arc<AtomicBool>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            session,
            running,
            events,
            idle_wait: Duration::from_millis(5),
            idle_flush: IDLE_FLUSH,
        }
    }

    pub async fn run(self) {
        let mut last_arrival: Option<Instant> = None;

        while self.running.load(Ordering::SeqCst) {
            let outcome = {
                let mut guard = self.session.lock().await;
                if guard.status() != SessionStatus::Logging {
                    break;
                }
                match guard.on_bytes_available() {
                    Ok(report)
                        if report.bytes == 0
                            && last_arrival.is_some_and(|at| at.elapsed() >= self.idle_flush) =>
                    {
                        last_arrival = None;
                        guard.flush_pending().map(|_| report)
                    }
                    other => other,
                }
            };

            match outcome {
                Ok(report) => {
                    if report.bytes > 0 {
                        last_arrival = Some(Instant::now());
                    }
                    if report.lines > 0 {
                        log::trace!("Drained {} bytes into {} lines", report.bytes, report.lines);
                    }
                    if report.formatting_warning {
                        let _ = self.events.send(SessionEvent::Warning(
                            "Invalid formatting option, select a display mode and restart logging".into(),
                        ));
                    }
                    if report.bytes == 0 {
                        tokio::time::sleep(self.idle_wait).await;
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
                Err(e) => {
                    log::error!("Serial session ended: {e}");
                    let _ = self.events.send(SessionEvent::Ended(e.to_string()));
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DisplayMode, LineEndingRule, Separator};
    use crate::format::MAX_LINE_BYTES;
    use crate::port_discovery::FixedPorts;
    use crate::tail::{newest_file_in, read_file};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    /// Both ends of an in-memory serial line.
    #[derive(Clone, Default)]
    pub(crate) struct MockWire {
        pub inbound: Arc<StdMutex<VecDeque<u8>>>,
        pub outbound: Arc<StdMutex<Vec<u8>>>,
        pub broken: Arc<AtomicBool>,
    }

    impl MockWire {
        pub fn receive(&self, bytes: &[u8]) {
            self.inbound.lock().unwrap().extend(bytes.iter().copied());
        }

        pub fn sent(&self) -> Vec<u8> {
            self.outbound.lock().unwrap().clone()
        }
    }

    struct MockLink(MockWire);

    impl SerialLink for MockLink {
        fn bytes_available(&mut self) -> io::Result<usize> {
            if self.0.broken.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            Ok(self.0.inbound.lock().unwrap().len())
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inbound = self.0.inbound.lock().unwrap();
            let n = buf.len().min(inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(n)
        }

        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.0.outbound.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }
    }

    pub(crate) struct MockOpener(pub MockWire);

    impl PortOpener for MockOpener {
        fn open(&self, _config: &PortConfiguration) -> Result<Box<dyn SerialLink>, SessionError> {
            Ok(Box::new(MockLink(self.0.clone())))
        }
    }

    struct RefusingOpener;

    impl PortOpener for RefusingOpener {
        fn open(&self, config: &PortConfiguration) -> Result<Box<dyn SerialLink>, SessionError> {
            Err(SessionError::PortUnavailable {
                port: config.port_name().to_string(),
                reason: "access denied".into(),
            })
        }
    }

    pub(crate) fn selection() -> SerialSelection {
        SerialSelection {
            last_port: "COM3".into(),
            last_baud: 115_200,
            last_parity: "None".into(),
            last_data_bits: 8,
            last_stop_bits: "1".into(),
        }
    }

    pub(crate) fn ascii_newline() -> FormattingPolicy {
        FormattingPolicy {
            display_mode: Some(DisplayMode::Ascii),
            separator: Separator::None,
            include_line_ending_bytes: false,
            line_ending: Some(LineEndingRule::Newline),
        }
    }

    fn session(wire: &MockWire) -> SerialSession {
        SerialSession::new(PortCatalog::new(FixedPorts::new(&["COM3"])), MockOpener(wire.clone()))
    }

    fn logging_session(wire: &MockWire, dir: &Path, policy: FormattingPolicy) -> (SerialSession, PathBuf) {
        let mut session = session(wire);
        session.open_port(&selection()).unwrap();
        let dest = LogDestination::new(dir, "serial.log", "COM3");
        let session_dir = session.start_logging(&dest, policy).unwrap();
        (session, session_dir)
    }

    fn logged_lines(session_dir: &Path) -> Vec<String> {
        let Some(path) = newest_file_in(session_dir).unwrap() else {
            return Vec::new();
        };
        read_file(&path)
            .unwrap()
            .lines()
            .map(|l| l.split_once("[INF] ").unwrap().1.to_string())
            .collect()
    }

    #[test]
    fn invalid_configuration_never_touches_hardware() {
        let mut session = SerialSession::new(PortCatalog::new(FixedPorts::new(&["COM3"])), RefusingOpener);
        let mut sel = selection();
        sel.last_baud = 49;
        assert!(matches!(
            session.open_port(&sel),
            Err(SessionError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            session.open_port(&selection()),
            Err(SessionError::PortUnavailable { .. })
        ));
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[test]
    fn state_transitions() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let mut session = session(&wire);
        let dest = LogDestination::new(tmp.path(), "serial.log", "COM3");

        assert!(matches!(
            session.start_logging(&dest, ascii_newline()),
            Err(SessionError::PortClosed)
        ));

        session.open_port(&selection()).unwrap();
        assert_eq!(session.status(), SessionStatus::Open);
        assert!(matches!(session.open_port(&selection()), Err(SessionError::AlreadyOpen)));

        let dir = session.start_logging(&dest, ascii_newline()).unwrap();
        assert!(dir.is_dir());
        assert_eq!(session.status(), SessionStatus::Logging);
        assert!(matches!(
            session.start_logging(&dest, ascii_newline()),
            Err(SessionError::AlreadyLogging)
        ));

        session.close().unwrap();
        assert_eq!(session.status(), SessionStatus::Closed);
        session.close().unwrap();
    }

    #[test]
    fn bad_line_ending_rule_is_rejected_at_start() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let mut session = session(&wire);
        session.open_port(&selection()).unwrap();
        let dest = LogDestination::new(tmp.path(), "serial.log", "COM3");

        let mut policy = ascii_newline();
        policy.line_ending = Some(LineEndingRule::HexValue(0x0A));
        assert!(matches!(
            session.start_logging(&dest, policy),
            Err(SessionError::UnimplementedLineEndingRule(_))
        ));

        policy.line_ending = None;
        assert!(matches!(
            session.start_logging(&dest, policy),
            Err(SessionError::InvalidConfiguration(_))
        ));
        assert_eq!(session.status(), SessionStatus::Open);
    }

    #[test]
    fn partial_lines_survive_between_arrivals() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (mut session, dir) = logging_session(&wire, tmp.path(), ascii_newline());

        wire.receive(&[0x41, 0x42, 0x0A, 0x43]);
        let report = session.on_bytes_available().unwrap();
        assert_eq!(report.bytes, 4);
        assert_eq!(report.lines, 1);
        assert_eq!(logged_lines(&dir), vec!["AB"]);

        wire.receive(b"D");
        session.on_bytes_available().unwrap();
        wire.receive(b"\nEF\n");
        session.on_bytes_available().unwrap();
        assert_eq!(logged_lines(&dir), vec!["AB", "CD", "EF"]);
    }

    #[test]
    fn unterminated_stream_still_reaches_the_log() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (mut session, dir) = logging_session(&wire, tmp.path(), ascii_newline());

        let mut drained = 0;
        for _ in 0..100 {
            wire.receive(&[b'x'; 10_000]);
            drained += session.on_bytes_available().unwrap().bytes;
        }
        assert_eq!(drained, 1_000_000);

        let lines = logged_lines(&dir);
        assert_eq!(lines.len(), 1_000_000 / MAX_LINE_BYTES);
        assert!(lines.iter().all(|l| l.len() == MAX_LINE_BYTES));

        assert!(session.flush_pending().unwrap());
        assert!(!session.flush_pending().unwrap());
        let total: usize = logged_lines(&dir).iter().map(|l| l.len()).sum();
        assert_eq!(total, 1_000_000);
    }

    #[test]
    fn flush_pending_outside_logging_is_a_no_op() {
        let wire = MockWire::default();
        let mut session = session(&wire);
        assert!(!session.flush_pending().unwrap());
        session.open_port(&selection()).unwrap();
        assert!(!session.flush_pending().unwrap());
        assert_eq!(session.port_name(), Some("COM3"));
    }

    #[test]
    fn no_bytes_means_no_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (mut session, _dir) = logging_session(&wire, tmp.path(), ascii_newline());
        assert_eq!(session.on_bytes_available().unwrap(), DrainReport::default());

        wire.receive(b"\n\n");
        assert_eq!(session.on_bytes_available().unwrap().lines, 0);
    }

    #[test]
    fn close_flushes_the_partial_line() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (mut session, dir) = logging_session(&wire, tmp.path(), ascii_newline());

        wire.receive(b"tail");
        session.on_bytes_available().unwrap();
        session.close().unwrap();
        assert_eq!(logged_lines(&dir), vec!["tail"]);
        assert!(matches!(session.on_bytes_available(), Err(SessionError::PortClosed)));
    }

    #[test]
    fn unset_display_mode_warns_once_and_drops() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let mut policy = ascii_newline();
        policy.display_mode = None;
        let (mut session, dir) = logging_session(&wire, tmp.path(), policy);

        wire.receive(b"AB\n");
        let first = session.on_bytes_available().unwrap();
        assert_eq!(first.dropped, 3);
        assert!(first.formatting_warning);

        wire.receive(b"CD\n");
        let second = session.on_bytes_available().unwrap();
        assert_eq!(second.dropped, 3);
        assert!(!second.formatting_warning);
        assert!(logged_lines(&dir).is_empty());
    }

    #[test]
    fn read_failure_closes_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (mut session, _dir) = logging_session(&wire, tmp.path(), ascii_newline());

        wire.broken.store(true, Ordering::SeqCst);
        assert!(matches!(session.on_bytes_available(), Err(SessionError::PortLost(_))));
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[test]
    fn writes_are_all_or_nothing() {
        let wire = MockWire::default();
        let mut session = session(&wire);

        assert!(matches!(session.write_to_serial("1, 2"), Err(SessionError::PortClosed)));

        session.open_port(&selection()).unwrap();
        assert!(matches!(
            session.write_to_serial("1, 2, 300"),
            Err(SessionError::InvalidSendPayload { .. })
        ));
        assert!(wire.sent().is_empty());

        assert_eq!(session.write_to_serial("252, 252, 001").unwrap(), vec![252, 252, 1]);
        assert_eq!(wire.sent(), vec![252, 252, 1]);
    }

    #[test]
    fn reopen_after_close_gets_a_fresh_session_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (mut session, first) = logging_session(&wire, tmp.path(), ascii_newline());
        session.close().unwrap();

        session.open_port(&selection()).unwrap();
        let dest = LogDestination::new(tmp.path(), "serial.log", "COM3");
        let second = session.start_logging(&dest, ascii_newline()).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn monitor_drains_until_stopped() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (session, dir) = logging_session(&wire, tmp.path(), ascii_newline());
        let shared: SharedSession = Arc::new(Mutex::new(session));

        let running = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = mpsc::unbounded_channel();
        let monitor = ArrivalMonitor::new(shared.clone(), running.clone(), tx);
        let handle = tokio::spawn(monitor.run());

        wire.receive(b"hello\nwor");
        wire.receive(b"ld\n");
        for _ in 0..200 {
            if logged_lines(&dir).len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(logged_lines(&dir), vec!["hello", "world"]);

        running.store(false, Ordering::SeqCst);
        handle.await.unwrap();
        shared.lock().await.close().unwrap();
    }

    #[tokio::test]
    async fn monitor_logs_a_prompt_once_the_port_goes_quiet() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (session, dir) = logging_session(&wire, tmp.path(), ascii_newline());
        let shared: SharedSession = Arc::new(Mutex::new(session));

        let running = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(ArrivalMonitor::new(shared.clone(), running.clone(), tx).run());

        wire.receive(b"login: ");
        for _ in 0..200 {
            if !logged_lines(&dir).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(logged_lines(&dir), vec!["login:"]);

        running.store(false, Ordering::SeqCst);
        handle.await.unwrap();
        shared.lock().await.close().unwrap();
        assert_eq!(logged_lines(&dir), vec!["login:"]);
    }

    #[tokio::test]
    async fn monitor_reports_lost_port() {
        let tmp = tempfile::tempdir().unwrap();
        let wire = MockWire::default();
        let (session, _dir) = logging_session(&wire, tmp.path(), ascii_newline());
        let shared: SharedSession = Arc::new(Mutex::new(session));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let monitor = ArrivalMonitor::new(shared.clone(), Arc::new(AtomicBool::new(true)), tx);
        wire.broken.store(true, Ordering::SeqCst);
        monitor.run().await;

        assert!(matches!(rx.recv().await, Some(SessionEvent::Ended(_))));
        assert_eq!(shared.lock().await.status(), SessionStatus::Closed);
    }
}
