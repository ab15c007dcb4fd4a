mod app;
mod config;
mod error;
mod format;
mod logging;
mod payload;
mod port_discovery;
mod serial_io;
mod settings;
mod tail;
mod time_utils;
mod ui;

use anyhow::{Context, Result};
use app::LoggerApp;
use clap::Parser;
use config::{DisplayMode, LineEndingKind, Separator, UiConfig};
use crossterm::terminal;
use logging::init_app_logging;
use port_discovery::{SystemPorts, print_ports};
use ratatui::{backend::CrosstermBackend, Terminal};
use serial_io::{SerialSession, SessionEvent};
use settings::{Settings, app_log_path};
use std::path::PathBuf;
use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::mpsc;
use ui::{run_ui, UiMessage};

/// serlogger: frames serial bytes into lines and logs them to disk
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port path/name (last used or first available if omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, 50 to 921600
    #[arg(short = 'b', long)]
    baud: Option<u32>,

    /// Parity: none, even, odd, mark or space
    #[arg(long)]
    parity: Option<String>,

    /// Data bits, 5 to 9
    #[arg(long)]
    data_bits: Option<u8>,

    /// Stop bits: 0, 1, 1.5 or 2
    #[arg(long)]
    stop_bits: Option<String>,

    /// Directory that receives one subfolder per logging session
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Log file name; the date is inserted before the extension on each daily roll
    #[arg(long)]
    base_name: Option<String>,

    /// How bytes are rendered
    #[arg(long, value_enum)]
    mode: Option<DisplayMode>,

    /// Separator written after each byte
    #[arg(long, value_enum)]
    separator: Option<Separator>,

    /// How the end of a line is detected
    #[arg(long, value_enum)]
    line_ending: Option<LineEndingKind>,

    /// Byte value for --line-ending decimal|hex
    #[arg(long)]
    line_ending_value: Option<String>,

    /// Keep CR/LF and terminator bytes in logged lines
    #[arg(long)]
    include_line_endings: bool,

    /// Settings file (TOML)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Start logging as soon as the UI is up
    #[arg(long)]
    start: bool,

    /// Just list ports and exit
    #[arg(long)]
    list: bool,

    /// More diagnostics in the application log (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Flags given on the command line win over stored settings.
    fn apply_to(&self, settings: &mut Settings) {
        let serial = &mut settings.serial;
        if let Some(p) = &self.port {
            serial.last_port = p.clone();
        }
        if let Some(b) = self.baud {
            serial.last_baud = b;
        }
        if let Some(p) = &self.parity {
            serial.last_parity = p.clone();
        }
        if let Some(d) = self.data_bits {
            serial.last_data_bits = d;
        }
        if let Some(s) = &self.stop_bits {
            serial.last_stop_bits = s.clone();
        }

        if let Some(dir) = &self.dir {
            settings.log.last_directory = dir.to_string_lossy().into_owned();
        }
        if let Some(name) = &self.base_name {
            settings.log.base_filename = name.clone();
        }

        let display = &mut settings.display;
        if let Some(mode) = self.mode {
            display.display_mode = Some(mode);
        }
        if let Some(sep) = self.separator {
            display.separator = sep;
        }
        if let Some(kind) = self.line_ending {
            display.line_ending = Some(kind);
        }
        if let Some(value) = &self.line_ending_value {
            display.line_ending_value = value.clone();
        }
        if self.include_line_endings {
            display.include_line_ending_bytes = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list {
        init_app_logging(None, args.verbose)?;
        print_ports(&SystemPorts::available()?);
        return Ok(());
    }

    init_app_logging(Some(&app_log_path()), args.verbose)?;

    let session = SerialSession::system();

    let settings_path = args.settings.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load_or_init(&settings_path, session.catalog())?;
    args.apply_to(&mut settings);
    settings.fill_defaults(session.catalog())?;

    println!(
        "Port: {} {} {}-{}-{}",
        settings.serial.last_port,
        settings.serial.last_baud,
        settings.serial.last_data_bits,
        settings.serial.last_parity,
        settings.serial.last_stop_bits
    );
    println!("Logging to: {}", settings.log.last_directory);

    // Handle Ctrl-C with immediate shutdown
    let running = Arc::new(AtomicBool::new(true));
    let shutdown_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<UiMessage>>>> =
        Arc::new(StdMutex::new(None));
    {
        let running = running.clone();
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            if let Ok(tx_guard) = shutdown_tx.lock() {
                if let Some(tx) = tx_guard.as_ref() {
                    let _ = tx.send(UiMessage::Quit);
                }
            }
        })
        .context("Failed to set Ctrl-C handler")?;
    }

    let (ui_tx, ui_rx) = mpsc::unbounded_channel::<UiMessage>();
    let (session_tx, session_rx) = mpsc::unbounded_channel::<SessionEvent>();

    if let Ok(mut guard) = shutdown_tx.lock() {
        *guard = Some(ui_tx.clone());
    }

    let mut app = LoggerApp::new(settings, settings_path, session, session_tx);

    // Setup terminal for ratatui
    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = std::io::stdout();
    crossterm::execute!(stdout, terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let ui_config = UiConfig {
        running: running.clone(),
        max_lines: 1000,
        start_immediately: args.start,
    };

    let ui_res = run_ui(&mut terminal, ui_rx, session_rx, &mut app, ui_config).await;

    // Cleanup terminal
    terminal::disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), terminal::LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    running.store(false, Ordering::SeqCst);
    app.shutdown().await;

    if let Err(e) = ui_res {
        eprintln!("\nError: {e:?}");
    }

    println!("\nStopped. Bye!");
    Ok(())
}
