pub mod app_state;
pub mod rendering;

pub use app_state::AppState;
pub use rendering::draw_ui;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{backend::Backend, Terminal};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::app::LoggerApp;
use crate::config::UiConfig;
use crate::serial_io::{SessionEvent, SessionStatus};

#[derive(Debug)]
pub enum UiMessage {
    Quit,
}

pub async fn run_ui<B: Backend>(
    terminal: &mut Terminal<B>,
    mut ui_rx: mpsc::UnboundedReceiver<UiMessage>,
    mut session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    app: &mut LoggerApp,
    ui_config: UiConfig,
) -> Result<()> {
    let mut app_state = AppState::new();
    let mut visible = app.visible_log();

    if ui_config.start_immediately {
        start_logging(app, &mut app_state).await;
    }

    while ui_config.running.load(Ordering::SeqCst) && !app_state.should_quit {
        tokio::select! {
            msg = ui_rx.recv() => {
                if let Some(UiMessage::Quit) = msg {
                    app_state.quit();
                    break;
                }
            }

            event = session_rx.recv() => {
                match event {
                    Some(SessionEvent::Warning(text)) => app_state.set_notice(text),
                    Some(SessionEvent::Ended(reason)) => {
                        app.on_session_ended().await;
                        app_state.set_notice(format!("Logging stopped: {reason}"));
                    }
                    None => {}
                }
            }

            changed = visible.changed() => {
                if changed.is_ok() {
                    let text = visible.borrow_and_update().clone();
                    app_state.set_log_text(&text, ui_config.max_lines);
                }
            }

            // Keyboard input - async wrapper for crossterm events
            key_result = async {
                if event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    event::read()
                } else {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Err(std::io::Error::new(std::io::ErrorKind::WouldBlock, "no input"))
                }
            } => {
                if let Ok(Event::Key(k)) = key_result
                    && k.kind == KeyEventKind::Press {
                    handle_key_event(k, &mut app_state, app).await;
                }
            }
        }

        app_state.set_status(status_line(app).await);

        if app_state.needs_render {
            terminal.draw(|f| draw_ui(f, &mut app_state))?;
            app_state.mark_rendered();
        }
    }

    ui_config.running.store(false, Ordering::SeqCst);
    Ok(())
}

async fn status_line(app: &LoggerApp) -> String {
    let serial = &app.settings().serial;
    let state = match (app.status().await, app.session_dir()) {
        (SessionStatus::Logging, Some(dir)) => format!("LOGGING -> {}", dir.display()),
        (SessionStatus::Logging, None) => "LOGGING".to_string(),
        (SessionStatus::Open, _) => "port open".to_string(),
        (SessionStatus::Closed, _) => "stopped".to_string(),
    };
    format!(
        " {} {} {}-{}-{} | {} | ports: {} | F2 start  F3 stop  F5 rescan  F6 defaults",
        serial.last_port,
        serial.last_baud,
        serial.last_data_bits,
        serial.last_parity,
        serial.last_stop_bits,
        state,
        app.ports().join(", ")
    )
}

async fn start_logging(app: &mut LoggerApp, app_state: &mut AppState) {
    match app.start_logging().await {
        Ok(()) => app_state.clear_notice(),
        Err(e) => app_state.set_notice(format!("Cannot start logging: {e:#}")),
    }
}

async fn handle_key_event(
    key: crossterm::event::KeyEvent,
    app_state: &mut AppState,
    app: &mut LoggerApp,
) {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) && (c == 'c' || c == 'd') => {
            app_state.quit();
        }
        KeyCode::Esc => {
            app_state.quit();
        }
        KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app_state.enable_auto_scroll();
        }
        KeyCode::F(2) => start_logging(app, app_state).await,
        KeyCode::F(3) => match app.stop_logging().await {
            Ok(()) => app_state.set_notice("Logging stopped"),
            Err(e) => app_state.set_notice(format!("Stop logging: {e:#}")),
        },
        KeyCode::F(5) => {
            app.rescan_ports().await;
            app_state.set_notice(format!("Ports: {}", app.ports().join(", ")));
        }
        KeyCode::F(6) => match app.load_defaults().await {
            Ok(()) => app_state.set_notice("Defaults loaded"),
            Err(e) => app_state.set_notice(format!("{e:#}")),
        },
        KeyCode::Char(c) => {
            app_state.update_input(c);
        }
        KeyCode::Enter => {
            let input = app_state.clear_input();
            if !input.trim().is_empty() {
                match app.send_bytes(&input).await {
                    Ok(sent) => app_state.set_notice(format!("Sent: {sent}")),
                    Err(e) => app_state.set_notice(format!("{e:#}")),
                }
            }
        }
        KeyCode::Backspace => {
            app_state.backspace_input();
        }
        KeyCode::Up => {
            app_state.scroll_up();
        }
        KeyCode::Down => {
            app_state.scroll_down();
        }
        KeyCode::PageUp => {
            app_state.scroll_page_up(10);
        }
        KeyCode::PageDown => {
            app_state.scroll_page_down(10);
        }
        KeyCode::Home => {
            app_state.scroll_to_home();
        }
        KeyCode::End => {
            app_state.scroll_to_bottom();
        }
        _ => {}
    }
}
