use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use super::app_state::AppState;

const SEND_HINT: &str = "Send: byte values 0-255, e.g. 252, 252, 001 (Enter sends, Esc quits)";

pub fn draw_ui(f: &mut Frame, app_state: &mut AppState) {
    let [log_area, send_area, status_area] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3), Constraint::Length(1)])
        .areas(f.area());

    draw_log(f, app_state, log_area);
    draw_send_box(f, app_state, send_area);
    draw_status(f, app_state, status_area);
}

fn draw_log(f: &mut Frame, app_state: &mut AppState, area: Rect) {
    let follow = if app_state.auto_scroll { "following" } else { "paused, Ctrl+A follows" };
    let title = format!("Log file ({} lines, {follow})", app_state.output_lines.len());

    let items: Vec<ListItem> = app_state
        .output_lines
        .iter()
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let state = if app_state.auto_scroll {
        &mut app_state.auto_scroll_state
    } else {
        &mut app_state.list_state
    };
    f.render_stateful_widget(list, area, state);
}

fn draw_send_box(f: &mut Frame, app_state: &AppState, area: Rect) {
    let input = Paragraph::new(app_state.input_line.as_str())
        .block(Block::default().borders(Borders::ALL).title(SEND_HINT))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(input, area);

    // inside the border
    f.set_cursor_position((area.x + 1 + app_state.input_line.chars().count() as u16, area.y + 1));
}

fn draw_status(f: &mut Frame, app_state: &AppState, area: Rect) {
    let line = match &app_state.notice {
        Some(notice) => Line::styled(notice.as_str(), Style::default().fg(Color::Black).bg(Color::Yellow)),
        None => Line::styled(
            app_state.status_line.as_str(),
            Style::default().fg(Color::Black).bg(Color::Cyan),
        ),
    };
    f.render_widget(Paragraph::new(line), area);
}
