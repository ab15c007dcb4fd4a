use ratatui::widgets::ListState;

pub struct AppState {
    pub input_line: String,
    pub output_lines: Vec<String>,
    pub list_state: ListState,
    pub auto_scroll_state: ListState,
    pub status_line: String,
    pub notice: Option<String>,
    pub should_quit: bool,
    pub auto_scroll: bool,
    pub needs_render: bool, // Optimization: only render when needed
}

impl AppState {
    pub fn new() -> Self {
        Self {
            input_line: String::new(),
            output_lines: Vec::with_capacity(1000),
            list_state: ListState::default(),
            auto_scroll_state: ListState::default(),
            status_line: String::new(),
            notice: None,
            should_quit: false,
            auto_scroll: true,
            needs_render: true,
        }
    }

    /// Replace the view with the tail of the current log text.
    pub fn set_log_text(&mut self, text: &str, max_lines: usize) {
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(max_lines);
        self.output_lines = lines[skip..].iter().map(|l| l.to_string()).collect();

        if self.output_lines.is_empty() {
            self.auto_scroll_state.select(None);
            self.list_state.select(None);
        } else {
            self.auto_scroll_state
                .select(Some(self.output_lines.len() - 1));
            if let Some(selected) = self.list_state.selected() {
                self.list_state
                    .select(Some(selected.min(self.output_lines.len() - 1)));
            }
        }
        self.needs_render = true;
    }

    pub fn set_status(&mut self, status: String) {
        if self.status_line != status {
            self.status_line = status;
            self.needs_render = true;
        }
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
        self.needs_render = true;
    }

    pub fn clear_notice(&mut self) {
        if self.notice.take().is_some() {
            self.needs_render = true;
        }
    }

    /// Move the manual selection by `delta` lines, clamped to the view.
    /// Any manual move stops following the log.
    fn scroll_by(&mut self, delta: isize) {
        let Some(last) = self.output_lines.len().checked_sub(1) else {
            return;
        };
        self.auto_scroll = false;
        let from = self
            .list_state
            .selected()
            .unwrap_or(if delta < 0 { last } else { 0 });
        let to = from.saturating_add_signed(delta).min(last);
        self.list_state.select(Some(to));
        self.needs_render = true;
    }

    pub fn scroll_up(&mut self) {
        self.scroll_by(-1);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_by(1);
    }

    pub fn scroll_page_up(&mut self, page_size: usize) {
        self.scroll_by(-(page_size as isize));
    }

    pub fn scroll_page_down(&mut self, page_size: usize) {
        self.scroll_by(page_size as isize);
    }

    pub fn scroll_to_home(&mut self) {
        self.scroll_by(isize::MIN);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_by(isize::MAX);
    }

    pub fn enable_auto_scroll(&mut self) {
        self.auto_scroll = true;
        self.list_state.select(None);
        self.needs_render = true;
    }

    pub fn update_input(&mut self, c: char) {
        self.input_line.push(c);
        self.needs_render = true;
    }

    pub fn backspace_input(&mut self) {
        if self.input_line.pop().is_some() {
            self.needs_render = true;
        }
    }

    pub fn clear_input(&mut self) -> String {
        let input = std::mem::take(&mut self.input_line);
        if !input.is_empty() {
            self.needs_render = true;
        }
        input
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
        self.needs_render = true;
    }

    pub fn mark_rendered(&mut self) {
        self.needs_render = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_text_keeps_only_the_tail() {
        let mut state = AppState::new();
        let text: String = (0..10).map(|i| format!("line {i}\n")).collect();
        state.set_log_text(&text, 3);
        assert_eq!(state.output_lines, vec!["line 7", "line 8", "line 9"]);
        assert_eq!(state.auto_scroll_state.selected(), Some(2));
    }

    #[test]
    fn manual_selection_is_clamped_when_the_log_shrinks() {
        let mut state = AppState::new();
        state.set_log_text("a\nb\nc\nd\n", 100);
        state.scroll_to_bottom();
        assert_eq!(state.list_state.selected(), Some(3));

        state.set_log_text("x\n", 100);
        assert_eq!(state.list_state.selected(), Some(0));
        state.set_log_text("", 100);
        assert_eq!(state.list_state.selected(), None);
    }

    #[test]
    fn manual_scrolling_stays_in_bounds() {
        let mut state = AppState::new();
        state.scroll_up();
        assert!(state.auto_scroll);

        state.set_log_text("a\nb\nc\nd\ne\n", 100);
        state.scroll_up();
        assert!(!state.auto_scroll);
        assert_eq!(state.list_state.selected(), Some(3));
        state.scroll_page_up(10);
        assert_eq!(state.list_state.selected(), Some(0));
        state.scroll_up();
        assert_eq!(state.list_state.selected(), Some(0));
        state.scroll_page_down(2);
        assert_eq!(state.list_state.selected(), Some(2));
        state.scroll_to_bottom();
        assert_eq!(state.list_state.selected(), Some(4));
        state.scroll_down();
        assert_eq!(state.list_state.selected(), Some(4));
        state.scroll_to_home();
        assert_eq!(state.list_state.selected(), Some(0));

        state.enable_auto_scroll();
        assert!(state.auto_scroll && state.list_state.selected().is_none());
    }

    #[test]
    fn notices_trigger_renders() {
        let mut state = AppState::new();
        state.mark_rendered();
        state.set_notice("cannot send");
        assert!(state.needs_render);
        state.mark_rendered();
        state.clear_notice();
        assert!(state.needs_render && state.notice.is_none());
    }
}
