//! History screen - the popover listing recent copies.

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use ratatui_garnish::{shadow::HalfShadow, GarnishableStatefulWidget, GarnishableWidget, Padding};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::ClipboardEntry;
use crate::services::{HistoryStore, LoginItem, RecordOutcome};

use super::{Screen, ScreenAction};

const ACCENT: Color = Color::Rgb(155, 212, 228);
const MUTED: Color = Color::DarkGray;

/// Popover screen: search bar, history list, footer.
pub struct HistoryScreen {
    history: HistoryStore,
    login_item: Box<dyn LoginItem + Send>,
    config: Arc<Config>,

    // UI state
    list_state: ListState,
    query: String,
    searching: bool,
    login_enabled: bool,
}

impl HistoryScreen {
    /// Create a new history screen.
    pub fn new(
        history: HistoryStore,
        login_item: Box<dyn LoginItem + Send>,
        config: Arc<Config>,
    ) -> Self {
        let login_enabled = login_item.is_enabled();
        let mut screen = Self {
            history,
            login_item,
            config,
            list_state: ListState::default(),
            query: String::new(),
            searching: false,
            login_enabled,
        };
        screen.clamp_selection();
        screen
    }

    /// Feed a pasteboard change into the history.
    pub fn record_copy(&mut self, content: &str) -> Option<String> {
        let status = match self.history.record_copy(content) {
            RecordOutcome::Ignored => None,
            RecordOutcome::Promoted => Some("Moved to top".to_string()),
            RecordOutcome::Inserted { .. } => Some(format!(
                "Saved {}/{}",
                self.history.len(),
                self.history.capacity()
            )),
        };
        self.clamp_selection();
        status
    }

    /// Entries matching the current search.
    fn visible(&self) -> Vec<&ClipboardEntry> {
        self.history.filter(&self.query)
    }

    /// The highlighted row, resolved against the filtered list.
    fn selected_entry(&self) -> Option<ClipboardEntry> {
        let visible = self.visible();
        self.list_state
            .selected()
            .and_then(|i| visible.get(i))
            .map(|e| (*e).clone())
    }

    /// Keep the selection inside the visible list.
    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        let selected = match self.list_state.selected() {
            _ if len == 0 => None,
            Some(i) => Some(i.min(len - 1)),
            None => Some(0),
        };
        self.list_state.select(selected);
    }

    fn move_up(&mut self) {
        let len = self.visible().len();
        if let Some(selected) = self.list_state.selected() {
            let new_index = if selected == 0 {
                len.saturating_sub(1)
            } else {
                selected - 1
            };
            self.list_state.select(Some(new_index));
        }
    }

    fn move_down(&mut self) {
        let len = self.visible().len();
        if let Some(selected) = self.list_state.selected() {
            let new_index = if selected + 1 >= len { 0 } else { selected + 1 };
            self.list_state.select(Some(new_index));
        }
    }

    fn copy_selected(&mut self) -> ScreenAction {
        match self.selected_entry() {
            Some(entry) => {
                self.history.copy_out(&entry.content);
                ScreenAction::StatusMessage(format!("Copied: {}", entry.preview(30)))
            }
            None => ScreenAction::None,
        }
    }

    fn delete_selected(&mut self) -> ScreenAction {
        match self.selected_entry() {
            Some(entry) => {
                self.history.delete_ids(&[entry.id]);
                self.clamp_selection();
                ScreenAction::StatusMessage("Deleted".to_string())
            }
            None => ScreenAction::None,
        }
    }

    fn clear_all(&mut self) -> ScreenAction {
        self.history.clear_all();
        self.clamp_selection();
        ScreenAction::StatusMessage("History cleared".to_string())
    }

    /// Flip launch-at-login, keeping the old state if the change fails.
    fn toggle_login_item(&mut self) -> ScreenAction {
        let target = !self.login_enabled;
        match self.login_item.enable(target) {
            Ok(()) => {
                self.login_enabled = target;
                info!(enabled = target, "Login item updated");
                ScreenAction::StatusMessage(if target {
                    "Launch at login enabled".to_string()
                } else {
                    "Launch at login disabled".to_string()
                })
            }
            Err(e) => {
                warn!("Login item update failed: {}", e);
                ScreenAction::StatusMessage(format!("Error: {}", e))
            }
        }
    }

    fn set_query(&mut self, query: String) {
        self.query = query;
        self.list_state.select(Some(0));
        self.clamp_selection();
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> ScreenAction {
        match key.code {
            KeyCode::Esc => {
                self.searching = false;
                self.set_query(String::new());
            }
            KeyCode::Enter => self.searching = false,
            KeyCode::Backspace => {
                let mut query = self.query.clone();
                query.pop();
                self.set_query(query);
            }
            KeyCode::Up => self.move_up(),
            KeyCode::Down => self.move_down(),
            KeyCode::Char(c) => {
                let mut query = self.query.clone();
                query.push(c);
                self.set_query(query);
            }
            _ => {}
        }
        ScreenAction::None
    }

    fn draw_search(&self, f: &mut Frame, area: Rect) {
        let text = if self.query.is_empty() && !self.searching {
            Line::from(Span::styled("/ to search", Style::default().fg(MUTED)))
        } else {
            let cursor = if self.searching { "▏" } else { "" };
            Line::from(vec![
                Span::raw(self.query.clone()),
                Span::styled(cursor, Style::default().fg(ACCENT)),
            ])
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title("Search")
            .border_style(if self.searching {
                Style::default().fg(ACCENT)
            } else {
                Style::default().fg(MUTED)
            });

        let search = Paragraph::new(text).block(block);
        f.render_widget(search.garnish(Padding::horizontal(1)), area);
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect) {
        let login = if self.login_enabled { "on" } else { "off" };
        let footer = Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {}/{} items", self.history.len(), self.history.capacity()),
                Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" │ "),
            Span::styled(format!("launch at login: {}", login), Style::default().fg(Color::Gray)),
        ]));
        f.render_widget(footer, area);
    }
}

#[async_trait]
impl Screen for HistoryScreen {
    fn draw(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Search bar
                Constraint::Min(0),    // History list
                Constraint::Length(1), // Footer
            ])
            .split(area);

        self.draw_search(f, chunks[0]);

        let date_format = self.config.display.date_format.clone();
        let preview_chars = self.config.display.preview_chars;
        let visible = self.visible();

        if visible.is_empty() {
            let message = if self.history.is_empty() {
                "Clipboard history is empty\n\nCopy some text and it will show up here"
            } else {
                "No matches"
            };
            let empty = Paragraph::new(message)
                .block(Block::default().borders(Borders::ALL).title("History"))
                .style(Style::default().fg(MUTED))
                .alignment(ratatui::layout::Alignment::Center);
            f.render_widget(empty, chunks[1]);
            self.draw_footer(f, chunks[2]);
            return;
        }

        let items: Vec<ListItem> = visible
            .iter()
            .map(|e| {
                ListItem::new(vec![
                    Line::from(Span::raw(e.preview(preview_chars))),
                    Line::from(Span::styled(
                        e.formatted_time(&date_format),
                        Style::default().fg(MUTED),
                    )),
                ])
            })
            .collect();
        let count = items.len();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("History ({})", count))
                    .border_style(Style::default().fg(ACCENT)),
            )
            .highlight_style(Style::default().bg(MUTED).add_modifier(Modifier::BOLD))
            .highlight_symbol("► ");

        let garnished = GarnishableStatefulWidget::garnish(list, HalfShadow::default());
        f.render_stateful_widget(garnished, chunks[1], &mut self.list_state);

        self.draw_footer(f, chunks[2]);
    }

    async fn handle_key(&mut self, key: KeyEvent) -> ScreenAction {
        if self.searching {
            return self.handle_search_key(key);
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('x')) => self.clear_all(),
            (KeyModifiers::CONTROL, KeyCode::Char('l')) => self.toggle_login_item(),
            (_, KeyCode::Char('q')) => ScreenAction::Quit,
            (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                self.move_up();
                ScreenAction::None
            }
            (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                self.move_down();
                ScreenAction::None
            }
            (_, KeyCode::Enter) | (_, KeyCode::Char('y')) => self.copy_selected(),
            (_, KeyCode::Delete) | (_, KeyCode::Char('d')) => self.delete_selected(),
            (_, KeyCode::Char('/')) => {
                self.searching = true;
                ScreenAction::None
            }
            (_, KeyCode::Esc) => {
                self.set_query(String::new());
                ScreenAction::None
            }
            _ => ScreenAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExternalServiceError;
    use crate::services::pasteboard::{MemoryPasteboard, Pasteboard};
    use crate::services::MemoryStore;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeLoginItem {
        enabled: AtomicBool,
        fail: bool,
    }

    impl LoginItem for FakeLoginItem {
        fn enable(&self, enabled: bool) -> Result<(), ExternalServiceError> {
            if self.fail {
                return Err(ExternalServiceError::Launchctl {
                    status: 5,
                    output: "Input/output error".to_string(),
                });
            }
            self.enabled.store(enabled, Ordering::SeqCst);
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }
    }

    fn screen_with(pasteboard: Arc<MemoryPasteboard>, fail_login: bool) -> HistoryScreen {
        let history = HistoryStore::new(Box::new(MemoryStore::new()), pasteboard, 10);
        let login = FakeLoginItem {
            enabled: AtomicBool::new(false),
            fail: fail_login,
        };
        HistoryScreen::new(history, Box::new(login), Arc::new(Config::default()))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    async fn type_query(screen: &mut HistoryScreen, text: &str) {
        screen.handle_key(key(KeyCode::Char('/'))).await;
        for c in text.chars() {
            screen.handle_key(key(KeyCode::Char(c))).await;
        }
        screen.handle_key(key(KeyCode::Enter)).await;
    }

    #[tokio::test]
    async fn test_enter_copies_selected_entry() {
        let pb = Arc::new(MemoryPasteboard::new());
        let mut screen = screen_with(pb.clone(), false);
        screen.record_copy("first");
        screen.record_copy("second");

        screen.handle_key(key(KeyCode::Down)).await;
        let action = screen.handle_key(key(KeyCode::Enter)).await;

        assert_eq!(action, ScreenAction::StatusMessage("Copied: first".to_string()));
        assert_eq!(pb.read_text().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_delete_uses_filtered_row() {
        let mut screen = screen_with(Arc::new(MemoryPasteboard::new()), false);
        for c in ["Apple pie", "banana", "apricot"] {
            screen.record_copy(c);
        }

        type_query(&mut screen, "APPLE").await;
        screen.handle_key(key(KeyCode::Char('d'))).await;

        let left: Vec<&str> = screen.history.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(left, vec!["apricot", "banana"]);
    }

    #[tokio::test]
    async fn test_q_types_into_search() {
        let mut screen = screen_with(Arc::new(MemoryPasteboard::new()), false);
        screen.handle_key(key(KeyCode::Char('/'))).await;
        assert_eq!(screen.handle_key(key(KeyCode::Char('q'))).await, ScreenAction::None);
        assert_eq!(screen.query, "q");

        screen.handle_key(key(KeyCode::Esc)).await;
        assert!(screen.query.is_empty());
        assert_eq!(screen.handle_key(key(KeyCode::Char('q'))).await, ScreenAction::Quit);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let mut screen = screen_with(Arc::new(MemoryPasteboard::new()), false);
        screen.record_copy("a");
        screen.handle_key(ctrl('x')).await;
        assert!(screen.history.is_empty());
        assert_eq!(screen.list_state.selected(), None);
    }

    #[tokio::test]
    async fn test_login_toggle_reverts_on_failure() {
        let mut ok = screen_with(Arc::new(MemoryPasteboard::new()), false);
        ok.handle_key(ctrl('l')).await;
        assert!(ok.login_enabled);

        let mut failing = screen_with(Arc::new(MemoryPasteboard::new()), true);
        let action = failing.handle_key(ctrl('l')).await;
        assert!(!failing.login_enabled);
        match action {
            ScreenAction::StatusMessage(msg) => assert!(msg.starts_with("Error:")),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_draw_shows_entries_and_count() {
        let mut screen = screen_with(Arc::new(MemoryPasteboard::new()), false);
        screen.record_copy("hello kimchi");

        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal
            .draw(|f| {
                let area = f.area();
                screen.draw(f, area);
            })
            .unwrap();

        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("hello kimchi"));
        assert!(rendered.contains("1/10 items"));
    }
}
