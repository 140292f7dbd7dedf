//! Main application state and event loop.

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::screens::{HistoryScreen, Screen, ScreenAction};
use crate::services::{HistoryStore, LoginItem, Pasteboard, PasteboardWatcher};

/// Application state.
pub struct App {
    should_quit: bool,
    config: Arc<Config>,
    pasteboard: Arc<dyn Pasteboard>,

    // Screens
    history_screen: HistoryScreen,

    // Status bar info
    status_message: String,
}

impl App {
    /// Create a new application instance around an already loaded history.
    pub fn new(
        config: Arc<Config>,
        history: HistoryStore,
        pasteboard: Arc<dyn Pasteboard>,
        login_item: Box<dyn LoginItem + Send>,
    ) -> Self {
        let count = history.len();
        let history_screen = HistoryScreen::new(history, login_item, config.clone());

        Self {
            should_quit: false,
            config,
            pasteboard,
            history_screen,
            status_message: format!("{} snippets loaded", count),
        }
    }

    /// Run the application.
    pub async fn run(&mut self) -> Result<()> {
        // Start watching before the terminal takes over
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = PasteboardWatcher::new(self.pasteboard.clone())
            .spawn(self.config.poll_interval(), tx);

        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Main event loop
        let result = self.event_loop(&mut terminal, &mut rx).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;

        drop(rx);
        watcher.abort();

        result
    }

    /// Main event loop.
    ///
    /// Pasteboard changes are applied here, between key events, so every
    /// history mutation happens on this one task.
    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        changes: &mut mpsc::UnboundedReceiver<String>,
    ) -> Result<()> {
        loop {
            while let Ok(text) = changes.try_recv() {
                if let Some(msg) = self.history_screen.record_copy(&text) {
                    self.status_message = msg;
                }
            }

            // Draw UI
            terminal.draw(|f| self.draw(f))?;

            // Poll for events with timeout
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    match (key.modifiers, key.code) {
                        (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                            self.should_quit = true;
                        }
                        _ => match self.history_screen.handle_key(key).await {
                            ScreenAction::None => {}
                            ScreenAction::StatusMessage(msg) => self.status_message = msg,
                            ScreenAction::Quit => self.should_quit = true,
                        },
                    }
                }
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    /// Draw the UI.
    fn draw(&mut self, f: &mut ratatui::Frame) {
        use ratatui::layout::{Constraint, Direction, Layout};
        use ratatui::style::{Color, Style};
        use ratatui::text::{Line, Span};
        use ratatui::widgets::Paragraph;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),    // Main content
                Constraint::Length(1), // Status bar
            ])
            .split(f.area());

        self.history_screen.draw(f, chunks[0]);

        let hint = |key: &'static str, label: &'static str| {
            vec![
                Span::raw(" │ "),
                Span::styled(key, Style::default().fg(Color::DarkGray)),
                Span::styled(label, Style::default().fg(Color::Gray)),
            ]
        };

        let mut spans = vec![
            Span::raw(" "),
            Span::styled(self.status_message.clone(), Style::default().fg(Color::Gray)),
        ];
        spans.extend(hint("Enter", " Copy"));
        spans.extend(hint("d", " Delete"));
        spans.extend(hint("/", " Search"));
        spans.extend(hint("^X", " Clear"));
        spans.extend(hint("^L", " Login"));
        spans.extend(hint("q", " Quit"));

        f.render_widget(Paragraph::new(Line::from(spans)), chunks[1]);
    }
}
