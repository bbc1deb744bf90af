//! Main TUI application state and logic

use crate::interpreter::engine::Engine;
use crate::memory::heap::HeapStats;
use crate::trace::{TraceEvent, TraceKind};
use crate::ui::panes::{self, SourceScrollState};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};

/// Delay between two events in play mode
const PLAY_INTERVAL: Duration = Duration::from_millis(250);

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Trace,
    State,
    Output,
}

impl FocusedPane {
    /// Move focus to the next pane (clockwise: source -> output -> trace -> state)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Output,
            FocusedPane::Output => FocusedPane::Trace,
            FocusedPane::Trace => FocusedPane::State,
            FocusedPane::State => FocusedPane::Source,
        }
    }
}

/// The main application state
pub struct App {
    /// Engine that ran the traced match
    pub engine: Engine,

    pub source_code: String,

    /// Text the rule was matched against, if it was text
    pub input: Option<String>,

    pub matched: bool,

    /// Index of the selected trace event
    pub position: usize,

    pub focused_pane: FocusedPane,

    pub source_scroll: SourceScrollState,
    pub trace_scroll: usize,
    pub state_scroll: usize,
    pub output_scroll: usize,

    pub should_quit: bool,
    pub status_message: String,
    pub is_playing: bool,
    pub last_play_time: Instant,

    /// Heap statistics after the run
    stats: HeapStats,
}

impl App {
    pub fn new(engine: Engine, source_code: String, input: Option<String>, matched: bool) -> Self {
        let stats = engine.heap().stats();
        App {
            engine,
            source_code,
            input,
            matched,
            position: 0,
            focused_pane: FocusedPane::Trace,
            source_scroll: SourceScrollState::default(),
            trace_scroll: 0,
            state_scroll: 0,
            output_scroll: 0,
            should_quit: false,
            status_message: String::from("Ready!"),
            is_playing: false,
            last_play_time: Instant::now(),
            stats,
        }
    }

    fn events(&self) -> &[TraceEvent] {
        self.engine.trace().events()
    }

    fn current_event(&self) -> Option<&TraceEvent> {
        self.events().get(self.position)
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.is_playing && self.last_play_time.elapsed() >= PLAY_INTERVAL {
                if !self.step(1) {
                    self.is_playing = false;
                    self.status_message = "Playback complete".to_string();
                }
                self.last_play_time = Instant::now();
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(main_chunks[0]);

        // Left column: Source (top) | Output (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        // Right column: Trace (top) | Engine state (bottom)
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(columns[1]);

        let event = self.current_event().cloned();
        let line = event.as_ref().map_or(0, |e| e.location.line);
        let cursor = event.as_ref().map_or(0, |e| e.cursor);
        let failing = event.as_ref().is_some_and(|e| e.kind == TraceKind::Fail);

        panes::render_source_pane(
            frame,
            left_rows[0],
            &self.source_code,
            line,
            failing,
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );

        let output = self.engine.output();
        panes::render_terminal_pane(
            frame,
            left_rows[1],
            &output,
            self.input.as_deref(),
            cursor,
            self.focused_pane == FocusedPane::Output,
            &mut self.output_scroll,
        );

        panes::render_trace_pane(
            frame,
            right_rows[0],
            self.engine.trace().events(),
            self.position,
            self.engine.trace().dropped(),
            self.focused_pane == FocusedPane::Trace,
            &mut self.trace_scroll,
        );

        panes::render_state_pane(
            frame,
            right_rows[1],
            event.as_ref(),
            &self.stats,
            self.focused_pane == FocusedPane::State,
            &mut self.state_scroll,
        );

        panes::render_status_bar(
            frame,
            main_chunks[1],
            &self.status_message,
            self.position,
            self.events().len(),
            self.matched,
            self.is_playing,
        );
    }

    /// Move the selection by `delta` events; false if it could not move
    fn step(&mut self, delta: isize) -> bool {
        let last = self.events().len().saturating_sub(1);
        let Some(target) = self.position.checked_add_signed(delta).filter(|t| *t <= last) else {
            return false;
        };
        self.position = target;
        true
    }

    /// Select the next failure after the current event
    fn next_failure(&mut self) {
        let found = self
            .events()
            .iter()
            .enumerate()
            .skip(self.position + 1)
            .find(|(_, e)| e.kind == TraceKind::Fail)
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                self.position = i;
                self.status_message = "Jumped to next failure".to_string();
            }
            None => self.status_message = "No later failure".to_string(),
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char(c @ '1'..='9') => {
                self.is_playing = false;
                let n = c.to_digit(10).unwrap_or(1) as usize;
                let stepped = (0..n).take_while(|_| self.step(1)).count();
                self.status_message = format!("Stepped forward {} event(s)", stepped);
            }
            KeyCode::Char('f') => {
                self.is_playing = false;
                self.next_failure();
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Left => {
                self.is_playing = false;
                if !self.step(-1) {
                    self.status_message = "At first event".to_string();
                }
            }
            KeyCode::Right => {
                self.is_playing = false;
                if !self.step(1) {
                    self.status_message = "At last event".to_string();
                }
            }
            KeyCode::Up => self.scroll(-1),
            KeyCode::Down => self.scroll(1),
            KeyCode::Char(' ') => {
                self.is_playing = !self.is_playing;
                self.last_play_time = Instant::now();
                self.status_message = if self.is_playing { "Playing..." } else { "Paused" }.to_string();
            }
            KeyCode::Enter => {
                self.is_playing = false;
                self.position = self.events().len().saturating_sub(1);
                self.status_message = "Jumped to end".to_string();
            }
            KeyCode::Backspace => {
                self.is_playing = false;
                self.position = 0;
                self.status_message = "Jumped to start".to_string();
            }
            _ => {}
        }
    }

    fn scroll(&mut self, delta: isize) {
        match self.focused_pane {
            FocusedPane::Source => {
                // Scrolling down moves the current line up visually
                if let Some(row) = self.source_scroll.target_line_row {
                    self.source_scroll.target_line_row = row.checked_add_signed(-delta).or(Some(0));
                }
            }
            FocusedPane::Trace => {
                self.is_playing = false;
                self.step(delta);
            }
            FocusedPane::State => self.state_scroll = self.state_scroll.saturating_add_signed(delta),
            FocusedPane::Output => self.output_scroll = self.output_scroll.saturating_add_signed(delta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::config::EngineConfig;

    fn traced_app() -> App {
        let config = EngineConfig {
            trace: true,
            ..EngineConfig::default()
        };
        let mut engine = Engine::from_source(r#"rule R = "a" "b" | "ac";"#, config).unwrap();
        let matched = engine.match_text("R", "ac").unwrap().is_match();
        App::new(engine, String::new(), Some("ac".to_string()), matched)
    }

    #[test]
    fn test_next_failure_selects_a_failure() {
        let mut app = traced_app();
        assert!(app.matched);
        app.next_failure();
        assert_eq!(app.current_event().map(|e| e.kind), Some(TraceKind::Fail));
    }

    #[test]
    fn test_stepping_stays_in_bounds() {
        let mut app = traced_app();
        assert!(!app.step(-1));
        app.handle_key_event(KeyEvent::from(KeyCode::Enter));
        assert_eq!(app.position, app.events().len() - 1);
        assert!(!app.step(1));
        app.handle_key_event(KeyEvent::from(KeyCode::Backspace));
        assert_eq!(app.position, 0);
    }
}
