// Match tracing and captured program output

use crate::parser::ast::{NodeId, SourceLocation};

/// Captures `print` output
#[derive(Debug, Clone, Default)]
pub struct Terminal {
    pub lines: Vec<TerminalLine>,
}

impl Terminal {
    pub fn new() -> Self {
        Terminal { lines: Vec::new() }
    }

    /// Print one line
    pub fn print(&mut self, text: String, location: SourceLocation) {
        self.lines.push(TerminalLine { text, location });
    }

    /// Get all lines as a vector of strings
    pub fn get_output(&self) -> Vec<String> {
        self.lines
            .iter()
            .flat_map(|tl| tl.text.split('\n').map(|s| s.to_string()))
            .collect()
    }
}

/// A line of terminal output with source location tracking
#[derive(Debug, Clone)]
pub struct TerminalLine {
    pub text: String,
    pub location: SourceLocation,
}

/// What happened to a lexeme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// Evaluation started
    Enter,
    /// The lexeme matched
    Match,
    /// The lexeme failed; the engine starts unwinding
    Fail,
    /// A choice point was restored and its owner resumed
    Backtrack,
}

impl TraceKind {
    pub fn label(self) -> &'static str {
        match self {
            TraceKind::Enter => "enter",
            TraceKind::Match => "match",
            TraceKind::Fail => "fail",
            TraceKind::Backtrack => "backtrack",
        }
    }
}

/// One recorded lexeme event
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// Trampoline step at which the event happened
    pub step: u64,
    pub kind: TraceKind,
    pub node: NodeId,
    pub tag: &'static str,
    pub location: SourceLocation,
    /// Reader position after the event
    pub cursor: usize,
    /// Frame stack depth
    pub depth: usize,
    /// Heap generation count
    pub generations: usize,
    /// Live choice points
    pub choices: usize,
}

/// Bounded history of trace events
#[derive(Debug, Clone)]
pub struct TraceLog {
    events: Vec<TraceEvent>,
    limit: usize,
    dropped: usize,
}

impl TraceLog {
    pub fn new(limit: usize) -> Self {
        TraceLog {
            events: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Add an event; events past the limit are counted but not kept
    pub fn push(&mut self, event: TraceEvent) {
        if self.events.len() >= self.limit {
            self.dropped += 1;
            return;
        }
        self.events.push(event);
    }

    /// Get an event by index
    pub fn get(&self, index: usize) -> Option<&TraceEvent> {
        self.events.get(index)
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Get the number of recorded events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events that did not fit under the limit
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(step: u64) -> TraceEvent {
        TraceEvent {
            step,
            kind: TraceKind::Enter,
            node: 0,
            tag: "text",
            location: SourceLocation::new(1, 1),
            cursor: 0,
            depth: 1,
            generations: 1,
            choices: 0,
        }
    }

    #[test]
    fn test_limit_drops_late_events() {
        let mut log = TraceLog::new(2);
        for step in 0..5 {
            log.push(event(step));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 3);
        assert_eq!(log.get(1).map(|e| e.step), Some(1));
    }

    #[test]
    fn test_terminal_splits_embedded_newlines() {
        let mut terminal = Terminal::new();
        terminal.print("a\nb".to_string(), SourceLocation::new(1, 1));
        terminal.print("c".to_string(), SourceLocation::new(2, 1));
        assert_eq!(terminal.get_output(), vec!["a", "b", "c"]);
    }
}
