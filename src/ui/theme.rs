//! Colors shared by the trace viewer panes

use ratatui::style::Color;

pub struct Theme {
    pub fg: Color,
    pub primary: Color,
    pub secondary: Color,
    pub comment: Color,
    pub success: Color,
    pub error: Color,
    pub keyword: Color,
    pub string: Color,
    pub number: Color,
    pub function: Color,
    /// Pattern operators in the source pane
    pub pattern: Color,
    /// The unit under the reader cursor
    pub cursor: Color,
    pub border_focused: Color,
    pub border_normal: Color,
    pub current_line_bg: Color,
}

impl Theme {
    /// Lexeme event colors in the trace pane
    pub fn event(&self, kind: crate::trace::TraceKind) -> Color {
        use crate::trace::TraceKind;
        match kind {
            TraceKind::Enter => self.primary,
            TraceKind::Match => self.success,
            TraceKind::Fail => self.error,
            TraceKind::Backtrack => self.secondary,
        }
    }
}

// Catppuccin mocha
pub const DEFAULT_THEME: Theme = Theme {
    fg: Color::Rgb(205, 214, 244),
    primary: Color::Rgb(137, 180, 250),
    secondary: Color::Rgb(250, 179, 135),
    comment: Color::Rgb(108, 112, 134),
    success: Color::Rgb(166, 227, 161),
    error: Color::Rgb(243, 139, 168),
    keyword: Color::Rgb(203, 166, 247),
    string: Color::Rgb(250, 179, 135),
    number: Color::Rgb(250, 179, 135),
    function: Color::Rgb(249, 226, 175),
    pattern: Color::Rgb(148, 226, 213),
    cursor: Color::Rgb(245, 194, 231),
    border_focused: Color::Rgb(249, 226, 175),
    border_normal: Color::Rgb(108, 112, 134),
    current_line_bg: Color::Rgb(49, 50, 68),
};
