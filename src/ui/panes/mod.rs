//! TUI pane rendering modules
//!
//! # Pane Modules
//!
//! - [`source`]: Program source with highlighting and the lexeme of the
//!   selected event
//! - [`trace`]: The recorded lexeme events, one per line
//! - [`state`]: Engine state at the selected event and final heap statistics
//! - [`terminal`]: `print` output and the matched input with the cursor
//! - [`status`]: Status bar with keybindings and match outcome
//!
//! Each pane module exports a `render_*` function that draws from borrowed
//! data and a scroll offset owned by the [`App`](crate::ui::App).

pub mod source;
pub mod state;
pub mod status;
pub mod terminal;
pub mod trace;

pub use source::{render_source_pane, SourceScrollState};
pub use state::render_state_pane;
pub use status::render_status_bar;
pub use terminal::render_terminal_pane;
pub use trace::render_trace_pane;

use crate::ui::theme::DEFAULT_THEME;
use ratatui::style::{Modifier, Style};

/// Border style of a pane
pub(crate) fn border_style(is_focused: bool) -> Style {
    if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    }
}

/// Clamp a scroll offset so that the last page stays full
pub(crate) fn clamp_scroll(offset: &mut usize, total: usize, visible: usize) {
    if total > visible {
        *offset = (*offset).min(total - visible);
    } else {
        *offset = 0;
    }
}
