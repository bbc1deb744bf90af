//! Trace pane: one line per recorded lexeme event

use super::{border_style, clamp_scroll};
use crate::trace::{TraceEvent, TraceKind};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn kind_style(kind: TraceKind) -> Style {
    Style::default().fg(DEFAULT_THEME.event(kind))
}

/// Render the trace list. The selected event is kept in view.
pub fn render_trace_pane(
    frame: &mut Frame,
    area: Rect,
    events: &[TraceEvent],
    selected: usize,
    dropped: usize,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let title = if dropped > 0 {
        format!(" Trace ({} events, {} dropped) ", events.len(), dropped)
    } else {
        format!(" Trace ({} events) ", events.len())
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style(is_focused));

    if events.is_empty() {
        let paragraph = Paragraph::new("(no events recorded)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    if selected < *scroll_offset {
        *scroll_offset = selected;
    } else if selected >= *scroll_offset + visible_height {
        *scroll_offset = selected + 1 - visible_height;
    }
    clamp_scroll(scroll_offset, events.len(), visible_height);

    let lines: Vec<Line> = events
        .iter()
        .enumerate()
        .skip(*scroll_offset)
        .take(visible_height)
        .map(|(i, event)| {
            let indent = "  ".repeat(event.depth.min(20));
            let mut line = Line::from(vec![
                Span::styled(format!("{:>6} ", event.step), Style::default().fg(DEFAULT_THEME.comment)),
                Span::styled(format!("{:<9}", event.kind.label()), kind_style(event.kind)),
                Span::raw(indent),
                Span::styled(event.tag, Style::default().fg(DEFAULT_THEME.fg)),
                Span::styled(
                    format!(" @{} L{}", event.cursor, event.location.line),
                    Style::default().fg(DEFAULT_THEME.comment),
                ),
            ]);
            if i == selected {
                line = line.style(
                    Style::default()
                        .bg(DEFAULT_THEME.current_line_bg)
                        .add_modifier(Modifier::BOLD),
                );
            }
            line
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
