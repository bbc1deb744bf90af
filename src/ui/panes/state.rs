//! Engine state pane: the selected event and the heap after the run

use super::border_style;
use crate::memory::heap::HeapStats;
use crate::trace::TraceEvent;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn row(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<14}", label), Style::default().fg(DEFAULT_THEME.comment)),
        Span::styled(value, Style::default().fg(DEFAULT_THEME.number)),
    ])
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default()
            .fg(DEFAULT_THEME.primary)
            .add_modifier(Modifier::BOLD),
    ))
}

pub fn render_state_pane(
    frame: &mut Frame,
    area: Rect,
    event: Option<&TraceEvent>,
    stats: &HeapStats,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let block = Block::default()
        .title(" Engine ")
        .borders(Borders::ALL)
        .border_style(border_style(is_focused));

    let mut lines = vec![heading("At event")];
    match event {
        Some(event) => {
            lines.push(row("lexeme", format!("{} #{}", event.tag, event.node)));
            lines.push(row("event", event.kind.label().to_string()));
            lines.push(row("cursor", event.cursor.to_string()));
            lines.push(row("frames", event.depth.to_string()));
            lines.push(row("generations", event.generations.to_string()));
            lines.push(row("choices", event.choices.to_string()));
        }
        None => lines.push(Line::from(Span::styled(
            "(none)",
            Style::default().fg(DEFAULT_THEME.comment),
        ))),
    }
    lines.push(Line::default());
    lines.push(heading("Heap after run"));
    lines.push(row("generations", stats.generations.to_string()));
    lines.push(row("cells", format!("{} ({} live)", stats.cells, stats.live_cells)));
    lines.push(row("handles", format!("{} ({} live)", stats.handles, stats.live_handles)));
    lines.push(row("free", stats.free.to_string()));
    lines.push(row("journal", stats.journal_len.to_string()));
    lines.push(row("stack", stats.stack_len.to_string()));

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    super::clamp_scroll(scroll_offset, lines.len(), visible_height);
    let visible: Vec<Line> = lines.into_iter().skip(*scroll_offset).collect();
    frame.render_widget(Paragraph::new(visible).block(block), area);
}
