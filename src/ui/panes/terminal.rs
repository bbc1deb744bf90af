//! Output pane: `print` output, then the matched input with the cursor of
//! the selected event

use super::{border_style, clamp_scroll};
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

/// Split `input` around the unit at `cursor`
fn input_line(input: &str, cursor: usize) -> Line<'static> {
    let chars: Vec<char> = input.chars().collect();
    let at = cursor.min(chars.len());
    let before: String = chars[..at].iter().collect();
    let under = chars.get(at).map_or_else(|| " ".to_string(), |c| c.to_string());
    let after: String = chars.iter().skip(at + 1).collect();
    Line::from(vec![
        Span::styled(before, Style::default().fg(DEFAULT_THEME.success)),
        Span::styled(
            under,
            Style::default()
                .bg(DEFAULT_THEME.cursor)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(after, Style::default().fg(DEFAULT_THEME.fg)),
    ])
}

pub fn render_terminal_pane(
    frame: &mut Frame,
    area: Rect,
    output: &[String],
    input: Option<&str>,
    cursor: usize,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let block = Block::default()
        .title(" Output ")
        .borders(Borders::ALL)
        .border_style(border_style(is_focused))
        .padding(Padding::new(1, 0, 0, 0));

    let mut lines: Vec<Line> = Vec::new();
    if let Some(input) = input {
        lines.push(Line::from(Span::styled(
            "input:",
            Style::default().fg(DEFAULT_THEME.comment),
        )));
        lines.push(input_line(input, cursor));
        lines.push(Line::default());
    }
    if output.is_empty() {
        lines.push(Line::from(Span::styled(
            "(no output)",
            Style::default().fg(DEFAULT_THEME.comment),
        )));
    } else {
        lines.extend(
            output
                .iter()
                .map(|line| Line::from(Span::styled(line.clone(), Style::default().fg(DEFAULT_THEME.fg)))),
        );
    }

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    clamp_scroll(scroll_offset, lines.len(), visible_height);
    let visible: Vec<Line> = lines.into_iter().skip(*scroll_offset).take(visible_height).collect();
    frame.render_widget(Paragraph::new(visible).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_line_marks_cursor() {
        let line = input_line("abc", 1);
        let parts: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
        let end = input_line("abc", 3);
        let parts: Vec<&str> = end.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(parts, vec!["abc", " ", ""]);
    }
}
