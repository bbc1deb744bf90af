//! Status bar: event position, match verdict and key hints

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

const KEY_HINTS: [(&str, &str); 6] = [
    ("←/→", "step"),
    ("f", "next fail"),
    ("tab", "pane"),
    ("⎵", "play"),
    ("↵/⌫", "end/start"),
    ("q", "quit"),
];

fn badge(text: String, bg: Color) -> Span<'static> {
    Span::styled(
        text,
        Style::default().bg(bg).fg(Color::Black).add_modifier(Modifier::BOLD),
    )
}

fn position_label(current_event: usize, total_events: usize) -> String {
    if total_events == 0 {
        " no events ".to_string()
    } else {
        format!(" {}/{} ", current_event + 1, total_events)
    }
}

pub fn render_status_bar(
    frame: &mut Frame,
    area: Rect,
    message: &str,
    current_event: usize,
    total_events: usize,
    matched: bool,
    is_playing: bool,
) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);
    let bar = Style::default().bg(DEFAULT_THEME.current_line_bg).fg(DEFAULT_THEME.fg);

    let verdict = if matched {
        badge(" MATCH ".to_string(), DEFAULT_THEME.success)
    } else {
        badge(" NO MATCH ".to_string(), DEFAULT_THEME.error)
    };
    let mut left = vec![
        badge(position_label(current_event, total_events), DEFAULT_THEME.primary),
        verdict,
    ];
    if is_playing {
        left.push(badge(" ▶ ".to_string(), DEFAULT_THEME.secondary));
    }
    left.push(Span::styled(format!(" {}", message), bar));
    frame.render_widget(Paragraph::new(Line::from(left)).style(bar), halves[0]);

    let key = Style::default().bg(DEFAULT_THEME.comment).fg(Color::Black);
    let right: Vec<Span> = KEY_HINTS
        .iter()
        .flat_map(|(k, what)| {
            [
                Span::styled(format!(" {} ", k), key),
                Span::styled(format!(" {} ", what), bar),
            ]
        })
        .collect();
    frame.render_widget(
        Paragraph::new(Line::from(right)).style(bar).alignment(Alignment::Right),
        halves[1],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_label_is_one_based() {
        assert_eq!(position_label(0, 0), " no events ");
        assert_eq!(position_label(4, 10), " 5/10 ");
    }
}
