//! Source pane rendering with syntax highlighting
//!
//! Displays the program with the line of the selected trace event
//! highlighted. The highlighter is a character-by-character tokenizer; it
//! knows keywords, built-in names, strings and the pattern operators.

use super::{border_style, clamp_scroll};
use crate::interpreter::builtins::Builtin;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn highlight_source_code(line: &str) -> Line<'static> {
    let mut spans = Vec::new();
    let mut current_word = String::new();
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '/' && chars.get(i + 1) == Some(&'/') {
            flush_word(&mut spans, &mut current_word, false);
            spans.push(Span::styled(
                chars[i..].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.comment),
            ));
            break;
        }

        if c == '"' || c == '\'' {
            flush_word(&mut spans, &mut current_word, false);
            let mut end = i + 1;
            while end < chars.len() && chars[end] != c {
                end += if chars[end] == '\\' { 2 } else { 1 };
            }
            let end = (end + 1).min(chars.len());
            spans.push(Span::styled(
                chars[i..end].iter().collect::<String>(),
                Style::default().fg(DEFAULT_THEME.string),
            ));
            i = end;
            continue;
        }

        if !c.is_alphanumeric() && c != '_' {
            flush_word(&mut spans, &mut current_word, c == '(');
            let style = match c {
                '{' | '}' | '(' | ')' | '[' | ']' => Style::default().fg(DEFAULT_THEME.primary),
                '|' | '!' | '@' | '%' | '^' | '?' | '*' | '+' | '$' | '<' | '>' => {
                    Style::default().fg(DEFAULT_THEME.pattern)
                }
                _ => Style::default().fg(DEFAULT_THEME.fg),
            };
            spans.push(Span::styled(c.to_string(), style));
            i += 1;
            continue;
        }

        current_word.push(c);
        i += 1;
    }
    flush_word(&mut spans, &mut current_word, false);

    Line::from(spans)
}

fn flush_word(spans: &mut Vec<Span<'static>>, word: &mut String, is_function: bool) {
    if word.is_empty() {
        return;
    }
    let style = keyword_style(word, is_function);
    spans.push(Span::styled(std::mem::take(word), style));
}

fn keyword_style(word: &str, is_function: bool) -> Style {
    match word {
        "let" | "fn" | "rule" | "fragment" | "if" | "else" | "while" | "for" | "in" | "return" | "break"
        | "continue" | "prop" => Style::default()
            .fg(DEFAULT_THEME.keyword)
            .add_modifier(Modifier::BOLD),
        "true" | "false" | "nil" => Style::default().fg(DEFAULT_THEME.number),
        _ if word.starts_with(|c: char| c.is_ascii_digit()) => Style::default().fg(DEFAULT_THEME.number),
        _ if is_function || Builtin::from_name(word).is_some() => Style::default().fg(DEFAULT_THEME.function),
        _ => Style::default().fg(DEFAULT_THEME.fg),
    }
}

/// Scroll state for the source pane
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceScrollState {
    pub offset: usize,
    /// Visual row the current line is kept at; `None` centers it
    pub target_line_row: Option<usize>,
}

/// Render the source pane; `current_line` is 1-based, 0 for none
pub fn render_source_pane(
    frame: &mut Frame,
    area: Rect,
    source_code: &str,
    current_line: usize,
    is_failure: bool,
    is_focused: bool,
    scroll_state: &mut SourceScrollState,
) {
    let block = Block::default()
        .title(" Source ")
        .borders(Borders::ALL)
        .border_style(border_style(is_focused));

    let lines: Vec<&str> = source_code.lines().collect();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    let target_row = scroll_state
        .target_line_row
        .unwrap_or(visible_height / 2)
        .min(visible_height.saturating_sub(1));
    scroll_state.target_line_row = Some(target_row);

    if current_line > 0 && current_line <= lines.len() {
        scroll_state.offset = (current_line - 1).saturating_sub(target_row);
        clamp_scroll(&mut scroll_state.offset, lines.len(), visible_height);
    }

    let current_style = if is_failure {
        Style::default()
            .bg(DEFAULT_THEME.current_line_bg)
            .fg(DEFAULT_THEME.error)
    } else {
        Style::default().bg(DEFAULT_THEME.current_line_bg)
    };

    let visible_lines: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(idx, line)| {
            let line_num = idx + 1;
            let is_current = line_num == current_line;
            let num_style = if is_current {
                Style::default()
                    .fg(DEFAULT_THEME.secondary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(DEFAULT_THEME.comment)
            };

            let mut content = highlight_source_code(line);
            if is_current {
                for span in &mut content.spans {
                    span.style = span.style.patch(current_style);
                }
            }

            let mut spans = vec![Span::styled(format!("{:4} ", line_num), num_style)];
            spans.extend(content.spans);
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(visible_lines).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_keeps_every_character() {
        let line = "rule Word = [a-z]+ \"é\"; // done";
        let rendered: String = highlight_source_code(line)
            .spans
            .iter()
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(rendered, line);
    }
}
