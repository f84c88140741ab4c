use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use nexus_core::Sender;
use crate::app::{App, SUGGESTIONS};

/// Style `**bold**` and `` `code` `` runs in a reply line; anything unclosed stays literal
fn parse_markdown_line(text: &str, base: Style) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let bold = rest.find("**");
        let code = rest.find('`');

        let (start, marker, style) = match (bold, code) {
            (Some(b), Some(c)) if c < b => (c, "`", base.fg(Color::Green)),
            (Some(b), _) => (b, "**", base.add_modifier(Modifier::BOLD)),
            (None, Some(c)) => (c, "`", base.fg(Color::Green)),
            (None, None) => break,
        };

        let after = &rest[start + marker.len()..];
        match after.find(marker) {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::styled(rest[..start].to_string(), base));
                }
                spans.push(Span::styled(after[..end].to_string(), style));
                rest = &after[end + marker.len()..];
            }
            _ => {
                // No closing marker: emit through the opener and keep scanning
                spans.push(Span::styled(rest[..start + marker.len()].to_string(), base));
                rest = after;
            }
        }
    }

    if !rest.is_empty() {
        spans.push(Span::styled(rest.to_string(), base));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Empty-conversation view: greeting plus the starter prompts, `selected` highlighted
fn welcome_lines(selected: Option<usize>) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::from(Span::styled("Welcome to Nexus", Style::default().fg(Color::Cyan).bold())),
        Line::from(Span::styled("Ask AI anything or try one of these suggestions:", dim)),
        Line::default(),
    ];

    for (i, suggestion) in SUGGESTIONS.iter().enumerate() {
        let title_style = if selected == Some(i) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {}. ", i + 1), dim),
            Span::styled(suggestion.title, title_style),
        ]));
        lines.push(Line::from(Span::styled(format!("     {}", suggestion.description), dim)));
    }

    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "Tab fills the input with a suggestion. Your conversation is saved on this device.",
        dim,
    )));
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let count = app.conversation.messages.len();
    let count_indicator = if count > 0 {
        format!(" [{} messages]", count)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::styled(" Dev Nexus ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(count_indicator, Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size for scroll calculations
    let height = area.height.saturating_sub(2);
    let width = area.width.saturating_sub(2);
    if height != app.chat_height || width != app.chat_width {
        app.chat_height = height;
        app.chat_width = width;
        if app.follow_bottom {
            app.scroll_to_bottom();
        }
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Chat ");

    let text = if app.conversation.messages.is_empty() && !app.is_thinking() {
        Text::from(welcome_lines(app.suggestion))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in &app.conversation.messages {
            match msg.sender {
                Sender::User => {
                    lines.push(Line::from(vec![
                        Span::styled(
                            "You:",
                            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!(" {}", msg.timestamp.with_timezone(&chrono::Local).format("%H:%M")),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]));
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                Sender::Assistant => {
                    lines.push(Line::from(vec![
                        Span::styled(
                            "AI:",
                            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(
                            format!(" {}", msg.timestamp.with_timezone(&chrono::Local).format("%H:%M")),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ]));
                    if msg.is_error {
                        lines.push(Line::from(Span::styled(
                            msg.content.clone(),
                            Style::default().fg(Color::Red),
                        )));
                    } else {
                        for line in msg.content.lines() {
                            lines.push(parse_markdown_line(line, Style::default()));
                        }
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.is_thinking() {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.is_pending() { Color::DarkGray } else { Color::Yellow };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ")
        .title_bottom(
            Line::from(format!(" {}/{} ", app.input_chars(), app.max_input_chars)).right_aligned(),
        );

    // Horizontal scrolling keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else if app.cursor >= inner_width {
        app.cursor - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    let cursor_x = (app.cursor - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = if app.is_pending() {
        vec![Span::styled(" WAITING ", Style::default().bg(Color::Yellow).fg(Color::Black))]
    } else {
        vec![Span::styled(" READY ", Style::default().bg(Color::Blue).fg(Color::White))]
    };
    spans.push(Span::styled(" ", label_style));

    if let Some(status) = &app.status {
        spans.push(Span::styled(format!(" {} ", status), Style::default().fg(Color::Magenta)));
    } else {
        spans.extend(vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" PgUp/PgDn ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" ^L ", key_style),
            Span::styled(" clear history ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" quit ", label_style),
        ]);
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(line: &Line) -> Vec<String> {
        line.spans.iter().map(|s| s.content.to_string()).collect()
    }

    #[test]
    fn test_bold_and_code_runs() {
        let line = parse_markdown_line("use **cargo** and `rustc` here", Style::default());
        assert_eq!(contents(&line), vec!["use ", "cargo", " and ", "rustc", " here"]);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line.spans[3].style.fg, Some(Color::Green));
    }

    #[test]
    fn test_unclosed_marker_stays_literal() {
        let line = parse_markdown_line("2 ** 3 is power", Style::default());
        assert_eq!(contents(&line).concat(), "2 ** 3 is power");
        assert!(line.spans.iter().all(|s| !s.style.add_modifier.contains(Modifier::BOLD)));
    }

    #[test]
    fn test_plain_and_empty_lines() {
        assert_eq!(contents(&parse_markdown_line("plain", Style::default())), vec!["plain"]);
        assert!(parse_markdown_line("", Style::default()).spans.is_empty());
    }

    #[test]
    fn test_welcome_lists_every_suggestion() {
        let text: Vec<String> = welcome_lines(None)
            .iter()
            .map(|line| contents(line).concat())
            .collect();
        for suggestion in SUGGESTIONS {
            assert!(text.iter().any(|l| l.contains(suggestion.title)));
            assert!(text.iter().any(|l| l.contains(suggestion.description)));
        }
    }

    #[test]
    fn test_welcome_highlights_selected_suggestion() {
        let lines = welcome_lines(Some(1));
        let title = lines
            .iter()
            .flat_map(|line| line.spans.iter())
            .find(|span| span.content == SUGGESTIONS[1].title)
            .unwrap();
        assert_eq!(title.style.fg, Some(Color::Yellow));
    }
}
