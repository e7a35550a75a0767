use llamachat_core::{render_message, MessageView};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, InputMode};
use crate::markdown::TerminalMarkdown;

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

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" llamachat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} @ {}", app.config.model, app.client.base_url()),
            Style::default().fg(Color::White),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Lines for the whole conversation, rendered fresh on every draw so a reply
/// that is still growing always shows its latest text.
fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for (index, message) in app.conversation.messages().iter().enumerate() {
        let view = render_message(
            message,
            app.conversation.is_stream_target(index),
            &app.thinking,
            &TerminalMarkdown,
        );

        match view {
            MessageView::Literal(text) => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in text.split('\n') {
                    lines.push(Line::raw(line.replace('\t', "    ")));
                }
            }
            MessageView::Thinking(label) => {
                lines.push(assistant_label());
                lines.push(Line::from(Span::styled(
                    label,
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
            MessageView::NoResponse => {
                lines.push(assistant_label());
                lines.push(Line::from(Span::styled(
                    "(no response)",
                    Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
                )));
            }
            MessageView::Rendered(markdown) => {
                lines.push(assistant_label());
                lines.extend(markdown.lines);
            }
        }
        lines.push(Line::default());
    }

    lines
}

fn assistant_label() -> Line<'static> {
    Line::from(Span::styled(
        "AI:",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    ))
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Chat ");

    let lines = chat_lines(app);
    let inner_height = area.height.saturating_sub(2);
    let inner_width = area.width.saturating_sub(2);

    let chat_text = if lines.is_empty() {
        Text::from(Span::styled(
            "Ask the model anything...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(lines)
    };

    // Count rows with the same word wrapping the paragraph is drawn with
    let chat = Paragraph::new(chat_text).wrap(Wrap { trim: false });
    let rows = chat.line_count(inner_width).min(u16::MAX as usize) as u16;

    // Keep scroll state in sync with what was actually drawn
    app.chat_height = inner_height;
    app.chat_max_scroll = rows.saturating_sub(inner_height);
    if app.follow_tail || app.chat_scroll > app.chat_max_scroll {
        app.chat_scroll = app.chat_max_scroll;
    }

    let chat = chat.block(chat_block).scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let title = if app.conversation.is_streaming() {
        " Message (reply streaming, Esc to stop) "
    } else {
        " Message "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing && !app.show_model_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = if let Some(status) = app.status.as_deref() {
        let style = if status.starts_with("Error") {
            Style::default().bg(Color::Black).fg(Color::Red)
        } else {
            label_style
        };
        vec![Span::styled(format!(" {} ", status), style)]
    } else {
        match app.input_mode {
            InputMode::Editing => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" stop typing ", label_style),
            ],
            InputMode::Normal => {
                let mut hints = vec![
                    Span::styled(" i ", key_style),
                    Span::styled(" type ", label_style),
                    Span::styled(" j/k ", key_style),
                    Span::styled(" scroll ", label_style),
                    Span::styled(" G ", key_style),
                    Span::styled(" bottom ", label_style),
                    Span::styled(" y ", key_style),
                    Span::styled(" copy code ", label_style),
                    Span::styled(" m ", key_style),
                    Span::styled(" model ", label_style),
                ];
                if app.conversation.is_streaming() {
                    hints.extend(vec![
                        Span::styled(" Esc ", key_style),
                        Span::styled(" stop reply ", label_style),
                    ]);
                }
                hints.extend(vec![
                    Span::styled(" q ", key_style),
                    Span::styled(" quit ", label_style),
                ]);
                hints
            }
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let rows = app.available_models.len().max(1) as u16;
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = (rows + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    if app.models_loading || app.available_models.is_empty() {
        let message = if app.models_loading {
            "Loading models..."
        } else {
            "No models found. Pull one with: ollama pull llama3.2"
        };
        let placeholder = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, popup_area);
        return;
    }

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.config.model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}
