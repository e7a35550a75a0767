use llamachat_core::MarkdownRenderer;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

const DIM: Color = Color::DarkGray;
const CODE_FG: Color = Color::Green;
const LINK_FG: Color = Color::Blue;

/// Assistant markdown turned into terminal lines.
#[derive(Debug, Default, Clone)]
pub struct RenderedMarkdown {
    pub lines: Vec<Line<'static>>,
    /// Raw contents of every code block, in order, for copying.
    pub code_blocks: Vec<String>,
}

/// Renders markdown with pulldown-cmark. Works on partial input too: an
/// unterminated code fence simply runs to the end of the text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalMarkdown;

impl MarkdownRenderer for TerminalMarkdown {
    type Output = RenderedMarkdown;

    fn render(&self, text: &str) -> RenderedMarkdown {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut writer = Writer::default();
        for event in Parser::new_ext(text, options) {
            writer.event(event);
        }
        writer.finish()
    }
}

#[derive(Default)]
struct Writer {
    out: RenderedMarkdown,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    /// Stack of open lists: next ordinal for ordered lists, `None` for bullets.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    code: Option<String>,
    link: Option<String>,
    table: Option<Vec<Vec<String>>>,
    cell: String,
}

impl Writer {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if let Some(code) = self.code.as_mut() {
                    code.push_str(&text);
                } else if self.table.is_some() {
                    self.cell.push_str(&text);
                } else {
                    self.push_text(&text);
                }
            }
            Event::Code(code) => {
                if self.table.is_some() {
                    self.cell.push_str(&code);
                } else {
                    self.spans.push(Span::styled(
                        code.to_string(),
                        Style::default().fg(CODE_FG),
                    ));
                }
            }
            Event::SoftBreak => {
                if self.table.is_none() {
                    self.spans.push(Span::raw(" "));
                }
            }
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.out
                    .lines
                    .push(Line::from(Span::styled("─".repeat(40), Style::default().fg(DIM))));
            }
            Event::TaskListMarker(done) => {
                self.spans.push(Span::raw(if done { "[x] " } else { "[ ] " }));
            }
            Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.flush();
                let style = match level {
                    HeadingLevel::H1 => Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                    HeadingLevel::H2 => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    _ => Style::default().add_modifier(Modifier::BOLD),
                };
                self.styles.push(style);
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => lang.to_string(),
                    _ => "code".to_string(),
                };
                self.out.lines.push(Line::from(vec![
                    Span::styled(format!("┌─ {} ", lang), Style::default().fg(DIM)),
                    Span::styled("(y to copy)", Style::default().fg(DIM).add_modifier(Modifier::ITALIC)),
                ]));
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}{}. ", indent, n);
                        *n += 1;
                        marker
                    }
                    _ => format!("{}• ", indent),
                };
                self.spans.push(Span::styled(marker, Style::default().fg(DIM)));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { dest_url, .. } => {
                self.link = Some(dest_url.to_string());
                self.push_style(Style::default().fg(LINK_FG).add_modifier(Modifier::UNDERLINED));
            }
            Tag::Table(_) => {
                self.flush();
                self.table = Some(Vec::new());
            }
            Tag::TableHead | Tag::TableRow => {
                if let Some(rows) = self.table.as_mut() {
                    rows.push(Vec::new());
                }
            }
            Tag::TableCell => self.cell.clear(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.out.lines.push(Line::default());
                }
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.styles.pop();
            }
            TagEnd::BlockQuote(_) => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                let code = self.code.take().unwrap_or_default();
                for line in code.lines() {
                    self.out.lines.push(Line::from(vec![
                        Span::styled("│ ", Style::default().fg(DIM)),
                        Span::styled(line.to_string(), Style::default().fg(CODE_FG)),
                    ]));
                }
                self.out
                    .lines
                    .push(Line::from(Span::styled("└─", Style::default().fg(DIM))));
                self.out.code_blocks.push(code);
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.out.lines.push(Line::default());
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(url) = self.link.take() {
                    self.spans
                        .push(Span::styled(format!(" <{}>", url), Style::default().fg(DIM)));
                }
            }
            TagEnd::TableCell => {
                let cell = std::mem::take(&mut self.cell);
                if let Some(row) = self.table.as_mut().and_then(|rows| rows.last_mut()) {
                    row.push(cell.trim().to_string());
                }
            }
            TagEnd::Table => {
                if let Some(rows) = self.table.take() {
                    self.write_table(rows);
                }
            }
            _ => {}
        }
    }

    fn write_table(&mut self, rows: Vec<Vec<String>>) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        for (r, row) in rows.iter().enumerate() {
            let cells: Vec<String> = (0..columns)
                .map(|i| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", cell, width = widths[i])
                })
                .collect();
            let style = if r == 0 {
                Style::default().add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            self.out
                .lines
                .push(Line::from(Span::styled(format!("│ {} │", cells.join(" │ ")), style)));
            if r == 0 {
                let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
                self.out.lines.push(Line::from(Span::styled(
                    format!("├─{}─┤", rule.join("─┼─")),
                    Style::default().fg(DIM),
                )));
            }
        }
        self.out.lines.push(Line::default());
    }

    fn push_style(&mut self, style: Style) {
        let base = self.styles.last().copied().unwrap_or_default();
        self.styles.push(base.patch(style));
    }

    fn push_text(&mut self, text: &str) {
        let style = self.styles.last().copied().unwrap_or_default();
        self.spans.push(Span::styled(text.to_string(), style));
    }

    fn flush(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled("│ ".repeat(self.quote_depth), Style::default().fg(DIM)));
        }
        spans.append(&mut self.spans);
        self.out.lines.push(Line::from(spans));
    }

    fn finish(mut self) -> RenderedMarkdown {
        self.flush();
        // An unterminated code block still shows what arrived so far.
        if let Some(code) = self.code.take() {
            for line in code.lines() {
                self.out.lines.push(Line::from(vec![
                    Span::styled("│ ", Style::default().fg(DIM)),
                    Span::styled(line.to_string(), Style::default().fg(CODE_FG)),
                ]));
            }
            self.out.code_blocks.push(code);
        }
        while self.out.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.out.lines.pop();
        }
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    fn render(text: &str) -> RenderedMarkdown {
        TerminalMarkdown.render(text)
    }

    #[test]
    fn test_heading_and_paragraph() {
        let out = render("# Title\n\nSome **bold** text");
        assert_eq!(text_of(&out.lines[0]), "Title");
        assert!(out.lines[0].spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(text_of(out.lines.last().unwrap()), "Some bold text");
    }

    #[test]
    fn test_code_block_collected() {
        let out = render("Try:\n\n```rust\nfn main() {}\n```\n");
        assert_eq!(out.code_blocks, vec!["fn main() {}\n"]);
        let rendered: Vec<String> = out.lines.iter().map(text_of).collect();
        assert!(rendered.contains(&"┌─ rust (y to copy)".to_string()));
        assert!(rendered.contains(&"│ fn main() {}".to_string()));
    }

    #[test]
    fn test_unterminated_code_block_renders() {
        let out = render("```python\nprint('a')\nprint('b')");
        assert_eq!(out.code_blocks.len(), 1);
        assert!(out.code_blocks[0].contains("print('b')"));
    }

    #[test]
    fn test_lists() {
        let out = render("- one\n- two\n\n1. first\n2. second");
        let rendered: Vec<String> = out.lines.iter().map(text_of).collect();
        assert!(rendered.contains(&"• one".to_string()));
        assert!(rendered.contains(&"• two".to_string()));
        assert!(rendered.contains(&"1. first".to_string()));
        assert!(rendered.contains(&"2. second".to_string()));
    }

    #[test]
    fn test_table() {
        let out = render("| a | bb |\n|---|---|\n| 1 | 2 |");
        let rendered: Vec<String> = out.lines.iter().map(text_of).collect();
        assert_eq!(rendered[0], "│ a │ bb │");
        assert_eq!(rendered[2], "│ 1 │ 2  │");
    }

    #[test]
    fn test_link_shows_url() {
        let out = render("see [docs](https://ollama.com)");
        assert_eq!(text_of(&out.lines[0]), "see docs <https://ollama.com>");
    }

    #[test]
    fn test_half_written_table_does_not_panic() {
        for text in ["| a |", "| a | b |\n|--", "| a | b |\n|---|---|\n| 1"] {
            render(text);
        }
    }
}
