use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc;
use tracing::debug;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(
    app: &mut App,
    event: AppEvent,
    events: &mpsc::UnboundedSender<AppEvent>,
) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, events),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(width, height) => debug!(width, height, "terminal resized"),
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Stream(update) => app.apply_stream_update(update),
        AppEvent::ModelsLoaded(models) => app.models_loaded(models),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, events: &mpsc::UnboundedSender<AppEvent>) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.shutdown();
        return;
    }

    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key, events),
        InputMode::Editing => handle_editing_mode(app, key, events),
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent, events: &mpsc::UnboundedSender<AppEvent>) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.shutdown(),

        // Start typing
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
            app.status = None;
        }

        // Stop the reply being streamed
        KeyCode::Esc => app.cancel_stream(),

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown | KeyCode::Char(' ') => app.scroll_down(app.chat_height.max(1)),
        KeyCode::PageUp => app.scroll_up(app.chat_height.max(1)),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_up(u16::MAX),
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),

        // Copy the latest code block
        KeyCode::Char('y') => match app.latest_code_block() {
            Some(code) => {
                app.status = Some(if copy_to_clipboard(&code) {
                    "Copied code block".to_string()
                } else {
                    "Error: no clipboard tool found (pbcopy, wl-copy, xclip)".to_string()
                });
            }
            None => app.status = Some("No code block to copy".to_string()),
        },

        // Model picker
        KeyCode::Char('m') => app.open_model_picker(events),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, events: &mpsc::UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit(events);
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

/// Pipe `text` into the first clipboard tool available. Returns whether one accepted it.
fn copy_to_clipboard(text: &str) -> bool {
    use std::process::{Command, Stdio};
    use std::io::Write;

    const TOOLS: &[(&str, &[&str])] = &[
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    for (tool, args) in TOOLS {
        let Ok(mut child) = Command::new(tool).args(*args).stdin(Stdio::piped()).spawn() else {
            continue;
        };
        let written = child
            .stdin
            .take()
            .map(|mut stdin| stdin.write_all(text.as_bytes()).is_ok())
            .unwrap_or(false);
        let exited = child.wait().map(|status| status.success()).unwrap_or(false);
        if written && exited {
            return true;
        }
        debug!(tool, "clipboard tool failed");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventKind;
    use llamachat_core::Config;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str, tx: &mpsc::UnboundedSender<AppEvent>) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c)), tx).unwrap();
        }
    }

    fn app() -> App {
        App::new(Config {
            greeting: None,
            ..Config::default()
        })
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("héllo", 10), 6);
    }

    #[tokio::test]
    async fn test_editing_keys() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        type_text(&mut app, "héllo", &tx);
        handle_event(&mut app, key(KeyCode::Left), &tx).unwrap();
        handle_event(&mut app, key(KeyCode::Backspace), &tx).unwrap();
        assert_eq!(app.input, "hélo");
        assert_eq!(app.cursor, 3);
        handle_event(&mut app, key(KeyCode::Home), &tx).unwrap();
        handle_event(&mut app, key(KeyCode::Delete), &tx).unwrap();
        assert_eq!(app.input, "élo");
    }

    #[tokio::test]
    async fn test_enter_while_streaming_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        app.client = llamachat_core::OllamaClient::new("http://127.0.0.1:9");
        type_text(&mut app, "first", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx).unwrap();
        assert!(app.conversation.is_streaming());
        assert_eq!(app.conversation.messages().len(), 2);

        type_text(&mut app, "second", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx).unwrap();
        assert_eq!(app.conversation.messages().len(), 2);
        assert_eq!(app.input, "second");
        assert_eq!(app.status.as_deref(), Some("A reply is still streaming"));
        app.shutdown();
    }

    #[tokio::test]
    async fn test_failed_connection_comes_back_as_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = app();
        app.client = llamachat_core::OllamaClient::new("http://127.0.0.1:9");
        type_text(&mut app, "hello", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx).unwrap();

        let event = rx.recv().await.expect("stream event");
        assert!(matches!(event, AppEvent::Stream(llamachat_core::StreamUpdate::Failed { .. })));
        handle_event(&mut app, event, &tx).unwrap();
        assert!(!app.conversation.is_streaming());
        assert!(app.conversation.messages()[1].is_awaiting_first_token());
        assert!(app.status.as_deref().unwrap_or_default().starts_with("Error: Connection error"));
    }

    #[test]
    fn test_resize_keeps_state() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        handle_event(&mut app, AppEvent::Resize(120, 40), &tx).unwrap();
        assert!(!app.should_quit);
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn test_ctrl_c_quits() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = app();
        let event = KeyEvent {
            kind: KeyEventKind::Press,
            ..KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
        };
        handle_event(&mut app, AppEvent::Key(event), &tx).unwrap();
        assert!(app.should_quit);
    }
}
