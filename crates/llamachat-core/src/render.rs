//! Mapping of conversation entries to something a front end can draw.

use crate::state::{ChatMessage, ChatRole};

/// Frames of the thinking animation; the frame number is the dot count.
pub const THINKING_FRAMES: u8 = 4;

/// Renders assistant markdown into a front end's own representation.
pub trait MarkdownRenderer {
    type Output;

    fn render(&self, text: &str) -> Self::Output;
}

/// Animated "Thinking" label shown while a reply has no text yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThinkingIndicator {
    frame: u8,
}

impl ThinkingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame (called by the front end's tick timer).
    pub fn tick(&mut self) {
        self.frame = (self.frame + 1) % THINKING_FRAMES;
    }

    pub fn reset(&mut self) {
        self.frame = 0;
    }

    pub fn frame(&self) -> u8 {
        self.frame
    }

    pub fn label(&self) -> String {
        format!("Thinking{}", ".".repeat(self.frame as usize))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageView<'a, T> {
    /// User text, shown verbatim.
    Literal(&'a str),
    /// Reply still waiting for its first token.
    Thinking(String),
    /// Reply whose stream ended without any text.
    NoResponse,
    /// Assistant markdown rendered by the front end.
    Rendered(T),
}

pub fn render_message<'a, R: MarkdownRenderer>(
    message: &'a ChatMessage,
    is_stream_target: bool,
    indicator: &ThinkingIndicator,
    renderer: &R,
) -> MessageView<'a, R::Output> {
    match message.role {
        ChatRole::User => MessageView::Literal(&message.content),
        ChatRole::Assistant if message.is_awaiting_first_token() => {
            if is_stream_target {
                MessageView::Thinking(indicator.label())
            } else {
                MessageView::NoResponse
            }
        }
        ChatRole::Assistant => MessageView::Rendered(renderer.render(&message.content)),
    }
}
