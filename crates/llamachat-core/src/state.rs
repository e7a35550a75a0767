//! UI-agnostic conversation state
//!
//! The conversation log and the handle of the reply currently being streamed
//! into it. All mutation goes through [`Conversation::send`],
//! [`Conversation::apply_delta`], [`Conversation::end_stream`] and
//! [`Conversation::fail_stream`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::WireMessage;
use crate::error::{ChatError, Result};
use crate::normalize::normalize;
use crate::stream::StreamUpdate;

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Placeholder reply that has not received any text yet.
    #[serde(skip)]
    awaiting_first_token: bool,
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            awaiting_first_token: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            awaiting_first_token: false,
        }
    }

    fn placeholder() -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            awaiting_first_token: true,
        }
    }

    pub fn is_awaiting_first_token(&self) -> bool {
        self.awaiting_first_token
    }
}

/// Identifies one streamed reply. Ids are never reused within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub(crate) u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveStream {
    id: StreamId,
    index: usize,
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    active: Option<ActiveStream>,
    next_stream: u64,
    last_error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an assistant greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        let mut conversation = Self::new();
        conversation.messages.push(ChatMessage::assistant(greeting));
        conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_stream(&self) -> Option<StreamId> {
        self.active.map(|active| active.id)
    }

    /// Whether the message at `index` is the one currently receiving deltas.
    pub fn is_stream_target(&self, index: usize) -> bool {
        self.active.is_some_and(|active| active.index == index)
    }

    /// Error from the most recent stream, cleared by the next send.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Append the user's message and a reply placeholder, and make the
    /// placeholder the target of a new stream.
    ///
    /// Rejected without touching the log if `text` is blank or a reply is
    /// still streaming.
    pub fn send(&mut self, text: &str) -> Result<StreamId> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if self.active.is_some() {
            return Err(ChatError::Busy);
        }

        self.next_stream += 1;
        let id = StreamId(self.next_stream);

        self.messages.push(ChatMessage::user(text));
        self.messages.push(ChatMessage::placeholder());
        self.active = Some(ActiveStream {
            id,
            index: self.messages.len() - 1,
        });
        self.last_error = None;

        debug!(stream = %id, "stream started");
        Ok(id)
    }

    /// Append a fragment to the reply of `stream`. Returns `false` if the
    /// fragment was dropped because `stream` is not the active stream.
    pub fn apply_delta(&mut self, stream: StreamId, fragment: &str) -> bool {
        let Some(message) = self.target_mut(stream) else {
            debug!(%stream, "dropping stale delta");
            return false;
        };
        if fragment.is_empty() {
            return true;
        }

        if message.awaiting_first_token {
            message.content = fragment.to_string();
            message.awaiting_first_token = false;
        } else {
            message.content.push_str(fragment);
        }
        true
    }

    /// Finish `stream`: normalize the reply it produced and release the handle.
    pub fn end_stream(&mut self, stream: StreamId) -> bool {
        let Some(message) = self.target_mut(stream) else {
            return false;
        };
        if !message.awaiting_first_token {
            message.content = normalize(&message.content);
        }

        self.active = None;
        debug!(%stream, "stream ended");
        true
    }

    /// Abandon `stream` after a failed request. The placeholder stays in the
    /// log so the exchange is visible; the user can send again.
    pub fn fail_stream(&mut self, stream: StreamId, error: impl Into<String>) -> bool {
        if self.target_mut(stream).is_none() {
            return false;
        }

        self.active = None;
        self.last_error = Some(error.into());
        debug!(%stream, "stream failed");
        true
    }

    /// Apply one update reported by [`crate::stream::pump`].
    pub fn apply(&mut self, update: StreamUpdate) -> bool {
        match update {
            StreamUpdate::Delta { stream, text } => self.apply_delta(stream, &text),
            StreamUpdate::Finished { stream, error } => {
                let ended = self.end_stream(stream);
                if ended {
                    if let Some(error) = error {
                        self.last_error = Some(error);
                    }
                }
                ended
            }
            StreamUpdate::Failed { stream, error } => self.fail_stream(stream, error),
        }
    }

    /// Messages to send as prompt history, in order. Replies that never
    /// received any text are left out.
    pub fn history(&self) -> Vec<WireMessage> {
        self.messages
            .iter()
            .filter(|message| !message.awaiting_first_token)
            .map(|message| WireMessage {
                role: message.role,
                content: message.content.clone(),
            })
            .collect()
    }

    fn target_mut(&mut self, stream: StreamId) -> Option<&mut ChatMessage> {
        let active = self.active.filter(|active| active.id == stream)?;
        self.messages.get_mut(active.index)
    }
}
