pub mod ai;
pub mod config;
pub mod error;
pub mod normalize;
pub mod render;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use ai::{ChatRequest, OllamaClient, WireMessage};
pub use config::Config;
pub use error::{ChatError, Result};
pub use normalize::normalize;
pub use render::{render_message, MarkdownRenderer, MessageView, ThinkingIndicator};
pub use state::{ChatMessage, ChatRole, Conversation, StreamId};
pub use stream::{pump, DeltaStream, LineFramer, StreamUpdate};
