pub mod ollama;

pub use ollama::{ByteStream, ChatOptions, ChatRequest, OllamaClient, WireMessage};
