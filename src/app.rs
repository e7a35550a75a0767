use llamachat_core::{
    pump, ChatRequest, ChatRole, Config, Conversation, MarkdownRenderer, OllamaClient,
    StreamUpdate, ThinkingIndicator,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::markdown::TerminalMarkdown;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Conversation
    pub conversation: Conversation,
    pub thinking: ThinkingIndicator,
    pub stream_task: Option<JoinHandle<()>>,
    pub status: Option<String>,

    // Chat scroll state (updated during render)
    pub chat_scroll: u16,
    pub chat_max_scroll: u16,
    pub chat_height: u16,
    pub follow_tail: bool,

    // Model picker state
    pub show_model_picker: bool,
    pub models_loading: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Backend
    pub client: OllamaClient,
    pub config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        let client = OllamaClient::new(&config.host);
        let conversation = match config.greeting.as_deref() {
            Some(greeting) if !greeting.trim().is_empty() => Conversation::with_greeting(greeting),
            _ => Conversation::new(),
        };

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            input: String::new(),
            cursor: 0,
            conversation,
            thinking: ThinkingIndicator::new(),
            stream_task: None,
            status: None,
            chat_scroll: 0,
            chat_max_scroll: 0,
            chat_height: 0,
            follow_tail: true,
            show_model_picker: false,
            models_loading: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),
            client,
            config,
        }
    }

    /// Send the input box as a new user message and start streaming the reply.
    pub fn submit(&mut self, events: &mpsc::UnboundedSender<AppEvent>) {
        let stream = match self.conversation.send(&self.input) {
            Ok(stream) => stream,
            Err(err) if err.is_recoverable() => {
                debug!(error = %err, "send rejected");
                self.status = Some(err.to_string());
                return;
            }
            Err(err) => {
                warn!(error = %err, "send failed");
                self.status = Some(format!("Error: {}", err));
                return;
            }
        };

        self.input.clear();
        self.cursor = 0;
        self.status = None;
        self.thinking.reset();
        self.follow_tail = true;

        let request = ChatRequest::new(
            self.config.model.clone(),
            self.conversation.history(),
            self.config.temperature,
        );
        let client = self.client.clone();
        let events = events.clone();
        self.stream_task = Some(tokio::spawn(async move {
            pump(&client, &request, stream, |update| {
                events.send(AppEvent::Stream(update)).is_ok()
            })
            .await;
        }));
    }

    pub fn apply_stream_update(&mut self, update: StreamUpdate) {
        let stream = update.stream();
        let is_delta = matches!(update, StreamUpdate::Delta { .. });
        if !self.conversation.apply(update) {
            debug!(%stream, "ignoring update for inactive stream");
            return;
        }
        if is_delta {
            return;
        }

        self.stream_task = None;
        if let Some(error) = self.conversation.last_error() {
            self.status = Some(format!("Error: {}", error));
        }
    }

    /// Stop the reply being streamed, keeping whatever text already arrived.
    pub fn cancel_stream(&mut self) {
        let Some(stream) = self.conversation.active_stream() else {
            return;
        };
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.conversation.end_stream(stream);
        self.status = Some("Reply cancelled".to_string());
        info!(%stream, "stream cancelled by user");
    }

    /// Stop background work before exiting.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.should_quit = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_streaming() {
            self.thinking.tick();
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_tail = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.chat_max_scroll);
        if self.chat_scroll >= self.chat_max_scroll {
            self.follow_tail = true;
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_tail = true;
        self.chat_scroll = self.chat_max_scroll;
    }

    /// Most recent code block of the latest assistant reply with text.
    pub fn latest_code_block(&self) -> Option<String> {
        self.conversation
            .messages()
            .iter()
            .rev()
            .filter(|message| message.role == ChatRole::Assistant)
            .find(|message| !message.is_awaiting_first_token())
            .and_then(|message| TerminalMarkdown.render(&message.content).code_blocks.pop())
    }

    // Model picker methods
    pub fn open_model_picker(&mut self, events: &mpsc::UnboundedSender<AppEvent>) {
        self.show_model_picker = true;
        self.models_loading = true;

        let client = self.client.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let models = client.list_models().await.map_err(|e| e.to_string());
            let _ = events.send(AppEvent::ModelsLoaded(models));
        });
    }

    pub fn models_loaded(&mut self, models: Result<Vec<String>, String>) {
        self.models_loading = false;
        match models {
            Ok(models) => {
                let current = models.iter().position(|m| *m == self.config.model);
                self.model_picker_state.select(current.or(Some(0)).filter(|_| !models.is_empty()));
                self.available_models = models;
            }
            Err(err) => {
                self.show_model_picker = false;
                self.status = Some(format!("Error listing models: {}", err));
            }
        }
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.config.model = model.clone();
                self.show_model_picker = false;
                self.status = Some(format!("Model: {}", model));
                // Save to config
                if let Err(err) = Config::save_default_model(model) {
                    debug!(error = %err, "could not save default model");
                }
            }
        }
    }
}
