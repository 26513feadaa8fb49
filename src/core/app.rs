//! Runtime application state: the chat store, the HTTP session, stream
//! bookkeeping, and the UI state the event loop mutates.

use tokio_util::sync::CancellationToken;
use tracing::warn;
use tui_textarea::TextArea;

use crate::api;
use crate::core::chat::{Chat, ChatStore};
use crate::core::chat_stream::StreamParams;
use crate::core::message::Message;
use crate::core::store::ChatsFile;
use crate::logging::LoggingState;
use crate::ui::theme::Theme;

/// Where the in-flight stream writes. Addressed by ids rather than indices
/// so the user can switch or delete chats while tokens arrive.
struct StreamTarget {
    chat_id: String,
    message_id: i64,
}

/// Inline sidebar rename editor, active while the user edits a chat name.
pub struct RenameEditor {
    pub chat_id: String,
    pub buffer: String,
}

pub struct SessionSettings {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub theme: Theme,
    pub sidebar_visible: bool,
    pub log_file: Option<String>,
}

pub struct App {
    pub chats: ChatStore,
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub theme: Theme,
    pub logging: LoggingState,
    pub input: TextArea<'static>,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub sidebar_visible: bool,
    pub rename: Option<RenameEditor>,
    pub is_streaming: bool,
    pub exit_requested: bool,
    persistence: ChatsFile,
    stream_target: Option<StreamTarget>,
    current_stream_id: u64,
    cancel_token: CancellationToken,
}

fn new_textarea() -> TextArea<'static> {
    let mut input = TextArea::default();
    input.set_placeholder_text("Type your message...");
    input.set_cursor_line_style(ratatui::style::Style::default());
    input
}

impl App {
    pub fn new(settings: SessionSettings, persistence: ChatsFile, chats: Vec<Chat>) -> Self {
        Self {
            chats: ChatStore::from_chats(chats),
            client: reqwest::Client::new(),
            base_url: settings.base_url,
            api_key: settings.api_key,
            model: settings.model,
            theme: settings.theme,
            logging: LoggingState::new(settings.log_file),
            input: new_textarea(),
            scroll_offset: 0,
            auto_scroll: true,
            sidebar_visible: settings.sidebar_visible,
            rename: None,
            is_streaming: false,
            exit_requested: false,
            persistence,
            stream_target: None,
            current_stream_id: 0,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Mirror the chat list to disk. A failed save is logged and otherwise
    /// ignored; the in-memory state stays authoritative for the session.
    pub fn persist(&self) {
        if let Err(e) = self.persistence.save(self.chats.chats()) {
            warn!(error = %e, "failed to persist chats");
        }
    }

    pub fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    /// Take the composed input and turn it into a send: append the user
    /// message and an empty assistant message, supersede any in-flight
    /// stream, and return the relay parameters. Whitespace-only input is a
    /// no-op returning `None`.
    pub fn submit_input(&mut self) -> Option<StreamParams> {
        let text = self.input_text();
        if text.trim().is_empty() {
            return None;
        }
        self.input = new_textarea();

        let user = Message::user(text);
        if let Err(e) = self.logging.log_message(&format!("You: {}", user.content)) {
            warn!(error = %e, "transcript log write failed");
        }
        let user_id = self.chats.push_message(user);

        let mut assistant = Message::assistant("");
        // Both ids come from the same clock; nudge the assistant's forward
        // when they collide within a millisecond.
        if assistant.id <= user_id {
            assistant.id = user_id + 1;
        }
        let chat_id = self.chats.selected_chat().id.clone();
        let message_id = assistant.id;
        self.chats.push_message(assistant);
        self.stream_target = Some(StreamTarget {
            chat_id,
            message_id,
        });

        // A superseded stream is cancelled and its stream id retired, so a
        // late chunk can never land in the new assistant message.
        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
        self.current_stream_id += 1;
        self.is_streaming = true;
        self.auto_scroll = true;

        let messages = &self.chats.selected_chat().messages;
        let api_messages: Vec<api::ChatMessage> = messages[..messages.len() - 1]
            .iter()
            .filter_map(|message| {
                message.role.to_api_role().map(|role| api::ChatMessage {
                    role: role.to_string(),
                    content: message.content.clone(),
                })
            })
            .collect();

        self.persist();

        Some(StreamParams {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            api_messages,
            cancel_token: self.cancel_token.clone(),
            stream_id: self.current_stream_id,
        })
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.current_stream_id == stream_id
    }

    /// Append a streamed chunk to the in-progress assistant message. Chunks
    /// from a superseded stream are dropped.
    pub fn apply_stream_chunk(&mut self, stream_id: u64, chunk: &str) {
        if !self.is_current_stream(stream_id) {
            return;
        }
        if let Some(target) = &self.stream_target {
            let chat_id = target.chat_id.clone();
            let message_id = target.message_id;
            self.chats.append_to_message(&chat_id, message_id, chunk);
        }
    }

    /// Record a stream failure in the transcript of the chat that owns the
    /// stream. The session continues; there are no retries.
    pub fn handle_stream_error(&mut self, stream_id: u64, error: String) {
        if !self.is_current_stream(stream_id) {
            return;
        }
        warn!(stream_id, "stream failed");
        if let Some(target) = &self.stream_target {
            let chat_id = target.chat_id.clone();
            self.chats.push_message_to(&chat_id, Message::app_error(error));
        }
    }

    pub fn finish_stream(&mut self, stream_id: u64) {
        if !self.is_current_stream(stream_id) {
            return;
        }
        self.is_streaming = false;
        if let Some(target) = self.stream_target.take() {
            let content = self
                .chats
                .chats()
                .iter()
                .find(|chat| chat.id == target.chat_id)
                .and_then(|chat| {
                    chat.messages
                        .iter()
                        .rev()
                        .find(|message| message.id == target.message_id)
                })
                .map(|message| message.content.clone());
            if let Some(content) = content.filter(|c| !c.is_empty()) {
                if let Err(e) = self.logging.log_message(&content) {
                    warn!(error = %e, "transcript log write failed");
                }
            }
        }
        self.persist();
    }

    pub fn cancel_current_stream(&mut self) {
        self.cancel_token.cancel();
        if self.is_streaming {
            self.is_streaming = false;
            self.stream_target = None;
            self.persist();
        }
    }

    pub fn new_chat(&mut self) {
        self.chats.new_chat();
        self.reset_view();
        self.persist();
    }

    pub fn delete_selected_chat(&mut self) {
        let id = self.chats.selected_chat().id.clone();
        self.chats.delete_chat(&id);
        self.reset_view();
        self.persist();
    }

    pub fn select_previous_chat(&mut self) {
        self.chats.select_previous();
        self.reset_view();
    }

    pub fn select_next_chat(&mut self) {
        self.chats.select_next();
        self.reset_view();
    }

    pub fn begin_rename(&mut self) {
        let chat = self.chats.selected_chat();
        self.rename = Some(RenameEditor {
            chat_id: chat.id.clone(),
            buffer: chat.name.clone(),
        });
    }

    pub fn commit_rename(&mut self) {
        if let Some(editor) = self.rename.take() {
            self.chats.rename_chat(&editor.chat_id, &editor.buffer);
            self.persist();
        }
    }

    pub fn cancel_rename(&mut self) {
        self.rename = None;
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_visible = !self.sidebar_visible;
    }

    pub fn toggle_transcript_logging(&mut self) {
        let note = match self.logging.toggle() {
            Ok(status) => Message::app_info(status),
            Err(e) => Message::app_error(e.to_string()),
        };
        self.chats.push_message(note);
    }

    fn reset_view(&mut self) {
        self.scroll_offset = 0;
        self.auto_scroll = true;
        self.rename = None;
    }
}
