//! Multi-chat state: the list of conversations shown in the sidebar and the
//! selection that drives the transcript pane.
//!
//! The list is never empty. Deleting the final chat immediately creates a
//! fresh replacement, and message order within a chat is append-only.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::message::Message;

pub const DEFAULT_CHAT_NAME: &str = "New Chat";

static CHAT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Timestamp-derived chat id. The per-process counter keeps two chats
/// created within the same millisecond distinct.
fn next_chat_id() -> String {
    let seq = CHAT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", Utc::now().timestamp_millis(), seq)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn new() -> Self {
        Self {
            id: next_chat_id(),
            name: DEFAULT_CHAT_NAME.to_string(),
            messages: Vec::new(),
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ChatStore {
    chats: Vec<Chat>,
    selected: usize,
}

impl ChatStore {
    /// Build a store from a persisted chat list. An empty list yields exactly
    /// one fresh chat; the first chat is selected either way.
    pub fn from_chats(mut chats: Vec<Chat>) -> Self {
        if chats.is_empty() {
            chats.push(Chat::new());
        }
        Self { chats, selected: 0 }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_chat(&self) -> &Chat {
        &self.chats[self.selected]
    }

    pub fn selected_chat_mut(&mut self) -> &mut Chat {
        &mut self.chats[self.selected]
    }

    /// Append a fresh chat and select it.
    pub fn new_chat(&mut self) -> &Chat {
        self.chats.push(Chat::new());
        self.selected = self.chats.len() - 1;
        self.selected_chat()
    }

    /// Remove a chat by id. If the list would become empty a replacement is
    /// created; selection falls back to the first chat.
    pub fn delete_chat(&mut self, id: &str) {
        self.chats.retain(|chat| chat.id != id);
        if self.chats.is_empty() {
            self.chats.push(Chat::new());
        }
        self.selected = 0;
    }

    /// Rename a chat, leaving its message history untouched. Blank names are
    /// rejected so a chat can never become unlabeled in the sidebar.
    pub fn rename_chat(&mut self, id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == id) {
            chat.name = name.to_string();
        }
    }

    pub fn select(&mut self, id: &str) -> bool {
        match self.chats.iter().position(|chat| chat.id == id) {
            Some(index) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.chats.len() {
            self.selected += 1;
        }
    }

    /// Append a message to the selected chat and return its id.
    pub fn push_message(&mut self, message: Message) -> i64 {
        let id = message.id;
        self.selected_chat_mut().messages.push(message);
        id
    }

    /// Accumulate a streamed chunk into the addressed message. Searches from
    /// the back since the stream target is almost always the newest message.
    pub fn append_to_message(&mut self, chat_id: &str, message_id: i64, chunk: &str) {
        if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id) {
            if let Some(message) = chat
                .messages
                .iter_mut()
                .rev()
                .find(|message| message.id == message_id)
            {
                message.content.push_str(chunk);
            }
        }
    }

    /// Append a message to an arbitrary chat (used for stream errors that
    /// land after the user has switched away).
    pub fn push_message_to(&mut self, chat_id: &str, message: Message) {
        if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id) {
            chat.messages.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;

    #[test]
    fn empty_persisted_list_yields_exactly_one_chat() {
        let store = ChatStore::from_chats(Vec::new());
        assert_eq!(store.chats().len(), 1);
        assert_eq!(store.selected_chat().name, DEFAULT_CHAT_NAME);
        assert!(store.selected_chat().messages.is_empty());
    }

    #[test]
    fn deleting_the_last_chat_creates_a_replacement() {
        let mut store = ChatStore::from_chats(Vec::new());
        let id = store.selected_chat().id.clone();
        store.delete_chat(&id);
        assert_eq!(store.chats().len(), 1);
        assert_ne!(store.chats()[0].id, id);
    }

    #[test]
    fn deleting_a_chat_selects_the_first_remaining_one() {
        let mut store = ChatStore::from_chats(Vec::new());
        store.new_chat();
        let second = store.new_chat().id.clone();
        assert_eq!(store.selected_index(), 2);
        store.delete_chat(&second);
        assert_eq!(store.chats().len(), 2);
        assert_eq!(store.selected_index(), 0);
    }

    #[test]
    fn renaming_updates_only_that_chat_and_preserves_history() {
        let mut store = ChatStore::from_chats(Vec::new());
        store.push_message(Message::user("hello"));
        let first = store.selected_chat().id.clone();
        let second = store.new_chat().id.clone();

        store.rename_chat(&first, "Rust questions");

        let chats = store.chats();
        assert_eq!(chats[0].name, "Rust questions");
        assert_eq!(chats[0].messages.len(), 1);
        assert_eq!(chats[0].messages[0].content, "hello");
        assert_eq!(
            chats.iter().find(|c| c.id == second).unwrap().name,
            DEFAULT_CHAT_NAME
        );
    }

    #[test]
    fn blank_rename_is_a_no_op() {
        let mut store = ChatStore::from_chats(Vec::new());
        let id = store.selected_chat().id.clone();
        store.rename_chat(&id, "   ");
        assert_eq!(store.selected_chat().name, DEFAULT_CHAT_NAME);
    }

    #[test]
    fn chunks_concatenate_in_arrival_order() {
        let mut store = ChatStore::from_chats(Vec::new());
        let chat_id = store.selected_chat().id.clone();
        let message_id = store.push_message(Message::assistant(""));

        for chunk in ["Hel", "lo, ", "wor", "ld!"] {
            store.append_to_message(&chat_id, message_id, chunk);
        }

        assert_eq!(store.selected_chat().messages[0].content, "Hello, world!");
    }

    #[test]
    fn chunks_for_unknown_targets_are_dropped() {
        let mut store = ChatStore::from_chats(Vec::new());
        let chat_id = store.selected_chat().id.clone();
        let message_id = store.push_message(Message::assistant("kept"));

        store.append_to_message("no-such-chat", message_id, "x");
        store.append_to_message(&chat_id, message_id + 1, "x");

        assert_eq!(store.selected_chat().messages[0].content, "kept");
    }

    #[test]
    fn chat_ids_are_unique_within_a_millisecond() {
        let a = Chat::new();
        let b = Chat::new();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn selection_moves_are_clamped_at_the_ends() {
        let mut store = ChatStore::from_chats(Vec::new());
        store.select_previous();
        assert_eq!(store.selected_index(), 0);
        store.new_chat();
        store.select_next();
        assert_eq!(store.selected_index(), 1);
        store.select_previous();
        assert_eq!(store.selected_index(), 0);
    }

    #[test]
    fn messages_are_append_only_in_order() {
        let mut store = ChatStore::from_chats(Vec::new());
        store.push_message(Message::user("one"));
        store.push_message(Message::assistant("two"));
        store.push_message(Message::user("three"));
        let roles: Vec<Role> = store
            .selected_chat()
            .messages
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    }
}
