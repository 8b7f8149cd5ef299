//! Chat message types and dialog conversion

use serde::{Deserialize, Serialize};

/// Prepended when a dialog has an odd number of entries.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, rigorous science assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Convert a flat two-way dialog into chat messages.
///
/// The dialog is read as consecutive (context, request) pairs: the first of
/// each pair is sent with the system role, the second with the user role. An
/// odd-length dialog gets [`DEFAULT_SYSTEM_PROMPT`] in front so that it pairs
/// up.
pub fn to_messages(dialog: &[String]) -> Vec<ChatMessage> {
    let mut entries: Vec<&str> = Vec::with_capacity(dialog.len() + 1);
    if dialog.len() % 2 != 0 {
        entries.push(DEFAULT_SYSTEM_PROMPT);
    }
    entries.extend(dialog.iter().map(String::as_str));

    entries
        .chunks(2)
        .flat_map(|pair| [ChatMessage::system(pair[0]), ChatMessage::user(pair[1])])
        .collect()
}
