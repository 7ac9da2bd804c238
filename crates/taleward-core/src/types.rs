//! Conversation types shared by the core and the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message
    pub role: Role,

    /// Message text
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Remove a trailing assistant message from the history.
///
/// Returns the history unchanged when the last message is not from the
/// assistant (or the history is empty).
pub fn strip_trailing_assistant(history: &[Message]) -> Vec<Message> {
    match history.split_last() {
        Some((last, rest)) if last.is_assistant() => rest.to_vec(),
        _ => history.to_vec(),
    }
}

/// Split system messages out of a request history.
///
/// Returns the content of the last system message (if any) and the
/// remaining user/assistant messages in their original order.
pub fn split_system(messages: &[Message]) -> (Option<String>, Vec<Message>) {
    let mut system = None;
    let mut others = Vec::with_capacity(messages.len());

    for msg in messages {
        if msg.role == Role::System {
            system = Some(msg.content.clone());
        } else {
            others.push(msg.clone());
        }
    }

    (system, others)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_removes_trailing_assistant() {
        let history = vec![
            Message::user("Start"),
            Message::assistant("Turn 1"),
            Message::user("Option 1"),
            Message::assistant("I can't continue this story."),
        ];

        let stripped = strip_trailing_assistant(&history);
        assert_eq!(stripped.len(), 3);
        assert_eq!(stripped.last().unwrap().content, "Option 1");
    }

    #[test]
    fn test_strip_keeps_history_ending_with_user() {
        let history = vec![Message::assistant("Turn 1"), Message::user("Option 2")];
        assert_eq!(strip_trailing_assistant(&history), history);
    }

    #[test]
    fn test_strip_empty_history() {
        assert!(strip_trailing_assistant(&[]).is_empty());
    }

    #[test]
    fn test_split_system_keeps_last_system() {
        let messages = vec![
            Message::system("first"),
            Message::user("hello"),
            Message::system("second"),
        ];

        let (system, others) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("second"));
        assert_eq!(others, vec![Message::user("hello")]);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
