use crate::domain::{ChatId, UserId};

/// Platform-agnostic incoming update.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
}

impl IncomingUpdate {
    pub fn chat_id(&self) -> ChatId {
        match self {
            IncomingUpdate::Command(c) => c.chat_id,
            IncomingUpdate::Text(t) => t.chat_id,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            IncomingUpdate::Command(c) => c.user_id,
            IncomingUpdate::Text(t) => t.user_id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            IncomingUpdate::Command(c) => c.username.as_deref(),
            IncomingUpdate::Text(t) => t.username.as_deref(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    /// Lowercased, without the leading `/` and any `@botname` suffix.
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub text: String,
}

/// Outgoing reply: plain text plus an optional reply keyboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<ReplyKeyboard>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: ReplyKeyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// Reply keyboard: rows of button labels. Pressing a button sends its label
/// back as plain text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    /// Hide the keyboard after the first press.
    pub one_time: bool,
}

/// Entry of the command menu registered with the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub command: &'static str,
    pub description: &'static str,
}
