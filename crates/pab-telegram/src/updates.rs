//! Telegram update → core `IncomingUpdate` conversion.

use teloxide::types::{Message, Update, UpdateKind};

use pab_core::{
    commands::command_name,
    domain::{ChatId, UserId},
    messaging::types::{Command, IncomingUpdate, TextMessage},
};

/// Only plain messages matter; edits, callbacks and the rest are dropped.
pub fn incoming_from_update(update: &Update) -> Option<IncomingUpdate> {
    match &update.kind {
        UpdateKind::Message(msg) => Some(incoming_from_message(msg)),
        _ => None,
    }
}

/// Messages without text (stickers, photos) become empty text, which the
/// moderator treats as an unsupported button press.
pub fn incoming_from_message(msg: &Message) -> IncomingUpdate {
    let chat_id = ChatId(msg.chat.id.0);
    let user = msg.from();
    let user_id = user.map(|u| UserId(u.id.0 as i64));
    let username = user.and_then(|u| u.username.clone());
    let text = msg.text().unwrap_or("");

    if text.starts_with('/') {
        return IncomingUpdate::Command(Command {
            chat_id,
            user_id,
            username,
            name: command_name(text),
        });
    }

    IncomingUpdate::Text(TextMessage {
        chat_id,
        user_id,
        username,
        text: text.to_string(),
    })
}
