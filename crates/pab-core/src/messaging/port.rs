use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{CommandInfo, ReplyKeyboard},
    Result,
};

/// Outbound side of the chat platform.
///
/// Every method failing is treated as fatal by the moderator: a bot that
/// cannot talk to its only operator has nothing useful left to do.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn send_with_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &ReplyKeyboard,
    ) -> Result<MessageRef>;

    /// Register the command menu shown by the client.
    async fn set_commands(&self, commands: &[CommandInfo]) -> Result<()>;
}
