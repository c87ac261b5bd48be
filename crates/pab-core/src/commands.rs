use crate::messaging::types::CommandInfo;

/// Commands the bot understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    GetPost,
    Help,
    Status,
    Unknown(String),
}

impl BotCommand {
    /// Menu registered with the chat platform at startup.
    pub const MENU: [CommandInfo; 3] = [
        CommandInfo {
            command: "getpost",
            description: "Get post",
        },
        CommandInfo {
            command: "status",
            description: "Bot status",
        },
        CommandInfo {
            command: "help",
            description: "Show help",
        },
    ];

    /// `name` as produced by [`command_name`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "start" => BotCommand::Start,
            "getpost" => BotCommand::GetPost,
            "help" => BotCommand::Help,
            "status" => BotCommand::Status,
            other => BotCommand::Unknown(other.to_string()),
        }
    }
}

/// `/cmd@botname anything` -> `cmd`. None of the commands take arguments,
/// so trailing text is ignored.
pub fn command_name(text: &str) -> String {
    let first = text.split_whitespace().next().unwrap_or("");
    first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}
