/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Backing-store record id (Airtable `recXXXXXXXXXXXXXX`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(pub String);

/// A content item pending moderation.
///
/// `guid` is the stable identifier used for skip tracking; `record_id` only
/// addresses the row for partial updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub record_id: RecordId,
    pub guid: String,
    pub title: String,
    pub flags: ModerationFlags,
}

/// The boolean triple a decision writes back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModerationFlags {
    pub approved: bool,
    pub rejected: bool,
    pub under_investigation: bool,
}

impl ModerationFlags {
    pub const APPROVED: Self = Self {
        approved: true,
        rejected: false,
        under_investigation: false,
    };

    pub const REJECTED: Self = Self {
        approved: false,
        rejected: true,
        under_investigation: false,
    };

    /// Not approved, not rejected, not under investigation.
    pub fn is_pending(&self) -> bool {
        !self.approved && !self.rejected && !self.under_investigation
    }
}
