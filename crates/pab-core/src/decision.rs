use crate::messaging::types::ReplyKeyboard;

/// Reply-keyboard buttons offered with every candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Approve,
    Reject,
    Skip,
}

impl Button {
    pub const ALL: [Button; 3] = [Button::Approve, Button::Reject, Button::Skip];

    pub fn label(self) -> &'static str {
        match self {
            Button::Approve => "✔️ Approve",
            Button::Reject => "❌ Reject",
            Button::Skip => "👀 Skip",
        }
    }

    /// Exact match only; labels are what the client echoes back verbatim.
    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.label() == text)
    }
}

/// What the operator decided about the current candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Skip,
    Unsupported,
}

impl Decision {
    pub fn from_text(text: &str) -> Self {
        match Button::from_label(text) {
            Some(Button::Approve) => Decision::Approve,
            Some(Button::Reject) => Decision::Reject,
            Some(Button::Skip) => Decision::Skip,
            None => Decision::Unsupported,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Skip => "skip",
            Decision::Unsupported => "unsupported",
        }
    }
}

/// Approve and Reject on the first row, Skip on its own below.
pub fn decision_keyboard() -> ReplyKeyboard {
    ReplyKeyboard {
        rows: vec![
            vec![
                Button::Approve.label().to_string(),
                Button::Reject.label().to_string(),
            ],
            vec![Button::Skip.label().to_string()],
        ],
        one_time: true,
    }
}
