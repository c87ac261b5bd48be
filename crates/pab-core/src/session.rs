use crate::domain::Candidate;

/// Per-operator moderation state: zero or one candidate awaiting a decision.
///
/// Owned by the polling loop and lent to the moderator for each update.
#[derive(Debug, Default)]
pub struct ModerationSession {
    current: Option<Candidate>,
}

impl ModerationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Candidate> {
        self.current.as_ref()
    }

    pub fn is_awaiting_decision(&self) -> bool {
        self.current.is_some()
    }

    /// Set the current candidate, returning the one it displaced.
    pub fn replace(&mut self, candidate: Candidate) -> Option<Candidate> {
        self.current.replace(candidate)
    }

    pub fn take(&mut self) -> Option<Candidate> {
        self.current.take()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
