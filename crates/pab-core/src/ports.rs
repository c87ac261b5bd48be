use async_trait::async_trait;

use crate::{
    domain::{Candidate, ModerationFlags, RecordId},
    Result,
};

/// Port for the spreadsheet-like backing store holding the candidates.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Records that are neither approved, rejected nor under investigation,
    /// in the store's view order.
    async fn pending_candidates(&self) -> Result<Vec<Candidate>>;

    /// Partial update of the three moderation flags of one record.
    async fn update_flags(&self, record: &RecordId, flags: ModerationFlags) -> Result<()>;
}
