//! The answer to "is token N minted?", carrying how it was produced.

use mintwatch_core::SequenceNumber;

/// How the resolver arrived at an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePath {
    /// Answered from a warm watermark without suspending.
    Warm,
    /// This call issued the counter query.
    ColdIssued,
    /// This call joined a counter query issued by another caller.
    ColdJoined,
}

/// Result of a membership check.
///
/// `watermark` is the value the answer was computed against: the store's
/// value on the warm path, or the counter query's own result on the cold
/// path (even if the store has since moved on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintCheck {
    pub token_id: SequenceNumber,
    pub minted: bool,
    pub watermark: SequenceNumber,
    pub path: ResolvePath,
}

impl MintCheck {
    pub fn new(token_id: SequenceNumber, watermark: SequenceNumber, path: ResolvePath) -> Self {
        Self {
            token_id,
            minted: watermark.covers(token_id),
            watermark,
            path,
        }
    }

    pub fn is_minted(&self) -> bool {
        self.minted
    }

    /// Whether a counter query was waited on to produce this answer.
    pub fn was_cold(&self) -> bool {
        !matches!(self.path, ResolvePath::Warm)
    }
}
