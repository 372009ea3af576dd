//! Transfer notifications delivered by the event feed.

use serde::{Deserialize, Serialize};

use crate::identity::{Address, SequenceNumber};

/// One `(from, to, token_id)` notification from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub token_id: SequenceNumber,
}

impl TransferEvent {
    pub fn new(from: Address, to: Address, token_id: impl Into<SequenceNumber>) -> Self {
        Self {
            from,
            to,
            token_id: token_id.into(),
        }
    }

    /// A mint issued to `to`.
    pub fn mint(to: Address, token_id: impl Into<SequenceNumber>) -> Self {
        Self::new(Address::ZERO, to, token_id)
    }

    /// Mints originate from the null address; everything else moves an
    /// already-minted unit between owners.
    pub fn is_mint(&self) -> bool {
        self.from.is_zero()
    }
}
