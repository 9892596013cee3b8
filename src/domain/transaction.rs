use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// A movement of funds from one user's wallet to another's
    Transfer,
    /// A compensating opposite-direction movement undoing a prior transfer
    Reversal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Reversal => "REVERSAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "TRANSFER" => Some(TransactionType::Transfer),
            "REVERSAL" => Some(TransactionType::Reversal),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    /// Created, wallet movements not yet committed
    Pending,
    /// Wallet movements committed
    Completed,
    /// The atomic unit aborted; no wallet movement persisted
    Failed,
    /// A completed transfer later undone by a reversal
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Reversed => "REVERSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            "REVERSED" => Some(TransactionStatus::Reversed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded movement of funds. Immutable once COMPLETED, except for the
/// `reversed`/`reversed_at` pair which is set exactly once when a reversal
/// lands. A REVERSAL row references the original only implicitly: swapped
/// users and the same amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Wallet the amount leaves
    pub from_user: UserId,
    /// Wallet the amount enters
    pub to_user: UserId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    /// Flips false -> true at most once, and only while COMPLETED
    pub reversed: bool,
    pub reversed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new PENDING transaction. The status is advanced by the
    /// repository inside (or, for FAILED, after) the atomic unit.
    pub fn new(
        from_user: UserId,
        to_user: UserId,
        amount_cents: Cents,
        tx_type: TransactionType,
    ) -> Self {
        assert!(amount_cents > 0, "Transaction amount must be positive");
        Self {
            id: Uuid::new_v4(),
            from_user,
            to_user,
            amount_cents,
            tx_type,
            status: TransactionStatus::Pending,
            reversed: false,
            reversed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Build the compensating REVERSAL for this transfer: swapped users,
    /// same amount. Eligibility (status, type, not already reversed) is the
    /// engine's job.
    pub fn reversal(&self) -> Self {
        Transaction::new(
            self.to_user,
            self.from_user,
            self.amount_cents,
            TransactionType::Reversal,
        )
    }

    pub fn is_reversal(&self) -> bool {
        self.tx_type == TransactionType::Reversal
    }
}
