use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, UserId};

/// A user's single balance record, one-to-one with the user. The balance is
/// never negative at a committed state; the store enforces that with a
/// CHECK constraint and a conditional decrement, so this type only carries
/// the invariant, it does not defend it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance_cents: Cents,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: UserId, opening_balance_cents: Cents) -> Self {
        assert!(
            opening_balance_cents >= 0,
            "Opening balance must not be negative"
        );
        Self {
            user_id,
            balance_cents: opening_balance_cents,
            updated_at: Utc::now(),
        }
    }

    /// Advisory check used before entering the atomic unit. The store's
    /// conditional decrement remains authoritative under concurrency.
    pub fn can_cover(&self, amount_cents: Cents) -> bool {
        self.balance_cents >= amount_cents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_can_cover() {
        let wallet = Wallet::new(Uuid::new_v4(), 100_000);
        assert!(wallet.can_cover(100_000));
        assert!(wallet.can_cover(1));
        assert!(!wallet.can_cover(100_001));
    }

    #[test]
    #[should_panic(expected = "Opening balance must not be negative")]
    fn test_negative_opening_balance_rejected() {
        Wallet::new(Uuid::new_v4(), -1);
    }
}
