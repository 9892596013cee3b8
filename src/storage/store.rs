//! Store contracts the ledger engine depends on. The engine is generic over
//! these capabilities and receives a concrete implementation by constructor
//! injection; `storage::Repository` is the sqlx/SQLite one.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    Cents, Transaction, TransactionId, TransactionStatus, TransactionType, User, UserId, Wallet,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("No wallet for user {0}")]
    WalletMissing(UserId),

    #[error("No transaction with id {0}")]
    TransactionMissing(TransactionId),

    #[error("Balance of user {user_id} is {balance} cents, cannot move {requested} cents")]
    BalanceTooLow {
        user_id: UserId,
        balance: Cents,
        requested: Cents,
    },

    #[error("Transaction {0} is not eligible for reversal anymore")]
    ReversalConflict(TransactionId),

    #[error("Database error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Filters for the paginated transaction history. `page` is 1-based; `count`
/// implementations ignore `page`/`limit`.
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    pub user_id: UserId,
    pub status: Option<TransactionStatus>,
    pub tx_type: Option<TransactionType>,
    pub page: u32,
    pub limit: u32,
}

#[allow(async_fn_in_trait)]
pub trait UserLookup {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait WalletStore {
    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait TransactionStore {
    /// Persist a freshly built (PENDING) transaction row. This write is
    /// durable on its own so a later FAILED marker has a row to land on
    /// even after the atomic unit rolled back.
    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StoreError>;

    async fn find_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError>;

    /// Rows where the user is sender or recipient, newest first.
    async fn list_transactions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn count_transactions(&self, filter: &HistoryFilter) -> Result<i64, StoreError>;
}

/// All-or-nothing scope for a group of wallet and transaction writes.
/// Dropping the handle without `commit` rolls every write back.
#[allow(async_fn_in_trait)]
pub trait UnitOfWork {
    /// Conditional decrement: fails with `BalanceTooLow` instead of letting
    /// the balance go negative, which makes it the authoritative balance
    /// check under concurrent drains from the same wallet.
    async fn decrement_balance(
        &mut self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<(), StoreError>;

    async fn increment_balance(
        &mut self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<(), StoreError>;

    async fn update_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError>;

    /// Flip `reversed` exactly once. Conditional on the row still being a
    /// COMPLETED, not-yet-reversed row; fails with `ReversalConflict`
    /// otherwise, aborting the unit.
    async fn mark_reversed(
        &mut self,
        id: TransactionId,
        reversed_at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

#[allow(async_fn_in_trait)]
pub trait AtomicExecutor {
    type Uow: UnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, StoreError>;
}

/// The full capability set the engine is constructed with.
pub trait LedgerStore: UserLookup + WalletStore + TransactionStore + AtomicExecutor {}

impl<T: UserLookup + WalletStore + TransactionStore + AtomicExecutor> LedgerStore for T {}
