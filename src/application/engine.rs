use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    Cents, Transaction, TransactionId, TransactionStatus, TransactionType, UserId, Wallet,
};
use crate::storage::{HistoryFilter, LedgerStore, UnitOfWork};

use super::AppError;

/// History pages are capped regardless of what the caller asks for.
pub const MAX_HISTORY_LIMIT: u32 = 100;
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Transfer request as it reaches the engine. The boundary layer may have
/// validated the amount already; the engine re-validates anyway.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferInput {
    pub to_user: UserId,
    pub amount_cents: Cents,
}

/// History query: 1-based page, optional status/type filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<TransactionStatus>,
    pub tx_type: Option<TransactionType>,
}

/// Projection of a committed transaction returned by `transfer`/`reverse`.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount_cents: Cents,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            from_user: tx.from_user,
            to_user: tx.to_user,
            amount_cents: tx.amount_cents,
            status: tx.status,
            tx_type: tx.tx_type,
            created_at: tx.created_at,
        }
    }
}

/// History projection: the transaction plus its reversal state.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: TransactionId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub amount_cents: Cents,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub reversed: bool,
    pub reversed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for HistoryEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            from_user: tx.from_user,
            to_user: tx.to_user,
            amount_cents: tx.amount_cents,
            status: tx.status,
            tx_type: tx.tx_type,
            reversed: tx.reversed,
            reversed_at: tx.reversed_at,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionHistory {
    pub transactions: Vec<HistoryEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletView {
    pub user_id: UserId,
    pub balance_cents: Cents,
    pub updated_at: DateTime<Utc>,
}

impl From<&Wallet> for WalletView {
    fn from(wallet: &Wallet) -> Self {
        Self {
            user_id: wallet.user_id,
            balance_cents: wallet.balance_cents,
            updated_at: wallet.updated_at,
        }
    }
}

/// The core of the service: orchestrates transfers, reversals and history
/// over the injected store, enforcing every business invariant before the
/// atomic unit and relying on the store's conditional writes inside it.
pub struct LedgerEngine<S> {
    store: S,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Move `amount_cents` from `from_user` to the recipient named in the
    /// input. All validation happens before the atomic unit; the unit does
    /// decrement + increment + COMPLETED, all-or-nothing.
    pub async fn transfer(
        &self,
        from_user: UserId,
        input: TransferInput,
    ) -> Result<TransactionView, AppError> {
        if input.amount_cents <= 0 {
            return Err(AppError::InvalidAmount(input.amount_cents));
        }

        self.store
            .find_user(input.to_user)
            .await?
            .ok_or(AppError::UserNotFound(input.to_user))?;

        if from_user == input.to_user {
            return Err(AppError::SelfTransfer);
        }

        let sender_wallet = self
            .store
            .find_wallet(from_user)
            .await?
            .ok_or(AppError::WalletNotFound(from_user))?;

        // Advisory point-in-time check; the conditional decrement inside
        // the unit is what actually keeps the balance non-negative.
        if !sender_wallet.can_cover(input.amount_cents) {
            return Err(AppError::InsufficientFunds {
                user_id: from_user,
                balance: sender_wallet.balance_cents,
                required: input.amount_cents,
            });
        }

        self.store
            .find_wallet(input.to_user)
            .await?
            .ok_or(AppError::WalletNotFound(input.to_user))?;

        let pending = Transaction::new(
            from_user,
            input.to_user,
            input.amount_cents,
            TransactionType::Transfer,
        );
        self.store.insert_transaction(&pending).await?;

        let completed = self
            .run_movement(&pending, from_user, input.to_user, None)
            .await?;

        info!(
            transaction_id = %completed.id,
            from_user = %from_user,
            to_user = %input.to_user,
            amount_cents = input.amount_cents,
            "transfer completed"
        );

        Ok(TransactionView::from(&completed))
    }

    /// Undo a completed transfer by recording a compensating REVERSAL.
    /// Only the original sender may reverse; a transaction is reversible at
    /// most once, and reversals themselves never are.
    pub async fn reverse(
        &self,
        transaction_id: TransactionId,
        requesting_user: UserId,
    ) -> Result<TransactionView, AppError> {
        let original = self
            .store
            .find_transaction(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;

        if original.from_user != requesting_user {
            return Err(AppError::Forbidden(transaction_id));
        }

        if original.reversed {
            return Err(AppError::AlreadyReversed(transaction_id));
        }

        if original.status != TransactionStatus::Completed {
            return Err(AppError::NotReversible {
                id: transaction_id,
                status: original.status,
            });
        }

        if original.tx_type != TransactionType::Transfer {
            return Err(AppError::ReversalOfReversal(transaction_id));
        }

        // The recipient is the party holding the funds now.
        let recipient_wallet = self
            .store
            .find_wallet(original.to_user)
            .await?
            .ok_or(AppError::WalletNotFound(original.to_user))?;

        self.store
            .find_wallet(original.from_user)
            .await?
            .ok_or(AppError::WalletNotFound(original.from_user))?;

        if !recipient_wallet.can_cover(original.amount_cents) {
            return Err(AppError::InsufficientFunds {
                user_id: original.to_user,
                balance: recipient_wallet.balance_cents,
                required: original.amount_cents,
            });
        }

        let pending = original.reversal();
        self.store.insert_transaction(&pending).await?;

        let completed = self
            .run_movement(
                &pending,
                original.to_user,
                original.from_user,
                Some(original.id),
            )
            .await?;

        info!(
            reversal_id = %completed.id,
            original_id = %original.id,
            amount_cents = original.amount_cents,
            "transfer reversed"
        );

        Ok(TransactionView::from(&completed))
    }

    /// Paginated transaction history for a user (sent and received),
    /// newest first, optionally filtered by status and type.
    pub async fn history(
        &self,
        user_id: UserId,
        query: HistoryQuery,
    ) -> Result<TransactionHistory, AppError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let filter = HistoryFilter {
            user_id,
            status: query.status,
            tx_type: query.tx_type,
            page,
            limit,
        };

        let transactions = self.store.list_transactions(&filter).await?;
        let total = self.store.count_transactions(&filter).await?;
        // Ceiling division; yields 0 pages for an empty result set
        let limit_i64 = i64::from(limit);
        let total_pages = (total + limit_i64 - 1) / limit_i64;

        debug!(user_id = %user_id, page, limit, total, "history queried");

        Ok(TransactionHistory {
            transactions: transactions.iter().map(HistoryEntry::from).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
            },
        })
    }

    /// Current balance projection for a user's wallet.
    pub async fn balance(&self, user_id: UserId) -> Result<WalletView, AppError> {
        let wallet = self
            .store
            .find_wallet(user_id)
            .await?
            .ok_or(AppError::WalletNotFound(user_id))?;
        Ok(WalletView::from(&wallet))
    }

    /// Run the wallet movements for an already-persisted PENDING row inside
    /// one atomic unit and advance it to COMPLETED. On any in-unit failure
    /// the unit rolls back and the row is marked FAILED best-effort in a
    /// separate write before the failure is re-raised.
    async fn run_movement(
        &self,
        pending: &Transaction,
        debit_user: UserId,
        credit_user: UserId,
        reverses: Option<TransactionId>,
    ) -> Result<Transaction, AppError> {
        let mut uow = self.store.begin().await?;

        let unit_result = async {
            uow.decrement_balance(debit_user, pending.amount_cents)
                .await?;
            uow.increment_balance(credit_user, pending.amount_cents)
                .await?;
            if let Some(original_id) = reverses {
                uow.mark_reversed(original_id, Utc::now()).await?;
            }
            uow.update_status(pending.id, TransactionStatus::Completed)
                .await
        }
        .await;

        match unit_result {
            Ok(completed) => {
                uow.commit().await?;
                Ok(completed)
            }
            Err(err) => {
                // Rollback, then the compensating FAILED marker outside of
                // the aborted unit. If the marker write fails too the row
                // stays PENDING; reconciliation is out of scope here.
                drop(uow);
                if let Err(mark_err) = self
                    .store
                    .update_transaction_status(pending.id, TransactionStatus::Failed)
                    .await
                {
                    warn!(
                        transaction_id = %pending.id,
                        error = %mark_err,
                        "could not mark aborted transaction as FAILED"
                    );
                }
                Err(err.into())
            }
        }
    }
}
