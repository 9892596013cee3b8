use thiserror::Error;

use crate::domain::{Cents, TransactionId, TransactionStatus, UserId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Wallet not found for user: {0}")]
    WalletNotFound(UserId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    #[error("Invalid amount: {0} cents (must be positive)")]
    InvalidAmount(Cents),

    #[error("Insufficient funds for user {user_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Cents,
        required: Cents,
    },

    #[error("Transaction {0} has already been reversed")]
    AlreadyReversed(TransactionId),

    #[error("Only completed transactions can be reversed (transaction {id} is {status})")]
    NotReversible {
        id: TransactionId,
        status: TransactionStatus,
    },

    #[error("Only transfers can be reversed (transaction {0} is a reversal)")]
    ReversalOfReversal(TransactionId),

    #[error("Only the original sender may reverse transaction {0}")]
    Forbidden(TransactionId),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WalletMissing(user_id) => AppError::WalletNotFound(user_id),
            StoreError::TransactionMissing(id) => AppError::TransactionNotFound(id),
            StoreError::BalanceTooLow {
                user_id,
                balance,
                requested,
            } => AppError::InsufficientFunds {
                user_id,
                balance,
                required: requested,
            },
            StoreError::ReversalConflict(id) => AppError::AlreadyReversed(id),
            StoreError::Backend(err) => AppError::Database(err),
        }
    }
}
