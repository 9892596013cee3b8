use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Cents, Transaction, TransactionId, TransactionStatus, TransactionType, User, UserId, Wallet,
};

use super::{
    AtomicExecutor, HistoryFilter, MIGRATION_001_INITIAL, StoreError, TransactionStore,
    UnitOfWork, UserLookup, WalletStore,
};

const TRANSACTION_COLUMNS: &str =
    "id, from_user_id, to_user_id, amount_cents, tx_type, status, reversed, reversed_at, created_at";

/// SQLite-backed store for users, wallets and transactions. Implements the
/// capability traits the ledger engine is constructed with.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User / wallet provisioning (registration and seed path; the ledger
    // engine never creates users or wallets, it only reads and adjusts them)
    // ========================

    /// Create a user together with their wallet in one unit.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        opening_balance_cents: Cents,
    ) -> Result<User> {
        let user = User::new(email, name);
        let wallet = Wallet::new(user.id, opening_balance_cents);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query("INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .context("Failed to save user")?;

        sqlx::query("INSERT INTO wallets (user_id, balance_cents, updated_at) VALUES (?, ?, ?)")
            .bind(wallet.user_id.to_string())
            .bind(wallet.balance_cents)
            .bind(wallet.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .context("Failed to save wallet")?;

        tx.commit().await.context("Failed to commit user creation")?;
        Ok(user)
    }

    /// Look up a user by email (registration path).
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        match row {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }
}

impl UserLookup for Repository {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        match row {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }
}

impl WalletStore for Repository {
    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, balance_cents, updated_at FROM wallets WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch wallet")?;

        match row {
            Some(row) => Ok(Some(row_to_wallet(&row)?)),
            None => Ok(None),
        }
    }
}

impl TransactionStore for Repository {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, from_user_id, to_user_id, amount_cents, tx_type, status, reversed, reversed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(tx.from_user.to_string())
        .bind(tx.to_user.to_string())
        .bind(tx.amount_cents)
        .bind(tx.tx_type.as_str())
        .bind(tx.status.as_str())
        .bind(tx.reversed)
        .bind(tx.reversed_at.map(|dt| dt.to_rfc3339()))
        .bind(tx.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save transaction")?;

        Ok(())
    }

    async fn find_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, StoreError> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        match row {
            Some(row) => Ok(Some(row_to_transaction(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let query = format!(
            "UPDATE transactions SET status = ? WHERE id = ? RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(status.as_str())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update transaction status")?;

        match row {
            Some(row) => Ok(row_to_transaction(&row)?),
            None => Err(StoreError::TransactionMissing(id)),
        }
    }

    async fn list_transactions(
        &self,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE (from_user_id = ? OR to_user_id = ?)"
        );
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        if filter.tx_type.is_some() {
            query.push_str(" AND tx_type = ?");
        }
        // rowid breaks ties between rows created within the same second
        query.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?");

        let user_id_str = filter.user_id.to_string();
        let mut sql_query = sqlx::query(&query).bind(&user_id_str).bind(&user_id_str);
        if let Some(status) = filter.status {
            sql_query = sql_query.bind(status.as_str());
        }
        if let Some(tx_type) = filter.tx_type {
            sql_query = sql_query.bind(tx_type.as_str());
        }

        let offset = i64::from(filter.page.max(1) - 1) * i64::from(filter.limit);
        let rows = sql_query
            .bind(i64::from(filter.limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        Ok(rows
            .iter()
            .map(row_to_transaction)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn count_transactions(&self, filter: &HistoryFilter) -> Result<i64, StoreError> {
        let mut query = String::from(
            "SELECT COUNT(*) as count FROM transactions WHERE (from_user_id = ? OR to_user_id = ?)",
        );
        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        if filter.tx_type.is_some() {
            query.push_str(" AND tx_type = ?");
        }

        let user_id_str = filter.user_id.to_string();
        let mut sql_query = sqlx::query(&query).bind(&user_id_str).bind(&user_id_str);
        if let Some(status) = filter.status {
            sql_query = sql_query.bind(status.as_str());
        }
        if let Some(tx_type) = filter.tx_type {
            sql_query = sql_query.bind(tx_type.as_str());
        }

        let row = sql_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?;

        Ok(row.get("count"))
    }
}

impl AtomicExecutor for Repository {
    type Uow = SqliteUnitOfWork;

    async fn begin(&self) -> Result<SqliteUnitOfWork, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin atomic unit")?;
        Ok(SqliteUnitOfWork { tx })
    }
}

/// One SQLite transaction. Dropping it without `commit` rolls back.
pub struct SqliteUnitOfWork {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl UnitOfWork for SqliteUnitOfWork {
    async fn decrement_balance(
        &mut self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<(), StoreError> {
        // The `balance_cents >= ?` guard is the authoritative non-negativity
        // check; the advisory read the engine did before entering the unit
        // may be stale under concurrent drains.
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance_cents = balance_cents - ?, updated_at = ?
            WHERE user_id = ? AND balance_cents >= ?
            "#,
        )
        .bind(amount)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.to_string())
        .bind(amount)
        .execute(&mut *self.tx)
        .await
        .context("Failed to decrement balance")?;

        if result.rows_affected() == 0 {
            let row = sqlx::query("SELECT balance_cents FROM wallets WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&mut *self.tx)
                .await
                .context("Failed to re-read wallet")?;

            return Err(match row {
                Some(row) => StoreError::BalanceTooLow {
                    user_id,
                    balance: row.get("balance_cents"),
                    requested: amount,
                },
                None => StoreError::WalletMissing(user_id),
            });
        }

        Ok(())
    }

    async fn increment_balance(
        &mut self,
        user_id: UserId,
        amount: Cents,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE wallets SET balance_cents = balance_cents + ?, updated_at = ? WHERE user_id = ?",
        )
        .bind(amount)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id.to_string())
        .execute(&mut *self.tx)
        .await
        .context("Failed to increment balance")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::WalletMissing(user_id));
        }

        Ok(())
    }

    async fn update_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let query = format!(
            "UPDATE transactions SET status = ? WHERE id = ? RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(status.as_str())
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to update transaction status")?;

        match row {
            Some(row) => Ok(row_to_transaction(&row)?),
            None => Err(StoreError::TransactionMissing(id)),
        }
    }

    async fn mark_reversed(
        &mut self,
        id: TransactionId,
        reversed_at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        // Conditional on the row still being reversible, so a racing second
        // reversal aborts here instead of flipping the flag twice.
        let query = format!(
            r#"
            UPDATE transactions
            SET reversed = 1, reversed_at = ?, status = 'REVERSED'
            WHERE id = ? AND reversed = 0 AND status = 'COMPLETED' AND tx_type = 'TRANSFER'
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(reversed_at.to_rfc3339())
            .bind(id.to_string())
            .fetch_optional(&mut *self.tx)
            .await
            .context("Failed to mark transaction as reversed")?;

        match row {
            Some(row) => Ok(row_to_transaction(&row)?),
            None => Err(StoreError::ReversalConflict(id)),
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .context("Failed to commit atomic unit")?;
        Ok(())
    }
}

// ========================
// Row mappers
// ========================

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");

    Ok(User {
        id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
        email: row.get("email"),
        name: row.get("name"),
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn row_to_wallet(row: &sqlx::sqlite::SqliteRow) -> Result<Wallet> {
    let user_id_str: String = row.get("user_id");
    let updated_at_str: String = row.get("updated_at");

    Ok(Wallet {
        user_id: Uuid::parse_str(&user_id_str).context("Invalid wallet user ID")?,
        balance_cents: row.get("balance_cents"),
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
    let id_str: String = row.get("id");
    let from_user_str: String = row.get("from_user_id");
    let to_user_str: String = row.get("to_user_id");
    let tx_type_str: String = row.get("tx_type");
    let status_str: String = row.get("status");
    let reversed_at_str: Option<String> = row.get("reversed_at");
    let created_at_str: String = row.get("created_at");

    Ok(Transaction {
        id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
        from_user: Uuid::parse_str(&from_user_str).context("Invalid from_user ID")?,
        to_user: Uuid::parse_str(&to_user_str).context("Invalid to_user ID")?,
        amount_cents: row.get("amount_cents"),
        tx_type: TransactionType::from_str(&tx_type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", tx_type_str))?,
        status: TransactionStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
        reversed: row.get::<i32, _>("reversed") != 0,
        reversed_at: reversed_at_str
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}
