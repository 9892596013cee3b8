use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{HistoryQuery, LedgerEngine, TransferInput};
use crate::domain::{TransactionStatus, TransactionType, format_cents, parse_cents};
use crate::storage::Repository;

/// Centavo - wallet-to-wallet ledger
#[derive(Parser)]
#[command(name = "centavo")]
#[command(about = "A wallet-to-wallet ledger with atomic transfers and one-shot reversals")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "centavo.db")]
    pub database: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a user with a wallet
    AddUser {
        email: String,

        #[arg(long)]
        name: String,

        /// Opening balance (e.g., "1000.00"), defaults to zero
        #[arg(long, default_value = "0")]
        balance: String,
    },

    /// Show a user's wallet balance
    Balance {
        /// User ID
        user: String,
    },

    /// Transfer funds between two users
    Transfer {
        /// Amount to transfer (e.g., "100.50")
        amount: String,

        /// Sender user ID
        #[arg(long)]
        from: String,

        /// Recipient user ID
        #[arg(long)]
        to: String,
    },

    /// Reverse a completed transfer (sender only)
    Reverse {
        /// Transaction ID to reverse
        id: String,

        /// Requesting user ID (must be the original sender)
        #[arg(long)]
        user: String,
    },

    /// Show a user's transaction history
    History {
        /// User ID
        user: String,

        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Transactions per page (capped at 100)
        #[arg(long, default_value = "10")]
        limit: u32,

        /// Filter by status: PENDING, COMPLETED, FAILED, REVERSED
        #[arg(long)]
        status: Option<String>,

        /// Filter by type: TRANSFER, REVERSAL
        #[arg(long = "type")]
        tx_type: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                Repository::init(&db_url_create(&self.database)).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::AddUser {
                email,
                name,
                balance,
            } => {
                let repo = Repository::connect(&db_url(&self.database)).await?;
                let opening = parse_cents(&balance)
                    .context("Invalid balance format. Use '1000.00' or '1000'")?;
                let user = repo.create_user(&email, &name, opening).await?;
                println!(
                    "Created user {} <{}> with balance {}",
                    user.id,
                    user.email,
                    format_cents(opening)
                );
            }

            Commands::Balance { user } => {
                let engine = connect_engine(&self.database).await?;
                let view = engine.balance(parse_user_id(&user)?).await?;
                println!("{}", serde_json::to_string_pretty(&view)?);
            }

            Commands::Transfer { amount, from, to } => {
                let engine = connect_engine(&self.database).await?;
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '100.50' or '100'")?;

                let view = engine
                    .transfer(
                        parse_user_id(&from)?,
                        TransferInput {
                            to_user: parse_user_id(&to)?,
                            amount_cents,
                        },
                    )
                    .await?;

                println!("{}", serde_json::to_string_pretty(&view)?);
            }

            Commands::Reverse { id, user } => {
                let engine = connect_engine(&self.database).await?;
                let transaction_id =
                    Uuid::parse_str(&id).context("Invalid transaction ID (expected a UUID)")?;

                let view = engine
                    .reverse(transaction_id, parse_user_id(&user)?)
                    .await?;

                println!("{}", serde_json::to_string_pretty(&view)?);
            }

            Commands::History {
                user,
                page,
                limit,
                status,
                tx_type,
            } => {
                let engine = connect_engine(&self.database).await?;

                let status = match status.as_deref() {
                    None => None,
                    Some(s) => match TransactionStatus::from_str(s) {
                        Some(status) => Some(status),
                        None => bail!("Unknown status '{s}'"),
                    },
                };
                let tx_type = match tx_type.as_deref() {
                    None => None,
                    Some(s) => match TransactionType::from_str(s) {
                        Some(tx_type) => Some(tx_type),
                        None => bail!("Unknown type '{s}'"),
                    },
                };

                let history = engine
                    .history(
                        parse_user_id(&user)?,
                        HistoryQuery {
                            page: Some(page),
                            limit: Some(limit),
                            status,
                            tx_type,
                        },
                    )
                    .await?;

                println!("{}", serde_json::to_string_pretty(&history)?);
            }
        }

        Ok(())
    }
}

async fn connect_engine(database: &str) -> Result<LedgerEngine<Repository>> {
    let repo = Repository::connect(&db_url(database)).await?;
    Ok(LedgerEngine::new(repo))
}

fn db_url(database_path: &str) -> String {
    format!("sqlite:{}", database_path)
}

fn db_url_create(database_path: &str) -> String {
    format!("sqlite:{}?mode=rwc", database_path)
}

fn parse_user_id(input: &str) -> Result<Uuid> {
    Uuid::parse_str(input).context("Invalid user ID (expected a UUID)")
}
