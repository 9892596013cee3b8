// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use centavo::application::LedgerEngine;
use centavo::domain::{Cents, UserId};
use centavo::storage::Repository;
use tempfile::TempDir;

/// Helper to create a test engine backed by a temporary database
pub async fn test_engine() -> Result<(LedgerEngine<Repository>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_str().unwrap());
    let repo = Repository::init(&db_url).await?;
    Ok((LedgerEngine::new(repo), temp_dir))
}

/// Register a user with a funded wallet, returning their id
pub async fn seed_user(
    engine: &LedgerEngine<Repository>,
    email: &str,
    balance_cents: Cents,
) -> Result<UserId> {
    let name = email.split('@').next().unwrap_or(email);
    let user = engine.store().create_user(email, name, balance_cents).await?;
    Ok(user.id)
}

/// Current wallet balance in cents
pub async fn balance_of(engine: &LedgerEngine<Repository>, user_id: UserId) -> Result<Cents> {
    Ok(engine.balance(user_id).await?.balance_cents)
}
