pub mod support;

pub mod ex01_one_to_one;
pub mod ex02_has_many_attach;
pub mod ex03_many_to_many_pivots;
pub mod ex04_nested_entries;
pub mod ex05_transactions;
pub mod ex06_redis_store;

use anyhow::Result;

/// Runs every walkthrough that needs no external service.
pub async fn run_all() -> Result<()> {
    ex01_one_to_one::run().await?;
    ex02_has_many_attach::run().await?;
    ex03_many_to_many_pivots::run().await?;
    ex04_nested_entries::run().await?;
    ex05_transactions::run().await?;
    Ok(())
}
