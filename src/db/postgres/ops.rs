use async_trait::async_trait;
use log::error;
use tokio_postgres::Row;

use crate::{
    db::{
        models::{Account, BalanceSnapshot, Checkpoint, NewAccount, NewBalanceSnapshot},
        postgres::PostgresClient,
        AccountStore, BalanceStore, CheckpointStore, Insertion,
    },
    error::{IndexerError, Result},
};

fn row_to_account(row: &Row) -> Account {
    Account {
        id: row.get("id"),
        address: row.get("address"),
        creator: row.get("creator"),
        username: row.get("username"),
        created_at: row.get("created_at"),
    }
}

fn row_to_snapshot(row: &Row) -> BalanceSnapshot {
    BalanceSnapshot {
        id: row.get("id"),
        account_id: row.get("account_id"),
        contract_address: row.get("contract_address"),
        balance: row.get("balance"),
        timestamp: row.get("timestamp"),
    }
}

// ==================== CHECKPOINTS ====================

#[async_trait]
impl CheckpointStore for PostgresClient {
    async fn get_checkpoint(&self, name: &str) -> Result<Option<u64>> {
        let client = self.pool.get().await?;
        let query = "SELECT value FROM indexer.checkpoints WHERE name = $1";

        let Some(row) = client.query_opt(query, &[&name]).await? else {
            return Ok(None);
        };

        let value: String = row.get("value");
        Checkpoint::decode_value(&value).map(Some).ok_or_else(|| {
            IndexerError::StorageUnavailable(format!(
                "checkpoint {} holds a non-numeric value {:?}",
                name, value
            ))
        })
    }

    async fn set_checkpoint(&self, name: &str, block_number: u64) -> Result<()> {
        let checkpoint = Checkpoint::new(name, block_number);
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer.checkpoints (name, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(
                query,
                &[
                    &checkpoint.name,
                    &checkpoint.encode_value(),
                    &checkpoint.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to persist checkpoint {} at block {}: {:?}",
                    checkpoint.name, checkpoint.block_number, e
                );
                e
            })?;

        Ok(())
    }
}

// ==================== ACCOUNTS ====================

#[async_trait]
impl AccountStore for PostgresClient {
    async fn insert_account(&self, account: &NewAccount) -> Result<(Account, Insertion)> {
        let client = self.pool.get().await?;

        // Uniqueness on address makes a replayed creation log a no-op.
        let inserted = client
            .query_opt(
                r#"
                INSERT INTO indexer.accounts (address, creator)
                VALUES ($1, $2)
                ON CONFLICT (address) DO NOTHING
                RETURNING id, address, creator, username, created_at
                "#,
                &[&account.address, &account.creator],
            )
            .await?;

        if let Some(row) = inserted {
            return Ok((row_to_account(&row), Insertion::Created));
        }

        let row = client
            .query_one(
                r#"
                SELECT id, address, creator, username, created_at
                FROM indexer.accounts
                WHERE address = $1
                "#,
                &[&account.address],
            )
            .await?;

        Ok((row_to_account(&row), Insertion::Existing))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT id, address, creator, username, created_at
                FROM indexer.accounts
                ORDER BY id ASC
                "#,
                &[],
            )
            .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    async fn find_account(&self, address: &str) -> Result<Option<Account>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT id, address, creator, username, created_at
                FROM indexer.accounts
                WHERE address = $1
                "#,
                &[&address],
            )
            .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    async fn update_username(&self, address: &str, username: &str) -> Result<Option<Account>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                UPDATE indexer.accounts
                SET username = $2
                WHERE address = $1
                RETURNING id, address, creator, username, created_at
                "#,
                &[&address, &username],
            )
            .await?;

        Ok(row.as_ref().map(row_to_account))
    }
}

// ==================== BALANCE HISTORY ====================

#[async_trait]
impl BalanceStore for PostgresClient {
    async fn append_snapshot(&self, snapshot: &NewBalanceSnapshot) -> Result<BalanceSnapshot> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO indexer.balance_history (account_id, contract_address, balance, timestamp)
                VALUES ($1, $2, $3, $4)
                RETURNING id, account_id, contract_address, balance, timestamp
                "#,
                &[
                    &snapshot.account_id,
                    &snapshot.contract_address,
                    &snapshot.balance,
                    &snapshot.timestamp,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to append balance snapshot for account {}: {:?}",
                    snapshot.account_id, e
                );
                e
            })?;

        Ok(row_to_snapshot(&row))
    }

    async fn find_latest_by_address(
        &self,
        address: &str,
        contract: Option<&str>,
    ) -> Result<Option<BalanceSnapshot>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT b.id, b.account_id, b.contract_address, b.balance, b.timestamp
                FROM indexer.balance_history b
                JOIN indexer.accounts a ON a.id = b.account_id
                WHERE a.address = $1
                  AND ($2::TEXT IS NULL OR b.contract_address = $2)
                ORDER BY b.timestamp DESC, b.id DESC
                LIMIT 1
                "#,
                &[&address, &contract],
            )
            .await?;

        Ok(row.as_ref().map(row_to_snapshot))
    }

    async fn find_history_by_address(&self, address: &str) -> Result<Vec<BalanceSnapshot>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT b.id, b.account_id, b.contract_address, b.balance, b.timestamp
                FROM indexer.balance_history b
                JOIN indexer.accounts a ON a.id = b.account_id
                WHERE a.address = $1
                ORDER BY b.timestamp ASC, b.id ASC
                "#,
                &[&address],
            )
            .await?;

        Ok(rows.iter().map(row_to_snapshot).collect())
    }
}
