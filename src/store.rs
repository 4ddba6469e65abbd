use crate::errors::{CoreError, ResultExt};
use crate::models::{AccountSnapshot, MaturityStage, Transaction};
use sqlx::PgPool;

/// Read-only access to account snapshots and the transaction ledger.
///
/// Every listing resolves one snapshot per account: the row with the
/// maximum `reference_date`. The (account_id, reference_date) key makes
/// that row unique, so resolution is deterministic and repeated calls over
/// unchanged data return identical results.
pub struct SnapshotStore {
    pool: PgPool,
}

const SNAPSHOT_COLUMNS: &str =
    "account_id, annual_revenue, current_balance, opening_date, industry_code, reference_date";

impl SnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent snapshot for the account, or `None` when the account
    /// has no rows.
    pub async fn latest_snapshot(
        &self,
        account_id: &str,
    ) -> Result<Option<AccountSnapshot>, CoreError> {
        sqlx::query_as::<_, AccountSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS}
             FROM account_snapshots
             WHERE account_id = $1
             ORDER BY reference_date DESC
             LIMIT 1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .context("resolving latest snapshot")
    }

    pub async fn account_exists(&self, account_id: &str) -> Result<bool, CoreError> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM account_snapshots WHERE account_id = $1 LIMIT 1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .context("checking account existence")?;
        Ok(row.is_some())
    }

    /// Distinct accounts carrying a snapshot within the industry code.
    pub async fn count_by_industry(&self, industry_code: &str) -> Result<i64, CoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT account_id) FROM account_snapshots WHERE industry_code = $1",
        )
        .bind(industry_code)
        .fetch_one(&self.pool)
        .await
        .context("counting accounts by industry")?;
        Ok(count)
    }

    /// One latest snapshot per account within the industry code, sorted by
    /// account id ascending.
    pub async fn latest_by_industry(
        &self,
        industry_code: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AccountSnapshot>, CoreError> {
        sqlx::query_as::<_, AccountSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM (
                 SELECT DISTINCT ON (account_id) {SNAPSHOT_COLUMNS}
                 FROM account_snapshots
                 WHERE industry_code = $1
                 ORDER BY account_id, reference_date DESC
             ) latest
             ORDER BY account_id
             LIMIT $2 OFFSET $3"
        ))
        .bind(industry_code)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("listing accounts by industry")
    }

    /// Distinct accounts, optionally restricted to those carrying the
    /// given maturity label.
    pub async fn count_by_label(
        &self,
        label: Option<MaturityStage>,
    ) -> Result<i64, CoreError> {
        let (count,): (i64,) = match label {
            Some(stage) => {
                sqlx::query_as(
                    "SELECT COUNT(DISTINCT account_id) FROM account_snapshots
                     WHERE account_id IN (SELECT account_id FROM maturity_labels WHERE label = $1)",
                )
                .bind(stage.as_str())
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query_as("SELECT COUNT(DISTINCT account_id) FROM account_snapshots")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .context("counting accounts by label")?;
        Ok(count)
    }

    /// One latest snapshot per account, optionally restricted by maturity
    /// label, sorted by account id ascending.
    pub async fn latest_by_label(
        &self,
        label: Option<MaturityStage>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AccountSnapshot>, CoreError> {
        match label {
            Some(stage) => {
                sqlx::query_as::<_, AccountSnapshot>(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM (
                         SELECT DISTINCT ON (account_id) {SNAPSHOT_COLUMNS}
                         FROM account_snapshots
                         WHERE account_id IN
                             (SELECT account_id FROM maturity_labels WHERE label = $1)
                         ORDER BY account_id, reference_date DESC
                     ) latest
                     ORDER BY account_id
                     LIMIT $2 OFFSET $3"
                ))
                .bind(stage.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, AccountSnapshot>(&format!(
                    "SELECT {SNAPSHOT_COLUMNS} FROM (
                         SELECT DISTINCT ON (account_id) {SNAPSHOT_COLUMNS}
                         FROM account_snapshots
                         ORDER BY account_id, reference_date DESC
                     ) latest
                     ORDER BY account_id
                     LIMIT $1 OFFSET $2"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("listing accounts by label")
    }

    /// Full snapshot history, ordered by account then reference date.
    /// Used by the batch pipeline to fit balance trends.
    pub async fn all_snapshots(&self) -> Result<Vec<AccountSnapshot>, CoreError> {
        sqlx::query_as::<_, AccountSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM account_snapshots
             ORDER BY account_id, reference_date"
        ))
        .fetch_all(&self.pool)
        .await
        .context("loading snapshot history")
    }

    /// Full transaction ledger. Used by the batch pipeline.
    pub async fn all_transactions(&self) -> Result<Vec<Transaction>, CoreError> {
        sqlx::query_as::<_, Transaction>(
            "SELECT id, amount, description, reference_date, payer_id, receiver_id
             FROM transactions",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading transaction ledger")
    }

    /// Number of distinct maturity labels currently present. Drives k for
    /// the clustering variant.
    pub async fn distinct_label_count(&self) -> Result<i64, CoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT label) FROM maturity_labels")
                .fetch_one(&self.pool)
                .await
                .context("counting distinct labels")?;
        Ok(count)
    }
}
