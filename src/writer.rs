use crate::errors::{CoreError, ResultExt};
use crate::models::MaturityStage;
use sqlx::PgPool;
use std::collections::BTreeMap;

/// Advisory lock key guarding the label table against concurrent pipeline
/// runs. Arbitrary but stable.
const LABEL_TABLE_LOCK: i64 = 0x4d41_5455; // "MATU"

/// Single writer for the maturity label table.
///
/// The whole run is persisted inside one transaction holding an advisory
/// lock: a concurrent reader sees either the previous label set or the new
/// one, never an empty or partially-rebuilt table, and two simultaneous
/// runs cannot interleave.
pub struct LabelWriter {
    pool: PgPool,
}

impl LabelWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts every label of a pipeline run. Returns the number of rows
    /// written. On any failure the transaction rolls back and nothing is
    /// visible to readers.
    pub async fn persist(
        &self,
        labels: &BTreeMap<String, MaturityStage>,
    ) -> Result<u64, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("opening label transaction")?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LABEL_TABLE_LOCK)
            .execute(&mut *tx)
            .await
            .context("acquiring label table lock")?;

        let mut written = 0u64;
        for (account_id, stage) in labels {
            sqlx::query(
                "INSERT INTO maturity_labels (account_id, label, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (account_id)
                 DO UPDATE SET label = EXCLUDED.label, updated_at = now()",
            )
            .bind(account_id)
            .bind(stage.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("writing label for account {}", account_id))?;
            written += 1;
        }

        tx.commit().await.context("committing label transaction")?;

        tracing::info!("Persisted {} maturity labels", written);
        Ok(written)
    }
}
