use crate::errors::{CoreError, ResultExt};
use crate::models::{total_pages, AccountPage, MaturityStage};
use crate::store::SnapshotStore;
use sqlx::PgPool;
use std::collections::BTreeMap;

/// Page size for the maturity account listing.
const PAGE_SIZE: i64 = 20;

/// Read-only queries over the maturity label table.
///
/// This path never writes labels; the classification pipeline owns those
/// exclusively through the label writer.
pub struct MaturityService {
    pool: PgPool,
}

impl MaturityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count of labelled accounts per maturity stage.
    ///
    /// Rows carrying a label string outside the four known stages are
    /// skipped with a warning rather than failing the whole overview.
    pub async fn maturity_overview(&self) -> Result<BTreeMap<MaturityStage, i64>, CoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT label, COUNT(DISTINCT account_id)
             FROM maturity_labels
             GROUP BY label",
        )
        .fetch_all(&self.pool)
        .await
        .context("aggregating maturity overview")?;

        let mut overview = BTreeMap::new();
        for (label, count) in rows {
            match label.parse::<MaturityStage>() {
                Ok(stage) => {
                    overview.insert(stage, count);
                }
                Err(_) => {
                    tracing::warn!("Skipping unknown maturity label in store: {:?}", label);
                }
            }
        }
        Ok(overview)
    }

    /// Paginated latest-snapshot listing, optionally restricted to
    /// accounts carrying the given stage, account id ascending.
    pub async fn maturity_list(
        &self,
        label: Option<MaturityStage>,
        page: i64,
    ) -> Result<AccountPage, CoreError> {
        if page < 1 {
            return Err(CoreError::InvalidFilter(format!(
                "page must be >= 1, got {}",
                page
            )));
        }
        let store = SnapshotStore::new(self.pool.clone());
        let total_items = store.count_by_label(label).await?;
        if total_items == 0 {
            return Ok(AccountPage {
                total_pages: 0,
                items: Vec::new(),
            });
        }
        let offset = (page - 1) * PAGE_SIZE;
        let items = store.latest_by_label(label, PAGE_SIZE, offset).await?;
        Ok(AccountPage {
            total_pages: total_pages(total_items, PAGE_SIZE),
            items,
        })
    }
}
