use crate::errors::{CoreError, ResultExt};
use crate::models::{
    total_pages, AccountPage, Direction, GlobalStats, IndustryShare, MonthlyFlow, Transaction,
    TransactionEntry, TransactionFilters, TransactionPage, TransactionsOverview,
};
use crate::query::{Bind, Predicate, PredicateSet};
use crate::store::SnapshotStore;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Default page size for the transaction and account listings.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Page size used by the industry-specific account screen.
pub const INDUSTRY_PAGE_SIZE: i64 = 12;

/// Read-only reporting queries over the snapshot and transaction tables.
///
/// Stateless: every method is an independent call against the pool, safe
/// to run concurrently with any other call. Nothing here ever writes.
pub struct AggregationService {
    pool: PgPool,
}

impl AggregationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn store(&self) -> SnapshotStore {
        SnapshotStore::new(self.pool.clone())
    }

    /// Headline statistics for one account: distinct payers, transaction
    /// count on either side, and the signed balance of everything it
    /// received minus everything it paid.
    ///
    /// An account with no transactions yields all-zero aggregates; only a
    /// missing account is an error.
    pub async fn overview(&self, account_id: &str) -> Result<TransactionsOverview, CoreError> {
        if !self.store().account_exists(account_id).await? {
            return Err(CoreError::NotFound(format!(
                "account {} not found",
                account_id
            )));
        }

        let (counterparty_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT payer_id) FROM transactions WHERE receiver_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .context("counting distinct payers")?;

        let (transaction_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transactions WHERE payer_id = $1 OR receiver_id = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .context("counting transactions")?;

        let (balance,): (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(CASE WHEN receiver_id = $1 THEN amount
                             WHEN payer_id = $1 THEN -amount
                             ELSE 0 END)
             FROM transactions
             WHERE payer_id = $1 OR receiver_id = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .context("summing signed amounts")?;

        Ok(TransactionsOverview {
            counterparty_count,
            transaction_count,
            balance: balance.unwrap_or(0.0),
        })
    }

    /// Filtered, paginated transaction listing for one account, newest
    /// first. All provided filters are AND-combined; an empty result page
    /// is success, not an error.
    pub async fn filtered_list(
        &self,
        account_id: &str,
        filters: &TransactionFilters,
        page: i64,
    ) -> Result<TransactionPage, CoreError> {
        if page < 1 {
            return Err(CoreError::InvalidFilter(format!(
                "page must be >= 1, got {}",
                page
            )));
        }
        let predicates = build_transaction_predicates(account_id, filters)?;

        if !self.store().account_exists(account_id).await? {
            return Err(CoreError::NotFound(format!(
                "account {} not found",
                account_id
            )));
        }

        let mut count_query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        predicates.push_where(&mut count_query);
        let (total_items,): (i64,) = count_query
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .context("counting filtered transactions")?;

        let mut select_query: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, amount, description, reference_date, payer_id, receiver_id \
             FROM transactions",
        );
        predicates.push_where(&mut select_query);
        select_query.push(" ORDER BY reference_date DESC LIMIT ");
        select_query.push_bind(DEFAULT_PAGE_SIZE);
        select_query.push(" OFFSET ");
        select_query.push_bind((page - 1) * DEFAULT_PAGE_SIZE);
        let rows: Vec<Transaction> = select_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("fetching filtered transactions")?;

        let items = rows
            .into_iter()
            .map(|tx| entry_for_account(account_id, tx))
            .collect();

        Ok(TransactionPage {
            total_pages: total_pages(total_items, DEFAULT_PAGE_SIZE),
            items,
        })
    }

    /// Income and expense totals per calendar month for one account.
    ///
    /// Months are matched by month-of-year only: transactions from
    /// different years land in the same bucket. That merge is inherited
    /// behavior the reporting screens rely on; it is intentional and must
    /// not be "fixed" to year+month. Only months with at least one
    /// transaction appear, in ascending month order.
    pub async fn monthly_flow(&self, account_id: &str) -> Result<Vec<MonthlyFlow>, CoreError> {
        let rows: Vec<(i32, f64, f64)> = sqlx::query_as(
            "SELECT EXTRACT(MONTH FROM reference_date)::int AS month,
                    COALESCE(SUM(CASE WHEN receiver_id = $1 THEN amount ELSE 0 END), 0) AS income,
                    COALESCE(SUM(CASE WHEN payer_id = $1 THEN amount ELSE 0 END), 0) AS expense
             FROM transactions
             WHERE payer_id = $1 OR receiver_id = $1
             GROUP BY month
             ORDER BY month",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("aggregating monthly flow")?;

        Ok(rows
            .into_iter()
            .map(|(month, income, expense)| MonthlyFlow {
                month: month as u32,
                income,
                expense,
            })
            .collect())
    }

    /// Top industry codes by the summed revenue of each code's 100
    /// highest-revenue snapshot rows.
    ///
    /// Two-stage sort: codes are scored and cut to 5 by that top-100
    /// revenue sum, then the surviving 5 are re-sorted by account-row
    /// count descending for presentation. Both sorts are stable; ties keep
    /// the store's natural row order.
    pub async fn industry_ranking(&self) -> Result<Vec<IndustryShare>, CoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "WITH ranked_revenue AS (
                 SELECT industry_code, annual_revenue,
                        ROW_NUMBER() OVER (
                            PARTITION BY industry_code
                            ORDER BY annual_revenue DESC
                        ) AS rn
                 FROM account_snapshots
             ),
             top100_sum AS (
                 SELECT industry_code, SUM(annual_revenue) AS top100_revenue
                 FROM ranked_revenue
                 WHERE rn <= 100
                 GROUP BY industry_code
             ),
             industry_counts AS (
                 SELECT industry_code, COUNT(account_id) AS accounts
                 FROM account_snapshots
                 GROUP BY industry_code
             )
             SELECT t.industry_code, c.accounts
             FROM top100_sum t
             JOIN industry_counts c USING (industry_code)
             ORDER BY t.top100_revenue DESC
             LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await
        .context("ranking industries")?;

        let mut ranking: Vec<IndustryShare> = rows
            .into_iter()
            .map(|(industry_code, account_count)| IndustryShare {
                industry_code,
                account_count,
            })
            .collect();
        // Presentation order: account count descending, stable on ties.
        ranking.sort_by(|a, b| b.account_count.cmp(&a.account_count));
        Ok(ranking)
    }

    /// Paginated latest-snapshot listing for one industry code, account id
    /// ascending. `page_size` is a call parameter: the general listing
    /// pages by 20, the industry screen by 12.
    pub async fn industry_list(
        &self,
        industry_code: &str,
        page: i64,
        page_size: i64,
    ) -> Result<AccountPage, CoreError> {
        if page < 1 || page_size < 1 {
            return Err(CoreError::InvalidFilter(format!(
                "page and page_size must be >= 1, got page {} size {}",
                page, page_size
            )));
        }
        let store = self.store();
        let total_items = store.count_by_industry(industry_code).await?;
        if total_items == 0 {
            return Ok(AccountPage {
                total_pages: 0,
                items: Vec::new(),
            });
        }
        let offset = (page - 1) * page_size;
        let items = store
            .latest_by_industry(industry_code, page_size, offset)
            .await?;
        Ok(AccountPage {
            total_pages: total_pages(total_items, page_size),
            items,
        })
    }

    /// Store-wide totals for the landing dashboard.
    pub async fn global_stats(&self) -> Result<GlobalStats, CoreError> {
        let (total_accounts,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT account_id) FROM account_snapshots")
                .fetch_one(&self.pool)
                .await
                .context("counting accounts")?;

        let (total_transactions,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions")
                .fetch_one(&self.pool)
                .await
                .context("counting transactions")?;

        let (total_volume,): (Option<f64>,) =
            sqlx::query_as("SELECT SUM(amount) FROM transactions")
                .fetch_one(&self.pool)
                .await
                .context("summing transaction volume")?;

        let (total_revenue,): (Option<f64>,) =
            sqlx::query_as("SELECT SUM(annual_revenue) FROM account_snapshots")
                .fetch_one(&self.pool)
                .await
                .context("summing declared revenue")?;

        Ok(GlobalStats {
            total_accounts,
            total_transactions,
            total_volume: total_volume.unwrap_or(0.0),
            total_revenue: total_revenue.unwrap_or(0.0),
        })
    }

    /// The latest `limit` transactions across the whole store, newest
    /// first.
    pub async fn recent_transactions(&self, limit: i64) -> Result<Vec<Transaction>, CoreError> {
        sqlx::query_as::<_, Transaction>(
            "SELECT id, amount, description, reference_date, payer_id, receiver_id
             FROM transactions
             ORDER BY reference_date DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("fetching recent transactions")
    }
}

/// Assembles the AND-combined predicate set for the transaction listing.
/// Month values are validated here, before any query executes.
fn build_transaction_predicates(
    account_id: &str,
    filters: &TransactionFilters,
) -> Result<PredicateSet, CoreError> {
    let mut predicates = PredicateSet::new();

    match filters.direction.unwrap_or(Direction::Both) {
        Direction::Income => predicates.push(Predicate::new(
            "receiver_id = $_",
            vec![Bind::Text(account_id.to_string())],
        )),
        Direction::Expense => predicates.push(Predicate::new(
            "payer_id = $_",
            vec![Bind::Text(account_id.to_string())],
        )),
        Direction::Both => predicates.push(Predicate::new(
            "(payer_id = $_ OR receiver_id = $_)",
            vec![
                Bind::Text(account_id.to_string()),
                Bind::Text(account_id.to_string()),
            ],
        )),
    }

    if let Some(months) = &filters.months {
        if months.is_empty() {
            return Err(CoreError::InvalidFilter("months filter is empty".into()));
        }
        if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(CoreError::InvalidFilter(format!(
                "month out of range 1-12: {}",
                bad
            )));
        }
        // Month-of-year match, ignoring year; see monthly_flow for why.
        predicates.push(Predicate::new(
            "EXTRACT(MONTH FROM reference_date)::int = ANY($_)",
            vec![Bind::IntArray(months.iter().map(|m| *m as i32).collect())],
        ));
    }

    if let Some(types) = &filters.types {
        if types.is_empty() {
            return Err(CoreError::InvalidFilter("types filter is empty".into()));
        }
        predicates.push(Predicate::new(
            "description = ANY($_)",
            vec![Bind::TextArray(types.clone())],
        ));
    }

    if let Some(counterparty) = &filters.counterparty {
        predicates.push(Predicate::new(
            "(payer_id = $_ OR receiver_id = $_)",
            vec![
                Bind::Text(counterparty.clone()),
                Bind::Text(counterparty.clone()),
            ],
        ));
    }

    Ok(predicates)
}

/// Reorients a raw transaction row to the queried account's perspective.
fn entry_for_account(account_id: &str, tx: Transaction) -> TransactionEntry {
    if tx.payer_id == account_id {
        TransactionEntry {
            direction: Direction::Expense,
            counterparty: tx.receiver_id,
            reference_date: tx.reference_date,
            description: tx.description,
            amount: tx.amount,
        }
    } else {
        TransactionEntry {
            direction: Direction::Income,
            counterparty: tx.payer_id,
            reference_date: tx.reference_date,
            description: tx.description,
            amount: tx.amount,
        }
    }
}
