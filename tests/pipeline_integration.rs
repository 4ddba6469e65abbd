use std::env;

use account_insights::aggregation::{AggregationService, DEFAULT_PAGE_SIZE};
use account_insights::classifier::ClassifierStrategy;
use account_insights::config::Config;
use account_insights::db::Database;
use account_insights::maturity::MaturityService;
use account_insights::models::{Direction, MaturityStage, TransactionFilters};
use account_insights::pipeline::ClassificationPipeline;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

/// End-to-end smoke test against a real Postgres instance.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn aggregation_and_classification_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let pool = db.pool.clone();

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS account_snapshots (
             account_id TEXT NOT NULL,
             reference_date TIMESTAMPTZ NOT NULL,
             annual_revenue DOUBLE PRECISION NOT NULL,
             current_balance DOUBLE PRECISION NOT NULL,
             opening_date TIMESTAMPTZ NOT NULL,
             industry_code TEXT NOT NULL,
             PRIMARY KEY (account_id, reference_date)
         )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions (
             id UUID PRIMARY KEY,
             amount DOUBLE PRECISION NOT NULL,
             description TEXT NOT NULL,
             reference_date TIMESTAMPTZ NOT NULL,
             payer_id TEXT NOT NULL,
             receiver_id TEXT NOT NULL
         )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS maturity_labels (
             account_id TEXT PRIMARY KEY,
             label TEXT NOT NULL,
             updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
         )",
    )
    .execute(&pool)
    .await?;

    // Unique prefix so repeated runs never collide.
    let prefix = format!("it{}", &Uuid::new_v4().simple().to_string()[..8]);
    let quiet = format!("{}-quiet", prefix);
    let active = format!("{}-active", prefix);
    let payer = format!("{}-payer", prefix);
    let industry = format!("{}-IND", prefix);

    let opening = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
    let snapshots = [
        // Two snapshots for the active account; the later one must win.
        (&active, 30.0, 100.0, "2024-01-31"),
        (&active, 30.0, 250.0, "2024-03-31"),
        (&quiet, 20.0, 50.0, "2024-03-31"),
        (&payer, 10.0, 75.0, "2024-03-31"),
    ];
    for (id, revenue, balance, reference) in snapshots {
        sqlx::query(
            "INSERT INTO account_snapshots
                 (account_id, reference_date, annual_revenue, current_balance,
                  opening_date, industry_code)
             VALUES ($1, $2::date, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(reference)
        .bind(revenue)
        .bind(balance)
        .bind(opening)
        .bind(&industry)
        .execute(&pool)
        .await?;
    }

    // active: two incoming (100 and 40 from payer), one outgoing 15.
    // quiet has no transactions at all.
    let ledger = [
        (&payer, &active, 100.0, "2024-02-10"),
        (&payer, &active, 40.0, "2024-02-20"),
        (&active, &payer, 15.0, "2024-03-05"),
    ];
    for (from, to, amount, reference) in ledger {
        sqlx::query(
            "INSERT INTO transactions
                 (id, amount, description, reference_date, payer_id, receiver_id)
             VALUES ($1, $2, 'PIX', $3::date, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(amount)
        .bind(reference)
        .bind(from)
        .bind(to)
        .execute(&pool)
        .await?;
    }

    let aggregation = AggregationService::new(pool.clone());

    // Account with no transactions: all-zero aggregates, not an error.
    let quiet_overview = aggregation.overview(&quiet).await?;
    assert_eq!(quiet_overview.counterparty_count, 0);
    assert_eq!(quiet_overview.transaction_count, 0);
    assert_eq!(quiet_overview.balance, 0.0);

    let active_overview = aggregation.overview(&active).await?;
    assert_eq!(active_overview.counterparty_count, 1);
    assert_eq!(active_overview.transaction_count, 3);
    assert!((active_overview.balance - 125.0).abs() < 1e-9);

    // Unknown account is NotFound, distinct from an empty result.
    assert!(aggregation
        .overview(&format!("{}-missing", prefix))
        .await
        .is_err());

    // direction=income returns exactly the two incoming rows.
    let filters = TransactionFilters {
        direction: Some(Direction::Income),
        ..Default::default()
    };
    let page = aggregation.filtered_list(&active, &filters, 1).await?;
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 1);
    assert!(page
        .items
        .iter()
        .all(|item| item.direction == Direction::Income));
    // Newest first.
    assert!(page.items[0].reference_date >= page.items[1].reference_date);

    // Cross-check: balance equals the signed sum over direction=both.
    let both = aggregation
        .filtered_list(&active, &TransactionFilters::default(), 1)
        .await?;
    let signed: f64 = both
        .items
        .iter()
        .map(|item| match item.direction {
            Direction::Expense => -item.amount,
            _ => item.amount,
        })
        .sum();
    assert!((signed - active_overview.balance).abs() < 1e-9);

    // Monthly flow: only months with activity, ascending, never all-zero.
    let flow = aggregation.monthly_flow(&active).await?;
    assert_eq!(
        flow.iter().map(|m| m.month).collect::<Vec<_>>(),
        vec![2, 3]
    );
    assert!(flow.iter().all(|m| m.income != 0.0 || m.expense != 0.0));

    // Industry list resolves one latest snapshot per account.
    let listing = aggregation
        .industry_list(&industry, 1, DEFAULT_PAGE_SIZE)
        .await?;
    assert_eq!(listing.total_pages, 1);
    assert_eq!(listing.items.len(), 3);
    let resolved = listing
        .items
        .iter()
        .find(|s| s.account_id == active)
        .expect("active account listed");
    assert!((resolved.current_balance - 250.0).abs() < 1e-9);

    // Ranking is pure: two runs agree.
    let first = aggregation.industry_ranking().await?;
    let second = aggregation.industry_ranking().await?;
    assert!(first.len() <= 5);
    assert_eq!(
        first.iter().map(|e| &e.industry_code).collect::<Vec<_>>(),
        second.iter().map(|e| &e.industry_code).collect::<Vec<_>>()
    );

    // Classify with the rule engine and read the labels back.
    let config = Config {
        database_url: db_url.clone(),
        classifier_strategy: ClassifierStrategy::RuleBased,
        cash_flow_window_months: None,
        cluster_seed: 42,
    };
    let pipeline = ClassificationPipeline::new(pool.clone(), &config);
    let report = pipeline.run(ClassifierStrategy::RuleBased).await?;
    assert!(report.accounts_classified >= 3);

    let maturity = MaturityService::new(pool.clone());
    let overview = maturity.maturity_overview().await?;
    assert!(overview.values().sum::<i64>() >= 3);

    let listed = maturity.maturity_list(Some(MaturityStage::Madura), 1).await?;
    for item in &listed.items {
        assert!(!item.account_id.is_empty());
    }

    // Leave no fixture rows behind.
    sqlx::query("DELETE FROM transactions WHERE payer_id LIKE $1 OR receiver_id LIKE $1")
        .bind(format!("{}%", prefix))
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM account_snapshots WHERE account_id LIKE $1")
        .bind(format!("{}%", prefix))
        .execute(&pool)
        .await?;
    sqlx::query("DELETE FROM maturity_labels WHERE account_id LIKE $1")
        .bind(format!("{}%", prefix))
        .execute(&pool)
        .await?;

    Ok(())
}
