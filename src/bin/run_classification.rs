//! Batch entry point: classify every account and persist the labels.
//!
//! Strategy and tuning come from the environment (`CLASSIFIER_STRATEGY`,
//! `CASH_FLOW_WINDOW_MONTHS`, `CLUSTER_SEED`); see `config::Config`.

use account_insights::config::Config;
use account_insights::db::Database;
use account_insights::pipeline::ClassificationPipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "account_insights=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let pipeline = ClassificationPipeline::new(db.pool.clone(), &config);
    let report = pipeline.run(config.classifier_strategy).await?;

    tracing::info!(
        "Classified {} accounts: {}",
        report.accounts_classified,
        serde_json::to_string(&report.stage_counts)?
    );

    Ok(())
}
