use crate::classifier::ClassifierStrategy;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// Which classifier the batch pipeline runs. Selected explicitly,
    /// never inferred from data.
    pub classifier_strategy: ClassifierStrategy,
    /// Trailing window for the net-cash-flow feature, in months.
    /// `None` means the full transaction history.
    pub cash_flow_window_months: Option<u32>,
    /// Seed for the clustering variant, fixed for reproducibility.
    pub cluster_seed: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            classifier_strategy: std::env::var("CLASSIFIER_STRATEGY")
                .unwrap_or_else(|_| "rule".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
            cash_flow_window_months: match std::env::var("CASH_FLOW_WINDOW_MONTHS") {
                Ok(raw) if !raw.trim().is_empty() => Some(raw.parse().map_err(|_| {
                    anyhow::anyhow!("CASH_FLOW_WINDOW_MONTHS must be a positive integer")
                })?),
                _ => None,
            },
            cluster_seed: std::env::var("CLUSTER_SEED")
                .unwrap_or_else(|_| "42".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CLUSTER_SEED must be an unsigned integer"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Classifier strategy: {:?}", config.classifier_strategy);
        if let Some(months) = config.cash_flow_window_months {
            tracing::info!("Net cash flow restricted to trailing {} months", months);
        }

        Ok(config)
    }
}
