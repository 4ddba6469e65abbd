use crate::classifier::{Classifier, ClassifierStrategy, RuleBasedClassifier};
use crate::clustering::ClusterClassifier;
use crate::config::Config;
use crate::errors::CoreError;
use crate::features::build_features;
use crate::models::MaturityStage;
use crate::store::SnapshotStore;
use crate::writer::LabelWriter;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;

/// Summary of one classification run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub strategy: ClassifierStrategy,
    pub accounts_classified: u64,
    pub stage_counts: BTreeMap<MaturityStage, u64>,
}

/// The offline batch job: load the store, derive features, classify every
/// account, persist the labels atomically.
///
/// Single-writer: runs are not expected to overlap, and the persistence
/// step holds an exclusive section so an accidental overlap cannot corrupt
/// the label table. Any failure aborts the whole run before anything is
/// written.
pub struct ClassificationPipeline {
    pool: PgPool,
    cash_flow_window_months: Option<u32>,
    cluster_seed: u64,
}

impl ClassificationPipeline {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            cash_flow_window_months: config.cash_flow_window_months,
            cluster_seed: config.cluster_seed,
        }
    }

    pub async fn run(&self, strategy: ClassifierStrategy) -> Result<RunReport, CoreError> {
        tracing::info!("Starting classification run with {:?} strategy", strategy);
        let store = SnapshotStore::new(self.pool.clone());

        let snapshots = store.all_snapshots().await.map_err(abort)?;
        if snapshots.is_empty() {
            return Err(CoreError::PipelineAborted(
                "no account snapshots to classify".into(),
            ));
        }
        let transactions = store.all_transactions().await.map_err(abort)?;
        tracing::info!(
            "Loaded {} snapshot rows and {} transactions",
            snapshots.len(),
            transactions.len()
        );

        // Age and recency anchor on the newest ledger entry, like the
        // reporting screens; an empty ledger falls back to wall clock.
        let as_of = transactions
            .iter()
            .map(|tx| tx.reference_date)
            .max()
            .unwrap_or_else(Utc::now);

        let features = build_features(
            &snapshots,
            &transactions,
            as_of,
            self.cash_flow_window_months,
        );
        tracing::info!("Derived features for {} accounts", features.len());

        let labels = match strategy {
            ClassifierStrategy::RuleBased => RuleBasedClassifier.classify(&features)?,
            ClassifierStrategy::ClusterBased => {
                let k = store.distinct_label_count().await.map_err(abort)? as usize;
                ClusterClassifier::new(k, self.cluster_seed).classify(&features)?
            }
        };

        let written = LabelWriter::new(self.pool.clone())
            .persist(&labels)
            .await
            .map_err(abort)?;

        let mut stage_counts = BTreeMap::new();
        for stage in labels.values() {
            *stage_counts.entry(*stage).or_insert(0u64) += 1;
        }
        tracing::info!("Classification run complete: {:?}", stage_counts);

        Ok(RunReport {
            strategy,
            accounts_classified: written,
            stage_counts,
        })
    }
}

/// Store or persistence failures discard the whole run.
fn abort(err: CoreError) -> CoreError {
    match err {
        already @ CoreError::PipelineAborted(_) => already,
        other => CoreError::PipelineAborted(other.to_string()),
    }
}
