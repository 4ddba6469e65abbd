use crate::classifier::Classifier;
use crate::errors::CoreError;
use crate::features::AccountFeatures;
use crate::models::MaturityStage;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const MAX_ITERATIONS: usize = 300;

/// Remaining stage names handed out to non-decline clusters, in ascending
/// order of mean total received.
const GROWTH_STAGES: [MaturityStage; 3] = [
    MaturityStage::Iniciante,
    MaturityStage::Expansao,
    MaturityStage::Madura,
];

/// The unsupervised alternate classifier: standardized numeric features
/// plus a one-hot industry encoding, partitioned by seeded k-means.
///
/// The seed makes a single run reproducible, but cluster identity is not
/// stable across data changes: adding or removing accounts can reshuffle
/// every group. This variant is not guaranteed to agree with the rule
/// engine.
pub struct ClusterClassifier {
    /// Number of clusters, taken from the distinct labels already present
    /// in the store.
    k: usize,
    seed: u64,
}

impl ClusterClassifier {
    pub fn new(k: usize, seed: u64) -> Self {
        Self { k, seed }
    }
}

impl Classifier for ClusterClassifier {
    fn classify(
        &self,
        features: &[AccountFeatures],
    ) -> Result<BTreeMap<String, MaturityStage>, CoreError> {
        if features.is_empty() {
            return Ok(BTreeMap::new());
        }
        if self.k == 0 {
            return Err(CoreError::PipelineAborted(
                "cluster count is zero; the store has no existing labels to derive k from".into(),
            ));
        }
        if self.k > features.len() {
            return Err(CoreError::PipelineAborted(format!(
                "cannot split {} accounts into {} clusters",
                features.len(),
                self.k
            )));
        }

        let matrix = feature_matrix(features);
        let assignments = kmeans(&matrix, self.k, self.seed);
        let stages = map_clusters_to_stages(features, &assignments, self.k)?;

        Ok(features
            .iter()
            .zip(&assignments)
            .map(|(f, &cluster)| (f.account_id.clone(), stages[cluster]))
            .collect())
    }
}

/// Builds the model matrix: z-scored numeric columns followed by a one-hot
/// industry encoding. Zero-variance columns standardize to 0. One-hot
/// columns are not scaled.
fn feature_matrix(features: &[AccountFeatures]) -> Vec<Vec<f64>> {
    let numeric: Vec<Vec<f64>> = features
        .iter()
        .map(|f| {
            vec![
                f.annual_revenue,
                f.current_balance,
                f.age_years,
                f.balance_trend,
                f.net_cash_flow,
                f.total_paid,
                f.payment_count as f64,
                f.total_received,
                f.receipt_count as f64,
                f.days_since_last_activity,
            ]
        })
        .collect();

    let n = numeric.len() as f64;
    let width = numeric[0].len();
    let mut rows: Vec<Vec<f64>> = vec![Vec::with_capacity(width); numeric.len()];
    for col in 0..width {
        let mean = numeric.iter().map(|r| r[col]).sum::<f64>() / n;
        let variance = numeric.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        for (row, source) in rows.iter_mut().zip(&numeric) {
            row.push(if std == 0.0 {
                0.0
            } else {
                (source[col] - mean) / std
            });
        }
    }

    // Sorted code order keeps the encoding deterministic.
    let mut codes: Vec<&str> = features.iter().map(|f| f.industry_code.as_str()).collect();
    codes.sort_unstable();
    codes.dedup();
    for (row, f) in rows.iter_mut().zip(features) {
        for code in &codes {
            row.push(if f.industry_code == *code { 1.0 } else { 0.0 });
        }
    }

    rows
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Lloyd's algorithm with k-means++ seeding. Deterministic for a given
/// (points, k, seed) triple.
fn kmeans(points: &[Vec<f64>], k: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = plus_plus_init(points, k, &mut rng);
    let mut assignments = vec![0usize; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    squared_distance(point, a).total_cmp(&squared_distance(point, b))
                })
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = points
                .iter()
                .zip(&assignments)
                .filter(|(_, &a)| a == cluster)
                .map(|(p, _)| p)
                .collect();
            // An emptied cluster keeps its previous centroid.
            if members.is_empty() {
                continue;
            }
            for (dim, value) in centroid.iter_mut().enumerate() {
                *value = members.iter().map(|m| m[dim]).sum::<f64>() / members.len() as f64;
            }
        }
    }

    assignments
}

/// k-means++ seeding: later centroids are sampled proportionally to their
/// squared distance from the nearest centroid chosen so far.
fn plus_plus_init(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let next = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            // All remaining points coincide with a centroid.
            Err(_) => rng.gen_range(0..points.len()),
        };
        centroids.push(points[next].clone());
    }

    centroids
}

/// Heuristic group-to-stage mapping: the stalest cluster (largest mean
/// days since last activity) is Declínio; the rest take Iniciante,
/// Expansão, Madura in ascending order of mean total received.
///
/// Labels are a closed four-value set, so a well-formed store yields
/// k ≤ 4; if there are ever more clusters than stage names the run aborts
/// instead of leaving groups unlabelled.
fn map_clusters_to_stages(
    features: &[AccountFeatures],
    assignments: &[usize],
    k: usize,
) -> Result<Vec<MaturityStage>, CoreError> {
    let mut days_sum = vec![0.0; k];
    let mut received_sum = vec![0.0; k];
    let mut counts = vec![0usize; k];
    for (f, &cluster) in features.iter().zip(assignments) {
        days_sum[cluster] += f.days_since_last_activity;
        received_sum[cluster] += f.total_received;
        counts[cluster] += 1;
    }

    let mean = |sums: &[f64], cluster: usize| {
        if counts[cluster] == 0 {
            0.0
        } else {
            sums[cluster] / counts[cluster] as f64
        }
    };

    let decline = (0..k)
        .max_by(|&a, &b| {
            // Ties resolve to the lower cluster index.
            mean(&days_sum, a)
                .total_cmp(&mean(&days_sum, b))
                .then(b.cmp(&a))
        })
        .expect("k is at least 1");

    let mut remaining: Vec<usize> = (0..k).filter(|&c| c != decline).collect();
    remaining.sort_by(|&a, &b| mean(&received_sum, a).total_cmp(&mean(&received_sum, b)));
    if remaining.len() > GROWTH_STAGES.len() {
        return Err(CoreError::PipelineAborted(format!(
            "{} clusters but only {} maturity stages; refusing to leave groups unlabelled",
            k,
            GROWTH_STAGES.len() + 1
        )));
    }

    let mut stages = vec![MaturityStage::Declinio; k];
    for (cluster, stage) in remaining.into_iter().zip(GROWTH_STAGES) {
        stages[cluster] = stage;
    }
    Ok(stages)
}
