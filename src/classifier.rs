use crate::errors::CoreError;
use crate::features::AccountFeatures;
use crate::models::MaturityStage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Accounts younger than this are Iniciante regardless of anything else.
const STARTUP_AGE_YEARS: f64 = 2.0;

/// Balance-trend slope beyond which an account counts as moving.
const TREND_THRESHOLD: f64 = 0.1;

/// Share of monthly revenue a negative cash flow must exceed to signal
/// decline.
const CASH_FLOW_REVENUE_SHARE: f64 = 0.10;

/// Which classification pipeline variant to run. Selected explicitly via
/// configuration, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierStrategy {
    /// Deterministic threshold rules; the primary variant.
    #[serde(rename = "rule")]
    RuleBased,
    /// Seeded k-means over standardized features; the offline alternate.
    #[serde(rename = "cluster")]
    ClusterBased,
}

impl FromStr for ClassifierStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(ClassifierStrategy::RuleBased),
            "cluster" => Ok(ClassifierStrategy::ClusterBased),
            other => Err(format!(
                "unknown classifier strategy {:?} (expected \"rule\" or \"cluster\")",
                other
            )),
        }
    }
}

/// Maps account features to maturity stages for a whole pipeline run.
pub trait Classifier {
    fn classify(
        &self,
        features: &[AccountFeatures],
    ) -> Result<BTreeMap<String, MaturityStage>, CoreError>;
}

/// The deterministic rule engine. Total and pure: every feature tuple maps
/// to exactly one stage, and identical inputs always produce identical
/// output.
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    /// First match wins:
    /// 1. younger than 2 years → Iniciante;
    /// 2. falling balance trend, or cash flow worse than −10% of monthly
    ///    revenue (threshold 0 when monthly revenue is not positive) →
    ///    Declínio;
    /// 3. rising balance trend with positive cash flow → Expansão;
    /// 4. otherwise → Madura.
    pub fn classify_account(features: &AccountFeatures) -> MaturityStage {
        if features.age_years < STARTUP_AGE_YEARS {
            return MaturityStage::Iniciante;
        }

        let monthly_revenue = features.annual_revenue / 12.0;
        let cash_flow_floor = if monthly_revenue <= 0.0 {
            0.0
        } else {
            -CASH_FLOW_REVENUE_SHARE * monthly_revenue
        };
        if features.balance_trend < -TREND_THRESHOLD
            || features.net_cash_flow < cash_flow_floor
        {
            return MaturityStage::Declinio;
        }

        if features.balance_trend > TREND_THRESHOLD && features.net_cash_flow > 0.0 {
            return MaturityStage::Expansao;
        }

        MaturityStage::Madura
    }
}

impl Classifier for RuleBasedClassifier {
    fn classify(
        &self,
        features: &[AccountFeatures],
    ) -> Result<BTreeMap<String, MaturityStage>, CoreError> {
        Ok(features
            .iter()
            .map(|f| (f.account_id.clone(), Self::classify_account(f)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> AccountFeatures {
        AccountFeatures {
            account_id: "1".to_string(),
            annual_revenue: 120_000.0, // monthly revenue 10 000
            current_balance: 5_000.0,
            industry_code: "RETAIL".to_string(),
            age_years: 5.0,
            balance_trend: 0.0,
            net_cash_flow: 0.0,
            total_paid: 0.0,
            payment_count: 0,
            total_received: 0.0,
            receipt_count: 0,
            days_since_last_activity: 0.0,
        }
    }

    #[test]
    fn young_accounts_are_iniciante_regardless_of_trend() {
        let mut f = features();
        f.age_years = 1.9;
        f.balance_trend = -5.0;
        f.net_cash_flow = -1_000_000.0;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Iniciante
        );
    }

    #[test]
    fn age_exactly_two_is_not_iniciante() {
        let mut f = features();
        f.age_years = 2.0;
        assert_ne!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Iniciante
        );
    }

    #[test]
    fn falling_trend_is_declinio() {
        let mut f = features();
        f.balance_trend = -0.11;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Declinio
        );
    }

    #[test]
    fn trend_exactly_at_minus_threshold_is_not_declinio() {
        let mut f = features();
        f.balance_trend = -0.1;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Madura
        );
    }

    #[test]
    fn deep_negative_cash_flow_is_declinio() {
        let mut f = features();
        // Threshold is -10% of 10 000 = -1 000.
        f.net_cash_flow = -1_000.01;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Declinio
        );
    }

    #[test]
    fn cash_flow_exactly_at_threshold_is_not_declinio() {
        let mut f = features();
        f.net_cash_flow = -1_000.0;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Madura
        );
    }

    #[test]
    fn zero_revenue_makes_any_negative_cash_flow_declinio() {
        let mut f = features();
        f.annual_revenue = 0.0;
        f.net_cash_flow = -0.01;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Declinio
        );

        f.net_cash_flow = 0.0;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Madura
        );
    }

    #[test]
    fn negative_revenue_behaves_like_zero_revenue() {
        let mut f = features();
        f.annual_revenue = -60_000.0;
        f.net_cash_flow = -0.01;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Declinio
        );
    }

    #[test]
    fn rising_trend_with_positive_cash_flow_is_expansao() {
        let mut f = features();
        f.balance_trend = 0.11;
        f.net_cash_flow = 1.0;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Expansao
        );
    }

    #[test]
    fn trend_exactly_at_threshold_is_not_expansao() {
        let mut f = features();
        f.balance_trend = 0.1;
        f.net_cash_flow = 1.0;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Madura
        );
    }

    #[test]
    fn rising_trend_without_cash_flow_is_madura() {
        let mut f = features();
        f.balance_trend = 0.2;
        f.net_cash_flow = 0.0;
        assert_eq!(
            RuleBasedClassifier::classify_account(&f),
            MaturityStage::Madura
        );
    }

    #[test]
    fn strategy_parses_from_config_keywords() {
        assert_eq!(
            "rule".parse::<ClassifierStrategy>().unwrap(),
            ClassifierStrategy::RuleBased
        );
        assert_eq!(
            "cluster".parse::<ClassifierStrategy>().unwrap(),
            ClassifierStrategy::ClusterBased
        );
        assert!("kmeans".parse::<ClassifierStrategy>().is_err());
    }

    #[test]
    fn classify_covers_every_account_exactly_once() {
        let mut a = features();
        a.account_id = "a".into();
        let mut b = features();
        b.account_id = "b".into();
        b.age_years = 0.5;
        let labels = RuleBasedClassifier.classify(&[a, b]).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["a"], MaturityStage::Madura);
        assert_eq!(labels["b"], MaturityStage::Iniciante);
    }
}
