use crate::models::{AccountSnapshot, Transaction};
use chrono::{DateTime, Months, Utc};
use std::collections::HashMap;

const DAYS_PER_YEAR: f64 = 365.25;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Numeric profile of one account, derived from its snapshot series and
/// its transaction history. Input to both classifier variants.
///
/// Aggregates for accounts with no transactions in a role default to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFeatures {
    pub account_id: String,
    /// Declared annual revenue from the latest snapshot.
    pub annual_revenue: f64,
    /// Balance from the latest snapshot.
    pub current_balance: f64,
    pub industry_code: String,
    /// (as-of − opening date) in days ÷ 365.25.
    pub age_years: f64,
    /// OLS slope through the (reference date, balance) snapshot points.
    /// Fewer than 2 points count as a flat trend of 0.
    pub balance_trend: f64,
    /// Received minus paid over the configured window (full history when
    /// no window is set).
    pub net_cash_flow: f64,
    pub total_paid: f64,
    pub payment_count: u32,
    pub total_received: f64,
    pub receipt_count: u32,
    /// Days between the as-of date and the account's latest activity in
    /// either role; 0 when the account never transacted.
    pub days_since_last_activity: f64,
}

/// Slope of the ordinary least-squares line through `points`.
///
/// Returns 0 for fewer than 2 points or when all x values coincide.
pub fn ols_slope(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in points {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if sxx == 0.0 {
        return 0.0;
    }
    sxy / sxx
}

fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_seconds() as f64 / SECONDS_PER_DAY
}

fn day_number(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 / SECONDS_PER_DAY
}

/// Per-account transaction totals accumulated in one ledger pass.
#[derive(Debug, Default, Clone)]
struct Tally {
    total_paid: f64,
    payment_count: u32,
    last_paid: Option<DateTime<Utc>>,
    paid_in_window: f64,
    total_received: f64,
    receipt_count: u32,
    last_received: Option<DateTime<Utc>>,
    received_in_window: f64,
}

/// Derives features for every account present in `snapshots`.
///
/// `snapshots` must be ordered by (account id, reference date) ascending,
/// the order the store loader returns. `as_of` anchors age and recency;
/// the pipeline passes the latest transaction date in the store, matching
/// the reporting convention of the batch job. `cash_flow_window_months`
/// restricts only the net-cash-flow feature; the clustering totals always
/// cover the full history.
pub fn build_features(
    snapshots: &[AccountSnapshot],
    transactions: &[Transaction],
    as_of: DateTime<Utc>,
    cash_flow_window_months: Option<u32>,
) -> Vec<AccountFeatures> {
    let cutoff = cash_flow_window_months.map(|m| as_of - Months::new(m));

    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for tx in transactions {
        let in_window = cutoff.map_or(true, |c| tx.reference_date >= c);

        let payer = tallies.entry(tx.payer_id.as_str()).or_default();
        payer.total_paid += tx.amount;
        payer.payment_count += 1;
        payer.last_paid = payer.last_paid.max(Some(tx.reference_date));
        if in_window {
            payer.paid_in_window += tx.amount;
        }

        let receiver = tallies.entry(tx.receiver_id.as_str()).or_default();
        receiver.total_received += tx.amount;
        receiver.receipt_count += 1;
        receiver.last_received = receiver.last_received.max(Some(tx.reference_date));
        if in_window {
            receiver.received_in_window += tx.amount;
        }
    }

    let mut features = Vec::new();
    let mut start = 0;
    while start < snapshots.len() {
        let account_id = snapshots[start].account_id.as_str();
        let mut end = start + 1;
        while end < snapshots.len() && snapshots[end].account_id == account_id {
            end += 1;
        }
        let series = &snapshots[start..end];
        features.push(account_features(series, &tallies, as_of));
        start = end;
    }
    features
}

fn account_features(
    series: &[AccountSnapshot],
    tallies: &HashMap<&str, Tally>,
    as_of: DateTime<Utc>,
) -> AccountFeatures {
    // Ascending reference-date order puts the resolved snapshot last.
    let latest = series.last().expect("snapshot series is never empty");

    let points: Vec<(f64, f64)> = series
        .iter()
        .map(|s| (day_number(s.reference_date), s.current_balance))
        .collect();

    let default = Tally::default();
    let tally = tallies
        .get(latest.account_id.as_str())
        .unwrap_or(&default);

    let last_activity = tally.last_paid.max(tally.last_received);
    let days_since_last_activity = last_activity
        .map(|d| days_between(as_of, d))
        .unwrap_or(0.0);

    AccountFeatures {
        account_id: latest.account_id.clone(),
        annual_revenue: latest.annual_revenue,
        current_balance: latest.current_balance,
        industry_code: latest.industry_code.clone(),
        age_years: days_between(as_of, latest.opening_date) / DAYS_PER_YEAR,
        balance_trend: ols_slope(&points),
        net_cash_flow: tally.received_in_window - tally.paid_in_window,
        total_paid: tally.total_paid,
        payment_count: tally.payment_count,
        total_received: tally.total_received,
        receipt_count: tally.receipt_count,
        days_since_last_activity,
    }
}
