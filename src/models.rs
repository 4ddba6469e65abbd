use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Database Models ============

/// A timestamped record of an account's financial state.
///
/// Accounts are stored as a time series of snapshots keyed by
/// (`account_id`, `reference_date`); the current view of an account is the
/// snapshot with the maximum reference date.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Stable business identifier (e.g. a tax id string).
    pub account_id: String,
    /// Declared annual revenue at this snapshot.
    pub annual_revenue: f64,
    /// Current balance at this snapshot.
    pub current_balance: f64,
    /// Date the account was opened.
    pub opening_date: DateTime<Utc>,
    /// Economic-activity classification code.
    pub industry_code: String,
    /// Date this snapshot was taken.
    pub reference_date: DateTime<Utc>,
}

/// A single ledger entry between two accounts.
///
/// Counterparty ids are not guaranteed to have a snapshot row; queries must
/// tolerate unknown payers and receivers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque row id.
    pub id: Uuid,
    /// Transaction amount, non-negative.
    pub amount: f64,
    /// Free-text transaction type/description.
    pub description: String,
    /// Reference timestamp of the transaction.
    pub reference_date: DateTime<Utc>,
    /// Account that paid.
    pub payer_id: String,
    /// Account that received.
    pub receiver_id: String,
}

// ============ Maturity ============

/// Business-maturity stage of an account.
///
/// Serialized with the Portuguese stage names used across the reporting
/// stack, accents included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MaturityStage {
    Iniciante,
    #[serde(rename = "Expansão")]
    Expansao,
    #[serde(rename = "Declínio")]
    Declinio,
    Madura,
}

impl MaturityStage {
    /// All stages, in lifecycle order.
    pub const ALL: [MaturityStage; 4] = [
        MaturityStage::Iniciante,
        MaturityStage::Expansao,
        MaturityStage::Declinio,
        MaturityStage::Madura,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaturityStage::Iniciante => "Iniciante",
            MaturityStage::Expansao => "Expansão",
            MaturityStage::Declinio => "Declínio",
            MaturityStage::Madura => "Madura",
        }
    }
}

impl fmt::Display for MaturityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaturityStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Iniciante" => Ok(MaturityStage::Iniciante),
            "Expansão" | "Expansao" => Ok(MaturityStage::Expansao),
            "Declínio" | "Declinio" => Ok(MaturityStage::Declinio),
            "Madura" => Ok(MaturityStage::Madura),
            other => Err(format!("unknown maturity stage: {}", other)),
        }
    }
}

// ============ Filters ============

/// Which side of a transaction the queried account must be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Account is the receiver.
    Income,
    /// Account is the payer.
    Expense,
    /// Account is either party.
    Both,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Direction::Income),
            "expense" => Ok(Direction::Expense),
            "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Optional, independently combinable filters for the transaction listing.
/// All provided filters are AND-combined.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilters {
    /// Calendar months (1-12) to match, ignoring year.
    pub months: Option<Vec<u32>>,
    /// Transaction descriptions to match, OR-combined.
    pub types: Option<Vec<String>>,
    /// Side of the transaction the account must be on. Defaults to both.
    pub direction: Option<Direction>,
    /// Specific counterparty account id, matched against either role.
    pub counterparty: Option<String>,
}

// ============ Query Outputs ============

/// Headline transaction statistics for one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionsOverview {
    /// Distinct accounts that paid this account.
    pub counterparty_count: i64,
    /// Transactions where the account is either party.
    pub transaction_count: i64,
    /// Signed sum: amounts received minus amounts paid.
    pub balance: f64,
}

/// One row of the filtered transaction listing, seen from the queried
/// account's perspective.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionEntry {
    /// Income when the account received, expense when it paid.
    pub direction: Direction,
    /// The other party of the transaction.
    pub counterparty: String,
    pub reference_date: DateTime<Utc>,
    pub description: String,
    pub amount: f64,
}

/// A page of the filtered transaction listing.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub total_pages: i64,
    pub items: Vec<TransactionEntry>,
}

/// A page of resolved account snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct AccountPage {
    pub total_pages: i64,
    pub items: Vec<AccountSnapshot>,
}

/// Income and expense totals for one calendar month (1-12, year-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFlow {
    pub month: u32,
    pub income: f64,
    pub expense: f64,
}

/// One entry of the industry ranking: an industry code and how many
/// account rows it holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustryShare {
    pub industry_code: String,
    pub account_count: i64,
}

/// Store-wide headline totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub total_accounts: i64,
    pub total_transactions: i64,
    pub total_volume: f64,
    pub total_revenue: f64,
}

/// Ceiling division used by every paginated listing:
/// `total_pages = ceil(total_items / page_size)`.
pub fn total_pages(total_items: i64, page_size: i64) -> i64 {
    debug_assert!(page_size > 0);
    (total_items + page_size - 1) / page_size
}
