//! Common types and utilities shared across the warrant workspace.
//!
//! This crate defines the query model, the extracted record types, the
//! resolved [`QueryConfig`], observability helpers, and the shared error
//! taxonomy used throughout the workspace. It stays dependency-light so every
//! other crate can depend on it.
//!
//! # Overview
//!
//! - [`QueryConfig`]: resolved limits and defaults consumed by the pipeline
//! - [`Query`] and [`QueryMode`]: a validated query intent
//! - [`WarrantRecord`], [`RowFragment`], [`PageBatch`]: listing data
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`WarrantError`] and [`Result`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use warrant_common::{Query, QueryConfig, QueryMode};
//!
//! let cfg = QueryConfig::default();
//! let q = Query::quick("6669", &cfg).unwrap();
//! assert_eq!(q.mode(), QueryMode::Quick);
//! assert_eq!(q.broker_filter(), Some("元大"));
//! assert_eq!(q.max_pages(), 3);
//! ```
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod observability;

/// Shortest listing code accepted for an underlying instrument.
pub const MIN_CODE_LEN: usize = 4;
/// Longest listing code accepted for an underlying instrument.
pub const MAX_CODE_LEN: usize = 6;

/// How a broker filter is compared against a record's broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMatch {
    /// Case-insensitive equality.
    Exact,
    /// Case-insensitive substring.
    #[default]
    Contains,
}

impl BrokerMatch {
    /// Returns `true` when `broker` satisfies `filter` under this mode.
    pub fn matches(self, broker: &str, filter: &str) -> bool {
        let broker = broker.trim().to_lowercase();
        let filter = filter.trim().to_lowercase();
        if filter.is_empty() {
            return true;
        }
        match self {
            BrokerMatch::Exact => broker == filter,
            BrokerMatch::Contains => broker.contains(&filter),
        }
    }
}

/// Resolved query limits and defaults.
///
/// Loaded once at startup (see the `warrant-config` crate) and passed to the
/// interpreter, fetcher and formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Broker forced onto quick queries.
    pub quick_mode_broker_filter: String,
    /// Page cap forced onto quick queries.
    pub quick_mode_max_pages: u32,
    /// Listing page; `no`, `r`, `p` and `d` query parameters are appended.
    pub listing_base_url: String,
    /// Bounded wait for the listing container after navigation.
    pub page_load_timeout_ms: u64,
    /// Bounded wait for the navigation itself.
    pub navigation_timeout_ms: u64,
    /// Whole-query budget covering session wait, fetch and extraction.
    pub query_wall_clock_budget_ms: u64,
    /// Hard cap on rendered records, independent of the page cap.
    pub max_records_per_result: usize,
    /// Safety ceiling on pages for unbounded queries.
    pub full_mode_page_ceiling: u32,
    /// Base delay before the single page retry.
    pub retry_backoff_ms: u64,
    /// Delay between consecutive pages of one listing.
    pub page_pacing_ms: u64,
    /// Transport message length limit, in characters.
    pub max_message_chars: usize,
    pub broker_match: BrokerMatch,
    /// Known issuer names, used to infer a broker from a warrant name.
    pub brokers: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            quick_mode_broker_filter: "元大".to_string(),
            quick_mode_max_pages: 3,
            listing_base_url: "https://histock.tw/stock/warrant.aspx".to_string(),
            page_load_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            query_wall_clock_budget_ms: 60_000,
            max_records_per_result: 10,
            full_mode_page_ceiling: 50,
            retry_backoff_ms: 1_000,
            page_pacing_ms: 500,
            max_message_chars: 5_000,
            broker_match: BrokerMatch::Contains,
            brokers: [
                "元大", "凱基", "群益", "富邦", "國泰", "統一", "永豐", "兆豐", "中信", "第一",
                "華南", "台新", "康和", "元富", "宏遠", "國票", "日盛", "亞東", "摩根",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl QueryConfig {
    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.quick_mode_max_pages == 0 {
            return Err(WarrantError::Config(
                "quick_mode_max_pages must be at least 1".into(),
            ));
        }
        if self.full_mode_page_ceiling == 0 {
            return Err(WarrantError::Config(
                "full_mode_page_ceiling must be at least 1".into(),
            ));
        }
        if self.max_message_chars == 0 {
            return Err(WarrantError::Config(
                "max_message_chars must be at least 1".into(),
            ));
        }
        if self.quick_mode_broker_filter.trim().is_empty() {
            return Err(WarrantError::Config(
                "quick_mode_broker_filter must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    #[default]
    Balanced,
    Maximum,
}

/// What to do with input that is not a recognized command.
///
/// There is deliberately no `Default`: deployments choose explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnrecognizedPolicy {
    /// Send nothing back.
    Ignore,
    /// Reply with the command summary.
    Fallback,
}

/// Kind of scan a user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// Broker-filtered, page-capped scan.
    Quick,
    /// Unfiltered scan up to the safety ceiling.
    Full,
    /// Unfiltered scan keeping only out-of-the-money warrants.
    OutOfMoney,
}

/// A validated query intent.
///
/// Fields are private: every `Query` in the system went through one of the
/// constructors below, so `max_pages >= 1` and the code is 4–6 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    mode: QueryMode,
    underlying_code: String,
    broker_filter: Option<String>,
    max_pages: u32,
}

impl Query {
    /// Quick scan: configured broker filter and page cap.
    pub fn quick(code: &str, cfg: &QueryConfig) -> Result<Self> {
        Ok(Self {
            mode: QueryMode::Quick,
            underlying_code: checked_code(code)?,
            broker_filter: Some(cfg.quick_mode_broker_filter.clone()),
            max_pages: cfg
                .quick_mode_max_pages
                .clamp(1, cfg.full_mode_page_ceiling.max(1)),
        })
    }

    /// Full scan: no filter, every page up to the safety ceiling.
    pub fn full(code: &str, cfg: &QueryConfig) -> Result<Self> {
        Ok(Self {
            mode: QueryMode::Full,
            underlying_code: checked_code(code)?,
            broker_filter: None,
            max_pages: cfg.full_mode_page_ceiling.max(1),
        })
    }

    /// Out-of-the-money scan over `pages` pages, or every page when `None`.
    pub fn out_of_money(code: &str, pages: Option<u32>, cfg: &QueryConfig) -> Result<Self> {
        let ceiling = cfg.full_mode_page_ceiling.max(1);
        let max_pages = match pages {
            Some(0) => {
                return Err(WarrantError::InvalidQuery(
                    "page count must be at least 1".into(),
                ))
            }
            Some(n) => n.min(ceiling),
            None => ceiling,
        };
        Ok(Self {
            mode: QueryMode::OutOfMoney,
            underlying_code: checked_code(code)?,
            broker_filter: None,
            max_pages,
        })
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    pub fn underlying_code(&self) -> &str {
        &self.underlying_code
    }

    pub fn broker_filter(&self) -> Option<&str> {
        self.broker_filter.as_deref()
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// `true` when the page count is the safety ceiling rather than a user or
    /// quick-mode cap.
    pub fn is_unbounded(&self, cfg: &QueryConfig) -> bool {
        self.mode != QueryMode::Quick && self.max_pages >= cfg.full_mode_page_ceiling
    }
}

/// Returns `true` for 4–6 ASCII digits.
pub fn is_valid_underlying_code(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_digit())
}

fn checked_code(code: &str) -> Result<String> {
    let code = code.trim();
    if is_valid_underlying_code(code) {
        Ok(code.to_string())
    } else {
        Err(WarrantError::InvalidQuery(format!(
            "underlying code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} digits, got {code:?}"
        )))
    }
}

/// One warrant listing row, fully typed.
///
/// Built by the record extractor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantRecord {
    name: String,
    code: String,
    price: Decimal,
    moneyness_label: String,
    moneyness_percent: Decimal,
    days_remaining: u32,
    broker: String,
}

impl WarrantRecord {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        price: Decimal,
        moneyness_label: impl Into<String>,
        moneyness_percent: Decimal,
        days_remaining: u32,
        broker: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            price,
            moneyness_label: moneyness_label.into(),
            moneyness_percent,
            days_remaining,
            broker: broker.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn moneyness_label(&self) -> &str {
        &self.moneyness_label
    }

    pub fn moneyness_percent(&self) -> Decimal {
        self.moneyness_percent
    }

    pub fn days_remaining(&self) -> u32 {
        self.days_remaining
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Out-of-the-money warrants carry a `價外` label.
    pub fn is_out_of_money(&self) -> bool {
        self.moneyness_label.contains("價外")
    }
}

/// Whitespace-normalized text cells of one listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFragment {
    pub cells: Vec<String>,
}

impl RowFragment {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn cell(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).map(String::as_str)
    }
}

/// Raw rows of one listing page, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBatch {
    /// 1-based page index.
    pub page: u32,
    pub rows: Vec<RowFragment>,
    /// Highest page number linked from this page's pagination, if any.
    pub last_page: Option<u32>,
}

/// Error types used across the warrant pipeline.
#[derive(thiserror::Error, Debug)]
pub enum WarrantError {
    /// The command was recognized but its argument was missing or invalid.
    #[error("Malformed command: {hint}")]
    MalformedCommand { hint: String },

    /// A query could not be constructed from the given values.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The listing could not be loaded.
    #[error("Fetch failed on page {page}: {reason}")]
    FetchFailed { page: u32, reason: String },

    /// Operation exceeded the per-query wall-clock budget.
    #[error("Query exceeded its time budget")]
    Timeout,

    /// No browser session became free in time.
    #[error("No browser session available")]
    PoolExhausted,

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A driver (browser, network, etc.) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),
}

impl WarrantError {
    /// Single-chunk reply shown to the user. Never carries internal detail.
    pub fn user_message(&self) -> String {
        match self {
            WarrantError::MalformedCommand { hint } => hint.clone(),
            WarrantError::InvalidQuery(_) => {
                "❌ 股票代號格式錯誤\n請輸入 4-6 位數字的股票代號".to_string()
            }
            WarrantError::FetchFailed { .. } => {
                "❌ 查詢失敗\n無法取得權證資料，請確認股票代號後再試".to_string()
            }
            WarrantError::Timeout => {
                "⏱️ 查詢時間過長\n請縮小查詢範圍（例如改用快查）後再試".to_string()
            }
            WarrantError::PoolExhausted => "⌛ 系統忙碌中\n請稍後再試".to_string(),
            WarrantError::Config(_) | WarrantError::Driver(_) => {
                "❌ 查詢失敗\n系統發生錯誤，請稍後再試".to_string()
            }
        }
    }
}

/// Convenient alias for results that use [`WarrantError`].
pub type Result<T> = std::result::Result<T, WarrantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_query_takes_configured_filter_and_cap() {
        let cfg = QueryConfig {
            quick_mode_broker_filter: "凱基".into(),
            quick_mode_max_pages: 2,
            ..QueryConfig::default()
        };
        let q = Query::quick(" 2330 ", &cfg).unwrap();
        assert_eq!(q.underlying_code(), "2330");
        assert_eq!(q.broker_filter(), Some("凱基"));
        assert_eq!(q.max_pages(), 2);
    }

    #[test]
    fn full_query_is_unfiltered_up_to_ceiling() {
        let cfg = QueryConfig::default();
        let q = Query::full("2330", &cfg).unwrap();
        assert_eq!(q.broker_filter(), None);
        assert_eq!(q.max_pages(), cfg.full_mode_page_ceiling);
        assert!(q.is_unbounded(&cfg));
    }

    #[test]
    fn out_of_money_pages_are_clamped() {
        let cfg = QueryConfig {
            full_mode_page_ceiling: 8,
            ..QueryConfig::default()
        };
        assert_eq!(Query::out_of_money("6669", Some(5), &cfg).unwrap().max_pages(), 5);
        assert_eq!(Query::out_of_money("6669", Some(99), &cfg).unwrap().max_pages(), 8);
        assert_eq!(Query::out_of_money("6669", None, &cfg).unwrap().max_pages(), 8);
        assert!(Query::out_of_money("6669", Some(0), &cfg).is_err());
    }

    #[test]
    fn rejects_bad_codes() {
        let cfg = QueryConfig::default();
        for code in ["", "123", "1234567", "23a0", "２３３０"] {
            assert!(Query::full(code, &cfg).is_err(), "{code:?} accepted");
        }
    }

    #[test]
    fn broker_match_modes() {
        assert!(BrokerMatch::Contains.matches("元大證券", "元大"));
        assert!(!BrokerMatch::Exact.matches("元大證券", "元大"));
        assert!(BrokerMatch::Exact.matches("KGI", "kgi"));
        assert!(!BrokerMatch::Contains.matches("凱基", "元大"));
    }

    #[test]
    fn config_validation_rejects_zero_caps() {
        let cfg = QueryConfig {
            quick_mode_max_pages: 0,
            ..QueryConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(WarrantError::Config(_))));
        assert!(QueryConfig::default().validate().is_ok());
    }

    #[test]
    fn user_messages_hide_details() {
        let err = WarrantError::FetchFailed {
            page: 1,
            reason: "chromedriver refused connection on 127.0.0.1:9515".into(),
        };
        assert!(!err.user_message().contains("9515"));
        assert_ne!(
            WarrantError::Timeout.user_message(),
            WarrantError::PoolExhausted.user_message()
        );
    }
}
