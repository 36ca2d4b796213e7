//! HTML row parsing and record normalization.
//!
//! Everything here is a pure function of its input: the same page source
//! always yields the same rows, and the same batch the same records.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use warrant_common::{
    BrokerMatch, PageBatch, Query, QueryConfig, QueryMode, RowFragment, WarrantRecord,
};

/// Selector the fetcher waits on before reading a page.
pub const LISTING_CONTAINER: &str = "table";

/// Data-table candidates, most specific first.
const TABLE_SELECTORS: [&str; 4] = [
    "table#GCWT1",
    "table.tbl",
    "table[id*=\"warrant\"]",
    "table",
];

/// name, code, price, moneyness, days remaining.
const MIN_CELLS: usize = 5;
const BROKER_CELL: usize = 5;

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));
static PAGE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*=\"p=\"]").expect("static selector"));
static TABLES: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    TABLE_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?(?:\d+(?:\.\d+)?|\.\d+)").expect("static regex"));

/// Decimal from a [`NUMBER`] match; `.5` reads as `0.5`.
fn decimal_of(number: &str) -> Option<Decimal> {
    let unsigned = number.trim_start_matches('+');
    let (sign, digits) = match unsigned.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", unsigned),
    };
    let padded = if digits.starts_with('.') {
        format!("{sign}0{digits}")
    } else {
        format!("{sign}{digits}")
    };
    Decimal::from_str(&padded).ok()
}

fn find_listing_table(doc: &Html) -> Option<ElementRef<'_>> {
    TABLES.iter().find_map(|sel| doc.select(sel).next())
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the data rows of the listing table.
///
/// The first row is the header. Rows with fewer than five cells (spacers,
/// footers, ad rows) are dropped. Cell text is whitespace-normalized.
pub fn parse_rows(html: &str) -> Vec<RowFragment> {
    let doc = Html::parse_document(html);
    let Some(table) = find_listing_table(&doc) else {
        return Vec::new();
    };
    table
        .select(&ROW)
        .skip(1)
        .filter_map(|tr| {
            let cells: Vec<String> = tr.select(&CELL).map(cell_text).collect();
            (cells.len() >= MIN_CELLS).then(|| RowFragment::new(cells))
        })
        .collect()
}

fn page_param(href: &str) -> Option<u32> {
    href.split(['?', '&'])
        .find_map(|kv| kv.strip_prefix("p="))
        .and_then(|v| v.trim().parse().ok())
}

/// Highest page number linked from the pagination, if there is one.
pub fn pagination_last_page(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);
    doc.select(&PAGE_LINK)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(page_param)
        .max()
}

/// First signed decimal in `text`, ignoring thousands separators.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let cleaned = text.replace([',', '，'], "");
    let m = NUMBER.find(&cleaned)?;
    decimal_of(m.as_str())
}

/// Split a moneyness cell such as `價外 10.65%` into label and percent.
///
/// A bare label (`平價`) has a percent of zero; a bare number has an empty
/// label.
pub fn parse_moneyness(text: &str) -> Option<(String, Decimal)> {
    let cleaned = text.replace([',', '，'], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    match NUMBER.find(cleaned) {
        Some(m) => {
            let percent = decimal_of(m.as_str())?;
            let label = format!("{}{}", &cleaned[..m.start()], &cleaned[m.end()..])
                .replace(['%', '％'], "")
                .trim()
                .to_string();
            Some((label, percent))
        }
        None => Some((cleaned.to_string(), Decimal::ZERO)),
    }
}

/// Whole, non-negative day count.
pub fn parse_days(text: &str) -> Option<u32> {
    let d = parse_decimal(text)?;
    if d.is_sign_negative() || !d.fract().is_zero() {
        return None;
    }
    d.to_u32()
}

/// Why a row was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("row has {0} cells")]
    TooFewCells(usize),
    #[error("empty {0}")]
    Empty(&'static str),
    #[error("unparseable {field}: {value:?}")]
    BadNumber { field: &'static str, value: String },
}

/// Records kept from one page plus skip counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub records: Vec<WarrantRecord>,
    /// Rows that failed to parse.
    pub skipped: usize,
    /// Rows parsed but removed by a filter.
    pub filtered: usize,
}

/// Turns row fragments into typed records and applies per-page filters.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    brokers: Vec<String>,
    broker_filter: Option<String>,
    broker_match: BrokerMatch,
    out_of_money_only: bool,
}

impl RecordExtractor {
    /// Unfiltered extractor using the configured broker directory.
    pub fn new(cfg: &QueryConfig) -> Self {
        Self {
            brokers: cfg.brokers.clone(),
            broker_filter: None,
            broker_match: cfg.broker_match,
            out_of_money_only: false,
        }
    }

    /// Extractor carrying the filters implied by `query`.
    pub fn for_query(query: &Query, cfg: &QueryConfig) -> Self {
        let mut extractor = Self::new(cfg);
        if let Some(filter) = query.broker_filter() {
            extractor = extractor.with_broker_filter(filter);
        }
        extractor.out_of_money_only(query.mode() == QueryMode::OutOfMoney)
    }

    /// Keep only rows whose broker matches `filter`. The filter is also added
    /// to the broker directory so it can be inferred from warrant names.
    pub fn with_broker_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        if !self.brokers.iter().any(|b| b == &filter) {
            self.brokers.insert(0, filter.clone());
        }
        self.broker_filter = Some(filter);
        self
    }

    pub fn out_of_money_only(mut self, yes: bool) -> Self {
        self.out_of_money_only = yes;
        self
    }

    fn infer_broker(&self, row: &RowFragment, name: &str) -> String {
        if let Some(explicit) = row.cell(BROKER_CELL).filter(|s| !s.is_empty()) {
            return explicit.to_string();
        }
        self.brokers
            .iter()
            .find(|b| name.contains(b.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    /// Parse one row into a record.
    pub fn parse_row(&self, row: &RowFragment) -> Result<WarrantRecord, RowError> {
        if row.cells.len() < MIN_CELLS {
            return Err(RowError::TooFewCells(row.cells.len()));
        }
        let cell = |i: usize| row.cell(i).unwrap_or_default().trim();

        let name = cell(0);
        if name.is_empty() {
            return Err(RowError::Empty("name"));
        }
        let code = cell(1);
        if code.is_empty() {
            return Err(RowError::Empty("code"));
        }
        let bad = |field: &'static str, value: &str| RowError::BadNumber {
            field,
            value: value.to_string(),
        };
        let price = parse_decimal(cell(2)).ok_or_else(|| bad("price", cell(2)))?;
        let (label, percent) =
            parse_moneyness(cell(3)).ok_or_else(|| bad("moneyness", cell(3)))?;
        let days = parse_days(cell(4)).ok_or_else(|| bad("days remaining", cell(4)))?;
        let broker = self.infer_broker(row, name);

        Ok(WarrantRecord::new(
            name, code, price, label, percent, days, broker,
        ))
    }

    fn keep(&self, record: &WarrantRecord) -> bool {
        if self.out_of_money_only && !record.is_out_of_money() {
            return false;
        }
        match &self.broker_filter {
            Some(filter) => self.broker_match.matches(record.broker(), filter),
            None => true,
        }
    }

    /// Parse and filter every row of `batch`, preserving row order.
    pub fn extract(&self, batch: &PageBatch) -> Extraction {
        let mut out = Extraction::default();
        for (idx, row) in batch.rows.iter().enumerate() {
            match self.parse_row(row) {
                Ok(record) if self.keep(&record) => out.records.push(record),
                Ok(_) => out.filtered += 1,
                Err(e) => {
                    debug!(
                        target: "warrant.extract",
                        page = batch.page,
                        row = idx,
                        error = %e,
                        "skipping malformed row"
                    );
                    out.skipped += 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing_html, row};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn batch(rows: Vec<RowFragment>) -> PageBatch {
        PageBatch {
            page: 1,
            rows,
            last_page: None,
        }
    }

    #[test]
    fn parses_listing_table_rows() {
        let html = listing_html(
            &[
                row("台積電元大5A購01", "05001P", "1.23", "價外 10.65%", "120"),
                row("台積電凱基5B售02", "05002Q", "0.88", "價內 3.1%", "45"),
            ],
            Some(4),
        );
        let rows = parse_rows(&html);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells[0], "台積電元大5A購01");
        assert_eq!(rows[1].cells[3], "價內 3.1%");
        assert_eq!(pagination_last_page(&html), Some(4));
    }

    #[test]
    fn row_parsing_ignores_formatting_noise() {
        let tidy = "<table id=\"GCWT1\"><tr><th>h</th></tr>\
            <tr><td>A元大</td><td>0001</td><td>1.5</td><td>價外 2%</td><td>10</td></tr></table>";
        let noisy = "<html><body>\n<table id=\"GCWT1\">\n  <tr><th>h</th></tr>\n  <tr>\n\
            <td>\n  A元大 </td><td> 0001\n</td><td>\t1.5</td>\
            <td><span>價外</span>\n <b>2%</b></td><td>10 </td></tr>\n</table></body></html>";
        assert_eq!(parse_rows(tidy), parse_rows(noisy));
    }

    #[test]
    fn prefers_data_table_over_layout_table() {
        let html = "<table><tr><td>nav</td></tr></table>\
            <table class=\"tbl\"><tr><th>h</th></tr>\
            <tr><td>X元大</td><td>0002</td><td>2</td><td>平價</td><td>30</td></tr></table>";
        let rows = parse_rows(html);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[1], "0002");
    }

    #[test]
    fn no_table_means_no_rows() {
        assert!(parse_rows("<html><body><p>查無資料</p></body></html>").is_empty());
        assert_eq!(pagination_last_page("<p>none</p>"), None);
    }

    #[test]
    fn numeric_helpers() {
        assert_eq!(parse_decimal("1,234.50"), Some(d("1234.50")));
        assert_eq!(parse_decimal("+0.5"), Some(d("0.5")));
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal(".5"), Some(d("0.5")));
        assert_eq!(parse_decimal("-.25"), Some(d("-0.25")));
        assert_eq!(
            parse_moneyness("價外 .8%"),
            Some(("價外".to_string(), d("0.8")))
        );
        assert_eq!(
            parse_moneyness("價外 10.65%"),
            Some(("價外".to_string(), d("10.65")))
        );
        assert_eq!(parse_moneyness("平價"), Some(("平價".to_string(), Decimal::ZERO)));
        assert_eq!(parse_moneyness("-5.2%"), Some((String::new(), d("-5.2"))));
        assert_eq!(parse_moneyness("  "), None);
        assert_eq!(parse_days("120天"), Some(120));
        assert_eq!(parse_days("-3"), None);
        assert_eq!(parse_days("1.5"), None);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let cfg = QueryConfig::default();
        let extractor = RecordExtractor::new(&cfg);
        let out = extractor.extract(&batch(vec![
            row("A元大", "0001", "1.1", "價外 1%", "10"),
            row("B元大", "0002", "--", "價外 1%", "10"),
            row("C元大", "0003", "1.3", "價內 2%", "abc"),
            RowFragment::new(vec!["short".into()]),
            row("D凱基", "0004", "1.4", "平價", "12"),
        ]));
        assert_eq!(out.skipped, 3);
        let codes: Vec<_> = out.records.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec!["0001", "0004"]);
        assert_eq!(out.records[1].broker(), "凱基");
    }

    #[test]
    fn broker_filter_applies_per_page() {
        let cfg = QueryConfig::default();
        let extractor = RecordExtractor::new(&cfg).with_broker_filter("元大");
        let out = extractor.extract(&batch(vec![
            row("台積電元大5A購01", "05001P", "1.23", "價外 10.65%", "120"),
            row("台積電凱基5B售02", "05002Q", "0.88", "價內 3.1%", "45"),
        ]));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.filtered, 1);
        assert!(out.records.iter().all(|r| r.broker() == "元大"));
    }

    #[test]
    fn explicit_broker_cell_wins() {
        let cfg = QueryConfig::default();
        let extractor = RecordExtractor::new(&cfg);
        let mut r = row("某權證", "0009", "1", "價外 1%", "5");
        r.cells.push("Macquarie".into());
        let rec = extractor.parse_row(&r).unwrap();
        assert_eq!(rec.broker(), "Macquarie");
    }

    #[test]
    fn unknown_filter_is_learned_from_names() {
        let cfg = QueryConfig {
            brokers: vec![],
            ..QueryConfig::default()
        };
        let extractor = RecordExtractor::new(&cfg).with_broker_filter("麥格理");
        let rows = vec![row("台積電麥格理5C購", "0010", "1", "價外 1%", "5")];
        let out = extractor.extract(&batch(rows));
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].broker(), "麥格理");
    }

    #[test]
    fn out_of_money_filter_uses_label() {
        let cfg = QueryConfig::default();
        let extractor = RecordExtractor::new(&cfg).out_of_money_only(true);
        let out = extractor.extract(&batch(vec![
            row("A", "1", "1", "價外 10.65%", "1"),
            row("B", "2", "1", "價內 3.1%", "1"),
            row("C", "3", "1", "平價", "1"),
            row("D", "4", "1", "-5.2%", "1"),
            row("E", "5", "1", "價外 0.5%", "1"),
        ]));
        let codes: Vec<_> = out.records.iter().map(|r| r.code()).collect();
        assert_eq!(codes, vec!["1", "5"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let cfg = QueryConfig::default();
        let extractor = RecordExtractor::new(&cfg).with_broker_filter("元大");
        let b = batch(vec![
            row("A元大", "0001", "1.1", "價外 1%", "10"),
            row("B凱基", "0002", "1.2", "價內 1%", "11"),
            row("C元大", "0003", "x", "價外 1%", "12"),
            row("D元大", "0004", "1.4", "價內 2%", "13"),
        ]);
        assert_eq!(extractor.extract(&b), extractor.extract(&b));
    }
}
