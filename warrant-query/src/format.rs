//! Rendering of query results into chat-sized text.
//!
//! The formatter builds a [`FormattedResult`] once per query; transports then
//! call [`FormattedResult::chunks`] with their own message length limit.

use serde::Serialize;
use warrant_common::{Query, QueryConfig, QueryMode, WarrantRecord};

const DIVIDER_WIDTH: usize = 30;

/// Typed outcome of one query, before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReport {
    pub query: Query,
    /// Page order, then row order within a page.
    pub records: Vec<WarrantRecord>,
    pub pages_fetched: u32,
    /// Rows dropped because they did not parse.
    pub skipped_rows: usize,
    /// Rows dropped by the broker or moneyness filter.
    pub filtered_rows: usize,
    /// Page at which the listing stopped with an error, after earlier pages
    /// were read.
    pub failed_page: Option<u32>,
}

impl QueryReport {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            records: Vec::new(),
            pages_fetched: 0,
            skipped_rows: 0,
            filtered_rows: 0,
            failed_page: None,
        }
    }
}

/// Rendered reply: a header, one entry per shown record, trailing notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedResult {
    pub header: String,
    pub entries: Vec<String>,
    pub truncated: bool,
    /// Records left out by the record cap.
    pub omitted: usize,
    pub notes: Vec<String>,
}

impl FormattedResult {
    fn pieces(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.header.as_str())
            .chain(self.entries.iter().map(String::as_str))
            .chain(self.notes.iter().map(String::as_str))
    }

    /// The whole reply as one string.
    pub fn text(&self) -> String {
        self.pieces().collect::<Vec<_>>().join("\n")
    }

    /// Split the reply into messages of at most `max_chars` characters.
    ///
    /// Pieces are packed greedily in order; the header only appears in the
    /// first message. A piece longer than the limit on its own is cut at
    /// character boundaries.
    pub fn chunks(&self, max_chars: usize) -> Vec<String> {
        let max = max_chars.max(1);
        let mut out = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for piece in self.pieces() {
            let len = piece.chars().count();
            if len > max {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                out.extend(hard_split(piece, max));
                continue;
            }
            let joined = if current.is_empty() { len } else { current_len + 1 + len };
            if joined > max {
                out.push(std::mem::take(&mut current));
                current.push_str(piece);
                current_len = len;
            } else {
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(piece);
                current_len = joined;
            }
        }
        if !current.is_empty() {
            out.push(current);
        }
        out
    }
}

fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Turns a [`QueryReport`] into a [`FormattedResult`].
#[derive(Debug, Clone)]
pub struct ResultFormatter {
    max_records: usize,
    page_ceiling: u32,
}

impl ResultFormatter {
    pub fn from_config(cfg: &QueryConfig) -> Self {
        Self {
            max_records: cfg.max_records_per_result,
            page_ceiling: cfg.full_mode_page_ceiling,
        }
    }

    pub fn format(&self, report: &QueryReport) -> FormattedResult {
        let total = report.records.len();
        let shown = total.min(self.max_records);
        let omitted = total - shown;

        let entries: Vec<String> = report.records[..shown].iter().map(render_record).collect();
        let header = self.header(&report.query, entries.len());

        let mut notes = Vec::new();
        if total == 0 {
            notes.push("未找到任何權證資料".to_string());
        }
        if omitted > 0 {
            notes.push(format!(
                "⚠️ 僅顯示前 {shown} 筆，另有 {omitted} 筆未顯示（總共 {total} 筆）"
            ));
        }
        if let Some(page) = report.failed_page {
            notes.push(format!(
                "⚠️ 第 {page} 頁讀取失敗，結果只包含前 {} 頁",
                page.saturating_sub(1)
            ));
        }
        if report.skipped_rows > 0 {
            notes.push(format!("⚠️ {} 筆資料格式異常已略過", report.skipped_rows));
        }

        FormattedResult {
            header,
            entries,
            truncated: omitted > 0,
            omitted,
            notes,
        }
    }

    fn header(&self, query: &Query, count: usize) -> String {
        let title = match query.mode() {
            QueryMode::Quick => "快查結果",
            QueryMode::Full => "查詢結果",
            QueryMode::OutOfMoney => "價外查詢結果",
        };
        let filter = query
            .broker_filter()
            .map(|f| format!(" ({f})"))
            .unwrap_or_default();
        let scope = if query.mode() != QueryMode::Quick && query.max_pages() >= self.page_ceiling {
            "全部頁面".to_string()
        } else {
            format!("前{}頁", query.max_pages())
        };
        format!(
            "🔍 {title} {code}{filter}\n共 {count} 筆資料（{scope}）\n{}",
            "=".repeat(DIVIDER_WIDTH),
            code = query.underlying_code(),
        )
    }
}

fn render_record(record: &WarrantRecord) -> String {
    format!(
        "📊 {}\n代號: {} | 價格: {}\n價內外: {} {}%\n剩餘天數: {}\n{}",
        record.name(),
        record.code(),
        record.price(),
        record.moneyness_label(),
        record.moneyness_percent(),
        record.days_remaining(),
        "─".repeat(DIVIDER_WIDTH),
    )
}
