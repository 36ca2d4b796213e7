//! Per-query pipeline driver.
//!
//! One query moves through
//! `Idle → Parsing → Fetching ⇄ Extracting → Formatting → Done`, or ends in
//! `Failed`. The fetch and extract phases run under a single wall-clock
//! budget; when it runs out the in-flight page stream is dropped, which
//! releases the browser session.

use std::time::Duration;

use futures::StreamExt;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use warrant_common::{Query, QueryConfig, Result, UnrecognizedPolicy, WarrantError};
use warrant_web::{FetchError, PageFetcher, RecordExtractor};

use crate::command::{Command, CommandInterpreter, unknown_command_text};
use crate::format::{QueryReport, ResultFormatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Idle,
    Parsing,
    Fetching,
    Extracting,
    Formatting,
    Done,
    Failed,
}

impl QueryPhase {
    pub fn can_advance_to(self, next: QueryPhase) -> bool {
        use QueryPhase::*;
        matches!(
            (self, next),
            (Idle, Parsing)
                | (Idle, Fetching)
                | (Parsing, Fetching)
                | (Parsing, Done)
                | (Parsing, Failed)
                | (Fetching, Extracting)
                | (Fetching, Formatting)
                | (Fetching, Failed)
                | (Extracting, Fetching)
                | (Extracting, Failed)
                | (Formatting, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueryPhase::Done | QueryPhase::Failed)
    }
}

struct PhaseTracker {
    id: Uuid,
    phase: QueryPhase,
}

impl PhaseTracker {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: QueryPhase::Idle,
        }
    }

    fn advance(&mut self, next: QueryPhase) {
        let valid = self.phase.can_advance_to(next);
        debug_assert!(valid, "invalid transition {:?} -> {:?}", self.phase, next);
        if !valid {
            warn!(
                target: "warrant.query",
                query_id = %self.id,
                from = ?self.phase,
                to = ?next,
                "unexpected phase transition"
            );
        }
        debug!(
            target: "warrant.query",
            query_id = %self.id,
            from = ?self.phase,
            to = ?next,
            "phase"
        );
        self.phase = next;
    }
}

/// Runs chat commands end to end.
pub struct QueryOrchestrator {
    config: QueryConfig,
    interpreter: CommandInterpreter,
    fetcher: PageFetcher,
    formatter: ResultFormatter,
    unrecognized: UnrecognizedPolicy,
}

impl QueryOrchestrator {
    pub fn new(
        config: QueryConfig,
        fetcher: PageFetcher,
        unrecognized: UnrecognizedPolicy,
    ) -> Self {
        Self {
            interpreter: CommandInterpreter::new(config.clone()),
            formatter: ResultFormatter::from_config(&config),
            config,
            fetcher,
            unrecognized,
        }
    }

    pub fn interpreter(&self) -> &CommandInterpreter {
        &self.interpreter
    }

    pub fn formatter(&self) -> &ResultFormatter {
        &self.formatter
    }

    fn budget(&self) -> Duration {
        Duration::from_millis(self.config.query_wall_clock_budget_ms)
    }

    /// Answer one chat message. An empty vector means send nothing.
    pub async fn handle(&self, text: &str) -> Vec<String> {
        let id = Uuid::new_v4();
        let span = info_span!(target: "warrant.query", "handle", query_id = %id);
        self.handle_inner(text, id).instrument(span).await
    }

    async fn handle_inner(&self, text: &str, id: Uuid) -> Vec<String> {
        let mut phases = PhaseTracker::new(id);
        phases.advance(QueryPhase::Parsing);

        match self.interpreter.parse(text) {
            Command::Help => {
                phases.advance(QueryPhase::Done);
                vec![self.interpreter.help_text()]
            }
            Command::Malformed { hint } => {
                phases.advance(QueryPhase::Failed);
                vec![WarrantError::MalformedCommand { hint }.user_message()]
            }
            Command::Unrecognized(_) => {
                phases.advance(QueryPhase::Done);
                match self.unrecognized {
                    UnrecognizedPolicy::Ignore => Vec::new(),
                    UnrecognizedPolicy::Fallback => vec![unknown_command_text()],
                }
            }
            Command::Query(query) => match self.execute(&query, &mut phases).await {
                Ok(report) => {
                    let formatted = self.formatter.format(&report);
                    let chunks = formatted.chunks(self.config.max_message_chars);
                    phases.advance(QueryPhase::Done);
                    info!(
                        target: "warrant.query",
                        records = report.records.len(),
                        shown = formatted.entries.len(),
                        chunks = chunks.len(),
                        "reply ready"
                    );
                    chunks
                }
                Err(e) => vec![e.user_message()],
            },
        }
    }

    /// Run an already-validated query and return its typed report.
    pub async fn run(&self, query: &Query) -> Result<QueryReport> {
        let id = Uuid::new_v4();
        let span = info_span!(target: "warrant.query", "run", query_id = %id);
        async {
            let mut phases = PhaseTracker::new(id);
            let report = self.execute(query, &mut phases).await?;
            phases.advance(QueryPhase::Done);
            Ok::<_, WarrantError>(report)
        }
        .instrument(span)
        .await
    }

    /// Fetch and extract under the wall-clock budget. Leaves the tracker in
    /// `Formatting` on success and `Failed` otherwise.
    async fn execute(&self, query: &Query, phases: &mut PhaseTracker) -> Result<QueryReport> {
        info!(
            target: "warrant.query",
            code = query.underlying_code(),
            mode = ?query.mode(),
            filter = ?query.broker_filter(),
            max_pages = query.max_pages(),
            "query started"
        );
        phases.advance(QueryPhase::Fetching);

        let budget = self.budget();
        let outcome = match tokio::time::timeout(budget, self.collect(query, phases)).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(WarrantError::Timeout),
        };

        match outcome {
            Ok(report) => {
                phases.advance(QueryPhase::Formatting);
                info!(
                    target: "warrant.query",
                    pages = report.pages_fetched,
                    records = report.records.len(),
                    skipped = report.skipped_rows,
                    filtered = report.filtered_rows,
                    failed_page = ?report.failed_page,
                    "query finished"
                );
                Ok(report)
            }
            Err(e) => {
                phases.advance(QueryPhase::Failed);
                warn!(target: "warrant.query", error = %e, ?budget, "query failed");
                Err(e)
            }
        }
    }

    async fn collect(&self, query: &Query, phases: &mut PhaseTracker) -> Result<QueryReport> {
        let extractor = RecordExtractor::for_query(query, &self.config);
        let mut report = QueryReport::new(query.clone());

        let pages = self
            .fetcher
            .fetch_pages(query.underlying_code(), query.max_pages());
        futures::pin_mut!(pages);

        while let Some(item) = pages.next().await {
            match item {
                Ok(batch) => {
                    phases.advance(QueryPhase::Extracting);
                    let extraction = extractor.extract(&batch);
                    report.pages_fetched += 1;
                    report.skipped_rows += extraction.skipped;
                    report.filtered_rows += extraction.filtered;
                    report.records.extend(extraction.records);
                    phases.advance(QueryPhase::Fetching);
                }
                Err(FetchError::Failed { page, reason }) if report.pages_fetched > 0 => {
                    warn!(
                        target: "warrant.query",
                        page,
                        reason = %reason,
                        kept_pages = report.pages_fetched,
                        "listing stopped early; keeping earlier pages"
                    );
                    report.failed_page = Some(page);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(report)
    }
}
