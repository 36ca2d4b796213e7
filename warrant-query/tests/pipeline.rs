use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use warrant_common::{BrokerMatch, Query, QueryConfig, UnrecognizedPolicy, WarrantError};
use warrant_query::QueryOrchestrator;
use warrant_web::testing::{ScriptedPage, ScriptedSessions, listing_html, row};
use warrant_web::{PageFetcher, SessionPool};

fn config() -> QueryConfig {
    QueryConfig {
        retry_backoff_ms: 0,
        page_pacing_ms: 0,
        quick_mode_broker_filter: "元大".into(),
        quick_mode_max_pages: 3,
        full_mode_page_ceiling: 6,
        max_records_per_result: 50,
        ..QueryConfig::default()
    }
}

fn orchestrator(
    sessions: &ScriptedSessions,
    cfg: QueryConfig,
    policy: UnrecognizedPolicy,
) -> QueryOrchestrator {
    let pool = Arc::new(SessionPool::new(
        Arc::new(sessions.clone()),
        1,
        Duration::from_millis(50),
    ));
    let fetcher = PageFetcher::new(pool, &cfg).unwrap();
    QueryOrchestrator::new(cfg, fetcher, policy)
}

/// Page `n` with one 元大 and one 凱基 warrant, plus one malformed row.
fn mixed_page(n: u32, last: Option<u32>) -> ScriptedPage {
    ScriptedPage::Html(listing_html(
        &[
            row(
                &format!("台積電元大{n}A購"),
                &format!("{n}0001"),
                "1.10",
                "價外 12.5%",
                "120",
            ),
            row(&format!("台積電凱基{n}B購"), &format!("{n}0002"), "0.95", "價內 4%", "60"),
            row(&format!("台積電群益{n}C售"), &format!("{n}0003"), "--", "價外 1%", "30"),
        ],
        last,
    ))
}

fn mixed_listing(pages: u32) -> ScriptedSessions {
    ScriptedSessions::single((1..=pages).map(|n| (n, mixed_page(n, Some(pages)))))
}

fn header_count(text: &str) -> usize {
    let re = Regex::new(r"共 (\d+) 筆資料").unwrap();
    re.captures(text).unwrap()[1].parse().unwrap()
}

#[tokio::test]
async fn quick_query_is_filtered_and_page_capped() {
    let sessions = mixed_listing(5);
    let cfg = config();
    let orch = orchestrator(&sessions, cfg.clone(), UnrecognizedPolicy::Ignore);

    let report = orch.run(&Query::quick("6669", &cfg).unwrap()).await.unwrap();
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(sessions.stats.requested_pages(), vec![1, 2, 3]);
    assert_eq!(report.records.len(), 3);
    assert!(
        report
            .records
            .iter()
            .all(|r| BrokerMatch::Contains.matches(r.broker(), "元大"))
    );
    assert_eq!(report.skipped_rows, 3);
    assert_eq!(report.filtered_rows, 3);
}

#[tokio::test]
async fn quick_reply_header_names_filter() {
    let sessions = mixed_listing(5);
    let orch = orchestrator(&sessions, config(), UnrecognizedPolicy::Ignore);

    let reply = orch.handle("快查 6669").await;
    assert_eq!(reply.len(), 1);
    assert!(reply[0].starts_with("🔍 快查結果 6669 (元大)"));
    assert!(reply[0].contains("（前3頁）"));
    assert_eq!(header_count(&reply[0]), reply[0].matches("📊 ").count());
    assert!(!reply[0].contains("凱基"));
    assert_eq!(sessions.stats.closed(), 1);
}

#[tokio::test]
async fn full_query_keeps_every_broker_in_page_order() {
    let sessions = mixed_listing(4);
    let cfg = config();
    let orch = orchestrator(&sessions, cfg.clone(), UnrecognizedPolicy::Ignore);

    let query = Query::full("2330", &cfg).unwrap();
    assert_eq!(query.broker_filter(), None);
    assert_eq!(query.max_pages(), cfg.full_mode_page_ceiling);

    let report = orch.run(&query).await.unwrap();
    assert_eq!(report.pages_fetched, 4);
    let codes: Vec<&str> = report.records.iter().map(|r| r.code()).collect();
    assert_eq!(
        codes,
        vec!["10001", "10002", "20001", "20002", "30001", "30002", "40001", "40002"]
    );
    assert!(report.records.iter().any(|r| r.broker() == "凱基"));

    let reply = orch.handle("查詢 2330").await.join("\n");
    assert!(reply.contains("（全部頁面）"));
    assert!(reply.contains("凱基"));
}

#[tokio::test]
async fn out_of_money_query_drops_in_the_money_rows() {
    let sessions = mixed_listing(2);
    let orch = orchestrator(&sessions, config(), UnrecognizedPolicy::Ignore);

    let reply = orch.handle("價外 6669 2").await.join("\n");
    assert!(reply.contains("價外查詢結果 6669"));
    assert_eq!(header_count(&reply), 2);
    assert!(!reply.contains("價內 "));
}

#[tokio::test]
async fn help_and_malformed_never_fetch() {
    let sessions = mixed_listing(1);
    let orch = orchestrator(&sessions, config(), UnrecognizedPolicy::Ignore);

    let help = orch.handle("幫助").await;
    assert_eq!(help, vec![orch.interpreter().help_text()]);

    let malformed = orch.handle("快查").await;
    assert_eq!(malformed.len(), 1);
    assert!(malformed[0].contains("快查 股票代號"));

    assert_eq!(sessions.stats.opened(), 0);
    assert_eq!(sessions.stats.loads(), 0);
}

#[tokio::test]
async fn unrecognized_input_follows_policy() {
    let sessions = mixed_listing(1);
    let ignore = orchestrator(&sessions, config(), UnrecognizedPolicy::Ignore);
    assert!(ignore.handle("早安").await.is_empty());

    let fallback = orchestrator(&sessions, config(), UnrecognizedPolicy::Fallback);
    let reply = fallback.handle("早安").await;
    assert_eq!(reply.len(), 1);
    assert!(reply[0].contains("無法識別"));
    assert_eq!(sessions.stats.opened(), 0);
}

#[tokio::test]
async fn slow_listing_times_out_and_releases_session() {
    let sessions = ScriptedSessions::single([(
        1,
        ScriptedPage::Slow(Duration::from_millis(500), listing_html(&[], None)),
    )]);
    let cfg = QueryConfig {
        query_wall_clock_budget_ms: 50,
        ..config()
    };
    let orch = orchestrator(&sessions, cfg.clone(), UnrecognizedPolicy::Ignore);

    let err = orch.run(&Query::quick("6669", &cfg).unwrap()).await.unwrap_err();
    assert!(matches!(err, WarrantError::Timeout));

    let reply = orch.handle("快查 6669").await;
    assert_eq!(reply, vec![WarrantError::Timeout.user_message()]);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(sessions.stats.opened(), 2);
    assert_eq!(sessions.stats.closed(), 2);
}

#[tokio::test]
async fn timeout_discards_pages_already_read() {
    let sessions = ScriptedSessions::single([
        (1, mixed_page(1, None)),
        (
            2,
            ScriptedPage::Slow(Duration::from_millis(500), listing_html(&[], None)),
        ),
    ]);
    let cfg = QueryConfig {
        query_wall_clock_budget_ms: 80,
        ..config()
    };
    let orch = orchestrator(&sessions, cfg, UnrecognizedPolicy::Ignore);

    let reply = orch.handle("查詢 2330").await;
    assert_eq!(reply, vec![WarrantError::Timeout.user_message()]);
    assert!(!reply[0].contains("📊"));
    assert_eq!(sessions.stats.requested_pages(), vec![1, 2]);
}

#[tokio::test]
async fn later_page_failure_keeps_earlier_pages() {
    let sessions = ScriptedSessions::single([
        (1, mixed_page(1, None)),
        (2, mixed_page(2, None)),
        (3, ScriptedPage::Timeout),
    ]);
    let cfg = config();
    let orch = orchestrator(&sessions, cfg.clone(), UnrecognizedPolicy::Ignore);

    let report = orch.run(&Query::full("2330", &cfg).unwrap()).await.unwrap();
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.failed_page, Some(3));
    assert_eq!(report.records.len(), 4);

    let reply = orch.handle("查詢 2330").await.join("\n");
    assert!(reply.contains("第 3 頁讀取失敗"));
}

#[tokio::test]
async fn missing_listing_is_a_single_failure_reply() {
    let sessions = ScriptedSessions::single([(1, ScriptedPage::Missing)]);
    let cfg = config();
    let orch = orchestrator(&sessions, cfg.clone(), UnrecognizedPolicy::Ignore);

    let err = orch.run(&Query::full("9999", &cfg).unwrap()).await.unwrap_err();
    assert!(matches!(err, WarrantError::FetchFailed { page: 1, .. }));

    let reply = orch.handle("查詢 9999").await;
    assert_eq!(reply.len(), 1);
    assert!(reply[0].starts_with("❌ 查詢失敗"));
}

#[tokio::test]
async fn busy_pool_reports_pool_exhausted() {
    let sessions = mixed_listing(1);
    let cfg = config();
    let pool = Arc::new(SessionPool::new(
        Arc::new(sessions.clone()),
        1,
        Duration::from_millis(30),
    ));
    let fetcher = PageFetcher::new(pool.clone(), &cfg).unwrap();
    let orch = QueryOrchestrator::new(cfg.clone(), fetcher, UnrecognizedPolicy::Ignore);

    let held = pool.acquire().await.unwrap();
    let err = orch.run(&Query::quick("6669", &cfg).unwrap()).await.unwrap_err();
    assert!(matches!(err, WarrantError::PoolExhausted));
    assert_eq!(
        orch.handle("快查 6669").await,
        vec![WarrantError::PoolExhausted.user_message()]
    );

    held.release().await;
    assert!(orch.run(&Query::quick("6669", &cfg).unwrap()).await.is_ok());
}

#[tokio::test]
async fn long_reply_is_chunked_with_header_once() {
    let sessions = mixed_listing(6);
    let cfg = QueryConfig {
        max_message_chars: 300,
        ..config()
    };
    let orch = orchestrator(&sessions, cfg, UnrecognizedPolicy::Ignore);

    let reply = orch.handle("查詢 2330").await;
    assert!(reply.len() > 1);
    assert!(reply.iter().all(|c| c.chars().count() <= 300));
    assert_eq!(reply.iter().filter(|c| c.contains("筆資料（")).count(), 1);
    let all = reply.join("\n");
    assert_eq!(header_count(&all), 12);
    assert_eq!(all.matches("📊 ").count(), 12);
}
