use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;
use warrant_common::observability::LogFormat;
use warrant_common::{BrokerMatch, StealthLevel, UnrecognizedPolicy};
use warrant_config::WarrantConfigLoader;

fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
query:
  quick_mode_broker_filter: "元大"
  quick_mode_max_pages: 3
  listing_base_url: "https://${WARRANT_IT_HOST}/stock/warrant.aspx"
  max_records_per_result: 15
  broker_match: contains
  brokers: ["元大", "凱基"]
browser:
  webdriver_url: "http://chromedriver:9515"
  headless: true
  stealth: maximum
pool:
  size: 2
  acquire_timeout_ms: 1500
bot:
  unrecognized: fallback
logging:
  format: json
  stderr: true
"#;

#[test]
#[serial]
fn loads_file_with_env_expansion() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "warrant.yaml", FILE_YAML);

    let cfg = temp_env::with_var("WARRANT_IT_HOST", Some("histock.tw"), || {
        WarrantConfigLoader::new().with_file(&p).load()
    })
    .expect("load config");

    assert_eq!(
        cfg.query.listing_base_url,
        "https://histock.tw/stock/warrant.aspx"
    );
    assert_eq!(cfg.query.max_records_per_result, 15);
    assert_eq!(cfg.query.broker_match, BrokerMatch::Contains);
    assert_eq!(cfg.query.brokers, vec!["元大", "凱基"]);
    assert_eq!(cfg.query.page_load_timeout_ms, 10_000);
    assert_eq!(cfg.browser.webdriver_url, "http://chromedriver:9515");
    assert_eq!(cfg.browser.stealth, StealthLevel::Maximum);
    assert_eq!(cfg.pool.size, 2);
    assert_eq!(cfg.pool.acquire_timeout_ms, 1500);
    assert_eq!(cfg.bot.unrecognized, UnrecognizedPolicy::Fallback);
    assert_eq!(cfg.logging.format, LogFormat::Json);
    assert!(cfg.logging.stderr);
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "warrant.yaml", FILE_YAML);

    let cfg = temp_env::with_vars(
        [
            ("WARRANT_IT_HOST", Some("histock.tw")),
            ("WARRANT_QUERY__QUICK_MODE_MAX_PAGES", Some("5")),
            ("WARRANT_BOT__UNRECOGNIZED", Some("ignore")),
        ],
        || WarrantConfigLoader::new().with_file(&p).load(),
    )
    .expect("load config");

    assert_eq!(cfg.query.quick_mode_max_pages, 5);
    assert_eq!(cfg.bot.unrecognized, UnrecognizedPolicy::Ignore);
}

#[test]
#[serial]
fn missing_optional_file_falls_back_to_inline_and_defaults() {
    let tmp = TempDir::new().unwrap();
    let cfg = WarrantConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .with_yaml_str("bot:\n  unrecognized: ignore")
        .load()
        .expect("load config");

    assert_eq!(cfg.query.quick_mode_broker_filter, "元大");
    assert_eq!(cfg.browser.webdriver_url, "http://localhost:9515");
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let result = WarrantConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load();
    assert!(result.is_err());
}

#[test]
#[serial]
fn budget_must_outlast_pool_wait() {
    let result = WarrantConfigLoader::new()
        .with_yaml_str(
            "query:\n  query_wall_clock_budget_ms: 2000\n\
             pool:\n  acquire_timeout_ms: 2000\n\
             bot:\n  unrecognized: ignore",
        )
        .load();
    let err = result.expect_err("budget equal to pool wait");
    assert!(err.to_string().contains("acquire_timeout_ms"));
}
