use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use warrant_config::AppConfig;
use warrant_drivers::warrant_browser::driver::DriverOptions;
use warrant_query::QueryOrchestrator;
use warrant_web::browser::FantocciniSessions;
use warrant_web::{PageFetcher, SessionPool};

/// Browser sessions, pool, fetcher and orchestrator, built from config.
pub fn build_orchestrator(cfg: &AppConfig) -> Result<QueryOrchestrator> {
    let options = DriverOptions {
        webdriver_url: cfg.browser.webdriver_url.clone(),
        headless: cfg.browser.headless,
        stealth_profile: cfg.browser.stealth.into(),
    };
    info!(
        webdriver = %options.webdriver_url,
        headless = options.headless,
        pool_size = cfg.pool.size,
        "browser sessions configured"
    );

    let sessions = Arc::new(FantocciniSessions::new(options));
    let pool = Arc::new(SessionPool::new(
        sessions,
        cfg.pool.size,
        Duration::from_millis(cfg.pool.acquire_timeout_ms),
    ));
    let fetcher = PageFetcher::new(pool, &cfg.query)?;

    Ok(QueryOrchestrator::new(
        cfg.query.clone(),
        fetcher,
        cfg.bot.unrecognized,
    ))
}
