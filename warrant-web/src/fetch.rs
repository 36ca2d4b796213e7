use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tracing::{debug, info, warn};
use url::Url;
use warrant_common::{PageBatch, QueryConfig, WarrantError};
use warrant_drivers::warrant_browser::behavioral::BehavioralEngine;

use crate::browser::{LoadError, LoadTimeouts, PageLoad};
use crate::extract::{LISTING_CONTAINER, pagination_last_page, parse_rows};
use crate::pool::{SessionLease, SessionPool};

/// Rows per listing page requested from the site.
const ROWS_PER_PAGE: &str = "15";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no browser session slot available")]
    PoolExhausted,

    #[error("page {page} failed: {reason}")]
    Failed { page: u32, reason: String },
}

impl From<FetchError> for WarrantError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::PoolExhausted => WarrantError::PoolExhausted,
            FetchError::Failed { page, reason } => WarrantError::FetchFailed { page, reason },
        }
    }
}

/// Waits and delays applied while walking a listing.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub navigation_timeout: Duration,
    pub container_timeout: Duration,
    pub retry_backoff: Duration,
    pub page_pacing: Duration,
}

impl FetchPolicy {
    pub fn from_config(cfg: &QueryConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_millis(cfg.navigation_timeout_ms),
            container_timeout: Duration::from_millis(cfg.page_load_timeout_ms),
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
            page_pacing: Duration::from_millis(cfg.page_pacing_ms),
        }
    }

    fn timeouts(&self) -> LoadTimeouts {
        LoadTimeouts {
            navigation: self.navigation_timeout,
            container: self.container_timeout,
        }
    }
}

/// Walks a multi-page listing with one pooled browser session.
pub struct PageFetcher {
    pool: Arc<SessionPool>,
    base_url: Url,
    policy: FetchPolicy,
    behavior: BehavioralEngine,
}

impl PageFetcher {
    pub fn new(pool: Arc<SessionPool>, cfg: &QueryConfig) -> Result<Self, WarrantError> {
        let base_url = Url::parse(&cfg.listing_base_url).map_err(|e| {
            WarrantError::Config(format!(
                "invalid listing_base_url {:?}: {e}",
                cfg.listing_base_url
            ))
        })?;
        Ok(Self {
            pool,
            base_url,
            policy: FetchPolicy::from_config(cfg),
            behavior: BehavioralEngine::new(),
        })
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Listing URL for one page of `code`.
    pub fn listing_url(&self, code: &str, page: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("no", code)
            .append_pair("r", ROWS_PER_PAGE)
            .append_pair("p", &page.to_string())
            .append_pair("d", "1");
        url
    }

    /// Lazily fetch pages `1..=max_pages` of the listing for `code`.
    ///
    /// The stream leases a session on first poll and ends when the cap is
    /// reached, a page has no rows, the pagination says it was the last page,
    /// or a load fails. A failure is yielded as the final item. A first page
    /// that never shows the listing, or shows it empty, is a failure; a later
    /// one just ends the stream. The session is closed on every path; if the
    /// stream is dropped early the lease closes it in the background.
    pub fn fetch_pages<'a>(
        &'a self,
        code: &str,
        max_pages: u32,
    ) -> impl Stream<Item = Result<PageBatch, FetchError>> + Send + 'a {
        let code = code.to_string();
        stream! {
            let mut lease = match self.pool.acquire().await {
                Ok(lease) => lease,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut failure = None;
            let mut page = 1u32;
            while page <= max_pages {
                let url = self.listing_url(&code, page);
                debug!(target: "warrant.fetch", %url, page, "loading listing page");

                match self.load_with_retry(&mut lease, &url, page).await {
                    Ok(PageLoad::Ready(html)) => {
                        let rows = parse_rows(&html);
                        let last_page = pagination_last_page(&html);
                        if rows.is_empty() {
                            if page == 1 {
                                failure = Some(FetchError::Failed {
                                    page,
                                    reason: format!("no warrant listing for {code}"),
                                });
                            } else {
                                info!(
                                    target: "warrant.fetch",
                                    page,
                                    "page has no rows; end of listing"
                                );
                            }
                            break;
                        }
                        let reached_last = last_page.is_some_and(|last| page >= last);
                        info!(
                            target: "warrant.fetch",
                            page,
                            rows = rows.len(),
                            last_page = ?last_page,
                            "page fetched"
                        );
                        yield Ok(PageBatch { page, rows, last_page });
                        if reached_last {
                            break;
                        }
                    }
                    Ok(PageLoad::ContainerMissing) => {
                        if page == 1 {
                            failure = Some(FetchError::Failed {
                                page,
                                reason: "listing container never appeared".to_string(),
                            });
                        } else {
                            info!(
                                target: "warrant.fetch",
                                page,
                                "listing container absent; end of listing"
                            );
                        }
                        break;
                    }
                    Err(e) => {
                        warn!(target: "warrant.fetch", page, error = %e, "page failed after retry");
                        failure = Some(FetchError::Failed {
                            page,
                            reason: e.to_string(),
                        });
                        break;
                    }
                }

                page += 1;
                if page <= max_pages && !self.policy.page_pacing.is_zero() {
                    let pacing = self.policy.page_pacing.as_millis() as u64;
                    self.behavior.random_delay(pacing, pacing + pacing / 4).await;
                }
            }

            lease.release().await;
            if let Some(e) = failure {
                yield Err(e);
            }
        }
    }

    /// One load, retried once after a jittered backoff if it errors.
    async fn load_with_retry(
        &self,
        lease: &mut SessionLease,
        url: &Url,
        page: u32,
    ) -> Result<PageLoad, LoadError> {
        let timeouts = self.policy.timeouts();
        match lease.load(url, LISTING_CONTAINER, timeouts).await {
            Ok(load) => Ok(load),
            Err(first) => {
                let delay = self.behavior.backoff(self.policy.retry_backoff);
                warn!(
                    target: "warrant.fetch",
                    page,
                    error = %first,
                    ?delay,
                    "page load failed; retrying once"
                );
                tokio::time::sleep(delay).await;
                lease.load(url, LISTING_CONTAINER, timeouts).await
            }
        }
    }
}
