//! Scripted browser sessions and listing HTML builders for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! downstream crates' tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use url::Url;
use warrant_common::RowFragment;

use crate::browser::{ListingSession, LoadError, LoadTimeouts, PageLoad, SessionFactory};

/// One scripted response to a page load.
#[derive(Debug, Clone)]
pub enum ScriptedPage {
    Html(String),
    /// Listing container never appears.
    Missing,
    /// Navigation times out.
    Timeout,
    /// Page becomes ready only after the delay.
    Slow(Duration, String),
}

/// Counters shared by every session a [`ScriptedSessions`] opens.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub loads: AtomicUsize,
    pub requested_pages: Mutex<Vec<u32>>,
}

impl SessionStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested_pages
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

/// Session factory serving canned pages keyed by the `p` URL parameter.
///
/// Each page holds a list of responses consumed one per attempt; the last one
/// repeats. Unscripted pages behave as [`ScriptedPage::Missing`].
#[derive(Clone, Default)]
pub struct ScriptedSessions {
    pages: Arc<HashMap<u32, Vec<ScriptedPage>>>,
    attempts: Arc<Mutex<HashMap<u32, usize>>>,
    fail_open: bool,
    close_delay: Duration,
    pub stats: Arc<SessionStats>,
}

impl ScriptedSessions {
    pub fn new(pages: impl IntoIterator<Item = (u32, Vec<ScriptedPage>)>) -> Self {
        Self {
            pages: Arc::new(pages.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Every page answers with a single response.
    pub fn single(pages: impl IntoIterator<Item = (u32, ScriptedPage)>) -> Self {
        Self::new(pages.into_iter().map(|(p, page)| (p, vec![page])))
    }

    /// Factory whose sessions never start.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Sessions take `delay` to close, like a browser shutting down.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    fn next_response(&self, page: u32) -> ScriptedPage {
        let Some(script) = self.pages.get(&page) else {
            return ScriptedPage::Missing;
        };
        let mut attempts = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let n = attempts.entry(page).or_insert(0);
        let response = script
            .get(*n)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(ScriptedPage::Missing);
        *n += 1;
        response
    }
}

#[async_trait]
impl SessionFactory for ScriptedSessions {
    async fn open(&self) -> Result<Box<dyn ListingSession>> {
        if self.fail_open {
            return Err(anyhow!("webdriver endpoint refused the session"));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.clone(),
        }))
    }
}

struct ScriptedSession {
    script: ScriptedSessions,
}

fn page_of(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(k, _)| k == "p")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

#[async_trait]
impl ListingSession for ScriptedSession {
    async fn load(
        &mut self,
        url: &Url,
        _container: &str,
        timeouts: LoadTimeouts,
    ) -> std::result::Result<PageLoad, LoadError> {
        let page = page_of(url);
        let stats = &self.script.stats;
        stats.loads.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut pages) = stats.requested_pages.lock() {
            pages.push(page);
        }
        match self.script.next_response(page) {
            ScriptedPage::Html(html) => Ok(PageLoad::Ready(html)),
            ScriptedPage::Missing => Ok(PageLoad::ContainerMissing),
            ScriptedPage::Timeout => Err(LoadError::NavigationTimeout(timeouts.navigation)),
            ScriptedPage::Slow(delay, html) => {
                tokio::time::sleep(delay).await;
                Ok(PageLoad::Ready(html))
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if !self.script.close_delay.is_zero() {
            tokio::time::sleep(self.script.close_delay).await;
        }
        self.script.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A five-cell listing row.
pub fn row(name: &str, code: &str, price: &str, moneyness: &str, days: &str) -> RowFragment {
    RowFragment::new(
        [name, code, price, moneyness, days]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

/// Listing page shaped like the real one: a header row, data rows, and an
/// optional pagination bar linking pages `1..=last_page`.
pub fn listing_html(rows: &[RowFragment], last_page: Option<u32>) -> String {
    let mut html = String::from(
        "<html><body><table id=\"GCWT1\"><tr><th>權證名稱</th><th>代號</th>\
         <th>價格</th><th>價內外</th><th>剩餘天數</th></tr>",
    );
    for r in rows {
        html.push_str("<tr>");
        for c in &r.cells {
            html.push_str(&format!("<td>{c}</td>"));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    if let Some(last) = last_page {
        html.push_str("<div class=\"pager\">");
        for p in 1..=last {
            html.push_str(&format!(
                "<a href=\"warrant.aspx?no=6669&amp;r=15&amp;p={p}&amp;d=1\">{p}</a>"
            ));
        }
        html.push_str("</div>");
    }
    html.push_str("</body></html>");
    html
}

/// Listing page with just the header row.
pub fn empty_listing_html() -> String {
    listing_html(&[], None)
}
