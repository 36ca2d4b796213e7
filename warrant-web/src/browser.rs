use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;
use warrant_drivers::warrant_browser::driver::{DriverOptions, WarrantDriver};

/// Outcome of loading one listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLoad {
    /// The listing container appeared; carries the page source.
    Ready(String),
    /// The container never appeared within the readiness wait.
    ContainerMissing,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("browser error: {0}")]
    Driver(#[from] anyhow::Error),
}

/// Bounded waits applied to a single page load.
#[derive(Debug, Clone, Copy)]
pub struct LoadTimeouts {
    pub navigation: Duration,
    pub container: Duration,
}

/// One open browsing session, reused across the pages of a query.
#[async_trait]
pub trait ListingSession: Send {
    async fn load(
        &mut self,
        url: &Url,
        container: &str,
        timeouts: LoadTimeouts,
    ) -> std::result::Result<PageLoad, LoadError>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts fresh browsing sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn ListingSession>>;
}

/// Concrete factory backed by the fantoccini-based driver.
pub struct FantocciniSessions {
    options: DriverOptions,
}

impl FantocciniSessions {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for FantocciniSessions {
    async fn open(&self) -> Result<Box<dyn ListingSession>> {
        let driver = WarrantDriver::connect(&self.options).await?;
        Ok(Box::new(FantocciniSession { driver }))
    }
}

struct FantocciniSession {
    driver: WarrantDriver,
}

#[async_trait]
impl ListingSession for FantocciniSession {
    async fn load(
        &mut self,
        url: &Url,
        container: &str,
        timeouts: LoadTimeouts,
    ) -> std::result::Result<PageLoad, LoadError> {
        let page = self.driver.page();
        tokio::time::timeout(timeouts.navigation, page.goto(url.as_str()))
            .await
            .map_err(|_| LoadError::NavigationTimeout(timeouts.navigation))??;

        if !page.wait_for(container, timeouts.container).await? {
            return Ok(PageLoad::ContainerMissing);
        }
        let html = page.content().await?;
        debug!(target: "warrant.fetch", %url, bytes = html.len(), "page source captured");
        Ok(PageLoad::Ready(html))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.driver.close().await
    }
}
