//! Bounded pool of browser session slots.
//!
//! A slot is a semaphore permit; each lease opens a fresh session on acquire
//! and closes it on release. Queries queue on the semaphore for at most the
//! configured wait, then give up with [`FetchError::PoolExhausted`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};
use url::Url;

use crate::browser::{ListingSession, LoadError, LoadTimeouts, PageLoad, SessionFactory};
use crate::fetch::FetchError;

pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    slots: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

impl SessionPool {
    /// `size` is clamped to at least one slot.
    pub fn new(factory: Arc<dyn SessionFactory>, size: usize, acquire_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            factory,
            slots: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently leased.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot, then open a session in it.
    pub async fn acquire(&self) -> Result<SessionLease, FetchError> {
        let permit = match tokio::time::timeout(
            self.acquire_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(FetchError::PoolExhausted),
            Err(_elapsed) => {
                warn!(
                    target: "warrant.fetch",
                    wait = ?self.acquire_timeout,
                    size = self.size,
                    "no browser session slot became free"
                );
                return Err(FetchError::PoolExhausted);
            }
        };

        // The permit drops with this frame if the session fails to start.
        let session = self.factory.open().await.map_err(|e| FetchError::Failed {
            page: 1,
            reason: format!("could not start browser session: {e:#}"),
        })?;
        debug!(target: "warrant.fetch", available = self.available(), "session slot leased");

        Ok(SessionLease {
            session: Some(session),
            permit: Some(permit),
        })
    }
}

/// A leased slot holding one open session.
///
/// The slot stays taken until the session is closed, whether through
/// [`SessionLease::release`] or a drop. A dropped lease closes on a
/// background task that holds the permit until `close` returns.
pub struct SessionLease {
    session: Option<Box<dyn ListingSession>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl SessionLease {
    pub async fn load(
        &mut self,
        url: &Url,
        container: &str,
        timeouts: LoadTimeouts,
    ) -> Result<PageLoad, LoadError> {
        match self.session.as_mut() {
            Some(session) => session.load(url, container, timeouts).await,
            None => Err(LoadError::Driver(anyhow::anyhow!("session already released"))),
        }
    }

    /// Close the session, then give the slot back.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(target: "warrant.fetch", error = %e, "closing browser session failed");
            }
        }
        drop(self.permit.take());
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let permit = self.permit.take();
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(
                    target: "warrant.fetch",
                    "lease dropped mid-query; closing session in background"
                );
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(
                            target: "warrant.fetch",
                            error = %e,
                            "closing abandoned browser session failed"
                        );
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                warn!(
                    target: "warrant.fetch",
                    "no async runtime to close abandoned browser session"
                );
                drop(permit);
            }
        }
    }
}
