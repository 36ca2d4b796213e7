use crate::warrant_browser::{
    behavioral::BehavioralEngine,
    fingerprint::UserAgentManager,
    stealth::{StealthProfile, StealthScripts},
};
use anyhow::Result;
use fantoccini::{error::CmdError, Client, Locator};
use std::time::Duration;
use tracing::debug;

/// Page wrapper used by the listing fetcher: navigation with stealth scripts,
/// bounded readiness waits, and DOM source access.
pub struct ListingPage {
    pub(crate) client: Client,
    pub(crate) stealth_profile: StealthProfile,
    pub(crate) user_agent_manager: UserAgentManager,
    pub(crate) behavioral_engine: BehavioralEngine,
}

impl ListingPage {
    /// Construct a page wrapper around an existing WebDriver client.
    pub fn new(
        client: Client,
        stealth_profile: StealthProfile,
        user_agent_manager: UserAgentManager,
        behavioral_engine: BehavioralEngine,
    ) -> Self {
        Self {
            client,
            stealth_profile,
            user_agent_manager,
            behavioral_engine,
        }
    }

    /// Navigate to `url` and apply stealth/fingerprint scripts.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.behavioral_engine.random_delay(100, 400).await;
        self.client.goto(url).await?;
        self.apply_stealth_and_fingerprint().await
    }

    async fn apply_stealth_and_fingerprint(&self) -> Result<()> {
        for script in StealthScripts::for_profile(self.stealth_profile) {
            self.client.execute(script, vec![]).await?;
        }
        if self.stealth_profile == StealthProfile::Maximum {
            self.client
                .execute(&self.user_agent_manager.platform_script(), vec![])
                .await?;
        }
        Ok(())
    }

    /// Wait up to `timeout` for an element matching `selector`.
    ///
    /// Returns `Ok(false)` when the wait ran out; other WebDriver failures are
    /// errors.
    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(_) => Ok(true),
            Err(CmdError::WaitTimeout) => {
                debug!(target: "warrant.driver", %selector, ?timeout, "element never appeared");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Return the full page HTML source.
    pub async fn content(&self) -> Result<String> {
        Ok(self.client.source().await?)
    }
}
