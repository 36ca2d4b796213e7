use crate::warrant_browser::{
    behavioral::BehavioralEngine,
    fingerprint::UserAgentManager,
    page::ListingPage,
    stealth::{build_stealth_arguments, StealthProfile},
};
use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;
use webdriver::capabilities::Capabilities;

/// Where and how to start a browser session.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// WebDriver endpoint, e.g. `http://localhost:9515` for Chromedriver.
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth_profile: StealthProfile,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            stealth_profile: StealthProfile::Balanced,
        }
    }
}

/// Thin wrapper around a `fantoccini` WebDriver client with stealth and
/// behavioral helpers.
pub struct WarrantDriver {
    pub client: Client,
    pub behavioral_engine: BehavioralEngine,
    pub user_agent_manager: UserAgentManager,
    pub stealth_profile: StealthProfile,
}

impl WarrantDriver {
    /// Open a new browser session on the configured WebDriver endpoint.
    pub async fn connect(options: &DriverOptions) -> Result<Self> {
        let user_agent_manager = UserAgentManager::new();
        let args = build_stealth_arguments(
            options.stealth_profile,
            user_agent_manager.session_profile(),
            options.headless,
        );

        let mut chrome_opts = HashMap::new();
        chrome_opts.insert("args".to_string(), json!(args));
        let mut caps = Capabilities::new();
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .with_context(|| format!("connecting to WebDriver at {}", options.webdriver_url))?;

        debug!(
            target: "warrant.driver",
            endpoint = %options.webdriver_url,
            headless = options.headless,
            "browser session opened"
        );

        Ok(Self {
            client,
            behavioral_engine: BehavioralEngine::new(),
            user_agent_manager,
            stealth_profile: options.stealth_profile,
        })
    }

    /// Page handle bound to this session's single window.
    pub fn page(&self) -> ListingPage {
        ListingPage::new(
            self.client.clone(),
            self.stealth_profile,
            self.user_agent_manager.clone(),
            self.behavioral_engine.clone(),
        )
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        debug!(target: "warrant.driver", "browser session closed");
        Ok(())
    }
}
