use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Snapshot of user agent, viewport, and locale characteristics.
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone)]
/// Holds plausible desktop profiles and pins one per browser session.
pub struct UserAgentManager {
    session_profile: UserAgentProfile,
}

fn desktop_profiles() -> Vec<UserAgentProfile> {
    let languages = vec!["zh-TW".to_string(), "zh".to_string(), "en-US".to_string()];
    vec![
        UserAgentProfile {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            viewport: (1920, 1080),
            platform: "Win32".to_string(),
            languages: languages.clone(),
        },
        UserAgentProfile {
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            viewport: (1440, 900),
            platform: "MacIntel".to_string(),
            languages,
        },
    ]
}

impl Default for UserAgentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentManager {
    /// Pick a session profile from the built-in desktop set.
    pub fn new() -> Self {
        let mut profiles = desktop_profiles();
        profiles.shuffle(&mut rand::thread_rng());
        // desktop_profiles() is never empty
        let session_profile = profiles.swap_remove(0);
        Self { session_profile }
    }

    pub fn session_profile(&self) -> &UserAgentProfile {
        &self.session_profile
    }

    /// Script pinning `navigator.platform` to the session profile.
    pub fn platform_script(&self) -> String {
        format!(
            "Object.defineProperty(navigator, 'platform', {{ get: () => '{}' }});",
            self.session_profile.platform
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_profile_is_zh_tw_desktop() {
        let manager = UserAgentManager::new();
        let profile = manager.session_profile();
        assert_eq!(profile.languages.first().map(String::as_str), Some("zh-TW"));
        assert!(manager.platform_script().contains(&profile.platform));
    }
}
