//! Loader for `warrant.yaml` with environment overlays.
//!
//! Sources are merged in the order they are added, then `WARRANT_`-prefixed
//! environment variables win (`WARRANT_QUERY__QUICK_MODE_MAX_PAGES=5`).
//! String values may reference `${VAR}`; references are expanded recursively
//! up to a fixed depth.
//!
//! Only `bot.unrecognized` is mandatory; everything else has defaults.
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use warrant_common::observability::LogFormat;
use warrant_common::{QueryConfig, StealthLevel, UnrecognizedPolicy};

const MAX_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WebDriver endpoint and browser flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            stealth: StealthLevel::Balanced,
        }
    }
}

/// Bounds on concurrent browser sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub size: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 1,
            acquire_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub unrecognized: UnrecognizedPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub dir: Option<PathBuf>,
    pub stderr: bool,
}

/// Expand `${VAR}` references in every string of the merged tree.
fn expand_env(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('$') => *s = expand_str(s),
        Value::Array(items) => items.iter_mut().for_each(expand_env),
        Value::Object(map) => map.values_mut().for_each(expand_env),
        _ => {}
    }
}

/// Values that expand to further references are expanded again, up to
/// [`MAX_EXPANSION_DEPTH`] rounds. Unknown variables leave the string as is.
fn expand_str(raw: &str) -> String {
    let mut current = raw.to_string();
    for _ in 0..MAX_EXPANSION_DEPTH {
        let next = match shellexpand::env(&current) {
            Ok(expanded) => expanded.into_owned(),
            Err(_) => break,
        };
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn validate(cfg: &AppConfig) -> Result<(), ConfigError> {
    cfg.query
        .validate()
        .map_err(|e| ConfigError::Message(e.to_string()))?;
    if cfg.pool.size == 0 {
        return Err(ConfigError::Message("pool.size must be at least 1".into()));
    }
    if cfg.query.query_wall_clock_budget_ms <= cfg.pool.acquire_timeout_ms {
        return Err(ConfigError::Message(format!(
            "query.query_wall_clock_budget_ms ({}) must exceed pool.acquire_timeout_ms ({})",
            cfg.query.query_wall_clock_budget_ms, cfg.pool.acquire_timeout_ms
        )));
    }
    if cfg.browser.webdriver_url.trim().is_empty() {
        return Err(ConfigError::Message(
            "browser.webdriver_url must not be empty".into(),
        ));
    }
    Ok(())
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct WarrantConfigLoader {
    files: Vec<(PathBuf, bool)>,
    inline: Vec<String>,
}

impl Default for WarrantConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl WarrantConfigLoader {
    /// Start with no files; `WARRANT_` env overrides are always applied last.
    ///
    /// ```
    /// use warrant_config::WarrantConfigLoader;
    /// use warrant_common::UnrecognizedPolicy;
    ///
    /// let config = WarrantConfigLoader::new()
    ///     .with_yaml_str("bot:\n  unrecognized: ignore")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.bot.unrecognized, UnrecognizedPolicy::Ignore);
    /// assert_eq!(config.query.quick_mode_max_pages, 3);
    /// assert_eq!(config.pool.size, 1);
    /// ```
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            inline: Vec::new(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; format is inferred by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push((path.as_ref().to_path_buf(), true));
        self
    }

    /// Attach a file that may be absent, so deployments can run purely on env.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push((path.as_ref().to_path_buf(), false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use warrant_config::WarrantConfigLoader;
    /// use warrant_common::BrokerMatch;
    ///
    /// let cfg = WarrantConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// query:
    ///   quick_mode_broker_filter: "凱基"
    ///   broker_match: exact
    /// bot:
    ///   unrecognized: fallback
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.query.quick_mode_broker_filter, "凱基");
    /// assert_eq!(cfg.query.broker_match, BrokerMatch::Exact);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.inline.push(yaml.to_string());
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders and validate.
    pub fn load(self) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        for (path, required) in &self.files {
            builder = builder.add_source(File::from(path.as_path()).required(*required));
        }
        for yaml in &self.inline {
            builder = builder.add_source(File::from_str(yaml, FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix("WARRANT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut v: Value = builder.build()?.try_deserialize()?;
        expand_env(&mut v);

        let typed: AppConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;
        Ok(typed)
    }
}
