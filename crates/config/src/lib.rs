use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "tutorhub.toml",
    "config/tutorhub.toml",
    "crates/config/tutorhub.toml",
    "../tutorhub.toml",
    "../config/tutorhub.toml",
    "../crates/config/tutorhub.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub drafts: DraftsConfig,
}

/// REST endpoint settings.
///
/// ```
/// use tutorhub_config::ApiConfig;
///
/// let api = ApiConfig::default();
/// assert_eq!(api.base_url, "http://127.0.0.1:8000/api");
/// assert_eq!(api.request_timeout_seconds, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ApiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ApiConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:8000/api".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "RealtimeConfig::default_ws_base_url")]
    pub ws_base_url: String,
    /// Seconds between repeated liveness probes. `0` sends only the probe on open.
    #[serde(default)]
    pub ping_interval_seconds: u64,
}

impl RealtimeConfig {
    fn default_ws_base_url() -> String {
        "ws://127.0.0.1:8000/api".to_string()
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_seconds > 0).then(|| Duration::from_secs(self.ping_interval_seconds))
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_base_url: Self::default_ws_base_url(),
            ping_interval_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "ChatConfig::default_page_size")]
    pub page_size: u32,
}

impl ChatConfig {
    const fn default_page_size() -> u32 {
        20
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
        }
    }
}

/// Where the bearer token comes from. `access_token` wins over `token_file`.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("has_token", &self.access_token.is_some())
            .field("token_file", &self.token_file)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftsConfig {
    #[serde(default = "DraftsConfig::default_path")]
    pub path: String,
    #[serde(default = "DraftsConfig::default_debounce")]
    pub debounce_millis: u64,
}

impl DraftsConfig {
    fn default_path() -> String {
        "tutorhub-drafts.json".to_string()
    }

    const fn default_debounce() -> u64 {
        500
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            debounce_millis: Self::default_debounce(),
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the client configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use tutorhub_config::load;
///
/// std::env::remove_var("TUTORHUB_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.api.base_url.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("api.base_url", defaults.api.base_url.clone())?
        .set_default(
            "api.request_timeout_seconds",
            clamp_to_i64(defaults.api.request_timeout_seconds),
        )?
        .set_default("realtime.ws_base_url", defaults.realtime.ws_base_url.clone())?
        .set_default(
            "realtime.ping_interval_seconds",
            clamp_to_i64(defaults.realtime.ping_interval_seconds),
        )?
        .set_default("chat.page_size", i64::from(defaults.chat.page_size))?
        .set_default("drafts.path", defaults.drafts.path.clone())?
        .set_default(
            "drafts.debounce_millis",
            clamp_to_i64(defaults.drafts.debounce_millis),
        )?;

    let environment_overrides = config::Environment::with_prefix("TUTORHUB").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("TUTORHUB_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via TUTORHUB_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.chat.page_size == 0 {
        config.chat.page_size = ChatConfig::default_page_size();
    }

    debug!(?config, "loaded client configuration");
    Ok(config)
}
