mod feed;

pub use feed::{FeedConfig, StrategyKind};

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{FeedReactError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of successful reactions after which a crawl stops
    #[serde(default)]
    pub target_count: Option<u32>,

    /// Login credentials
    #[serde(default)]
    pub account: AccountConfig,

    /// Browser configuration
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Login form
    #[serde(default)]
    pub login: LoginConfig,

    /// Timeline crawl target
    #[serde(default = "FeedConfig::timeline")]
    pub timeline: FeedConfig,

    /// Activity listing crawl target
    #[serde(default = "FeedConfig::activities")]
    pub activities: FeedConfig,

    /// Reaction delivery on item pages
    #[serde(default)]
    pub reaction: ReactionConfig,

    /// Deadlines and loop policy
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Remote debugging port
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// User data directory; keeps cookies between runs
    pub user_data_dir: Option<String>,

    /// Extra browser arguments
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Name under which the running browser is remembered
    #[serde(default = "default_session_name")]
    pub session_name: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            cdp_port: default_cdp_port(),
            user_data_dir: None,
            extra_args: vec![
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            session_name: default_session_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub url: String,
    pub email_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// Shown once the site considers the session signed in
    pub signed_in_selector: String,
    /// Wait after submitting before checking the result
    pub settle_ms: u64,
    pub timeout_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url: "https://yamap.com/login".to_string(),
            email_selector: r#"input[name="email"]"#.to_string(),
            password_selector: r#"input[name="password"]"#.to_string(),
            submit_selector: r#"button[type="submit"]"#.to_string(),
            signed_in_selector: r#"footer[data-global-footer="true"]"#.to_string(),
            settle_ms: 5_000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionConfig {
    /// Item detail page, `{id}` is replaced with the post id
    pub item_url_template: String,
    /// Button that opens the reaction panel
    pub affordance_selector: String,
    pub panel_selector: String,
    /// The approve choice, matched by attribute so panel order does not matter
    pub choice_selector: String,
    /// Present when the viewer already reacted; empty disables the pre-check
    #[serde(default)]
    pub own_reaction_marker: String,
    pub max_attempts: u32,
    pub panel_settle_ms: u64,
    pub reaction_settle_ms: u64,
    pub recovery_settle_ms: u64,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            item_url_template: "https://yamap.com/activities/{id}".to_string(),
            affordance_selector: ".emoji-add-button".to_string(),
            panel_selector: ".emojiPickerBody".to_string(),
            choice_selector: r#".emojiPickerBody .emoji-button[data-emoji-name="thumbsup"]"#
                .to_string(),
            own_reaction_marker: ".emoji-reaction--viewer-reacted".to_string(),
            max_attempts: 3,
            panel_settle_ms: 2_000,
            reaction_settle_ms: 3_000,
            recovery_settle_ms: 2_000,
        }
    }
}

/// When the feed page is re-checked relative to each dispatched reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardTiming {
    BeforeEachDispatch,
    #[default]
    AfterEachDispatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Wall-clock budget for one crawl
    pub deadline_mins: u64,
    /// Budget for a single item's reaction
    pub item_timeout_secs: u64,
    /// Default wait for elements to become visible
    pub element_timeout_secs: u64,
    /// Pause between two reactions
    pub dispatch_pause_ms: u64,
    #[serde(default)]
    pub guard_timing: GuardTiming,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_mins: 55,
            item_timeout_secs: 300,
            element_timeout_secs: 20,
            dispatch_pause_ms: 2_000,
            guard_timing: GuardTiming::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Where diagnostic artifacts are written
    pub dir: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cdp_port() -> u16 {
    9222
}

fn default_session_name() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_count: None,
            account: AccountConfig::default(),
            browser: BrowserConfig::default(),
            login: LoginConfig::default(),
            timeline: FeedConfig::timeline(),
            activities: FeedConfig::activities(),
            reaction: ReactionConfig::default(),
            run: RunConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from all sources (defaults, file, env)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| FeedReactError::ConfigError(e.to_string()))
    }

    fn figment(path: &Path) -> Figment {
        let figment = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Merge config file if exists
            .merge(Toml::file(path))
            // Merge environment variables (FEEDREACT_*), `__` separates sections
            .merge(
                Env::prefixed("FEEDREACT_")
                    .split("__")
                    .filter(|key| !key.as_str().to_ascii_lowercase().starts_with("account")),
            )
            // Variable names the crawler has always read
            .merge(
                Env::raw()
                    .only(&["POST_COUNT_TO_PROCESS"])
                    .map(|_| "target_count".into()),
            );

        Self::merge_account_env(figment)
    }

    /// Credentials are opaque strings. Env providers would parse `0123456`
    /// or `[secret]` as values, so these variables bypass them.
    fn merge_account_env(mut figment: Figment) -> Figment {
        const ACCOUNT_VARS: [(&str, &str); 4] = [
            ("FEEDREACT_ACCOUNT__EMAIL", "account.email"),
            ("FEEDREACT_ACCOUNT__PASSWORD", "account.password"),
            ("YAMAP_EMAIL", "account.email"),
            ("YAMAP_PASSWORD", "account.password"),
        ];

        for (var, key) in ACCOUNT_VARS {
            if let Ok(value) = std::env::var(var) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }
        figment
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedreact")
            .join("config.toml")
    }

    /// Reaction target for a crawl; must be a positive integer
    pub fn target_count(&self) -> Result<u32> {
        match self.target_count {
            Some(0) => Err(FeedReactError::ConfigError(
                "target_count must be a positive integer".to_string(),
            )),
            Some(n) => Ok(n),
            None => Err(FeedReactError::ConfigError(
                "target_count is not set (POST_COUNT_TO_PROCESS or FEEDREACT_TARGET_COUNT)"
                    .to_string(),
            )),
        }
    }

    /// Login credentials; both must be non-empty
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let email = self.account.email.as_deref().map(str::trim).unwrap_or("");
        let password = self.account.password.as_deref().unwrap_or("");

        if email.is_empty() || password.is_empty() {
            return Err(FeedReactError::ConfigError(
                "account.email and account.password are required (YAMAP_EMAIL, YAMAP_PASSWORD)"
                    .to_string(),
            ));
        }

        Ok((email, password))
    }
}
