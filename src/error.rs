use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedReactError {
    #[error("Browser not found. Please install Chrome, Chromium, Brave, or Edge.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("Browser not running. Start a crawl with 'feedreact react' first.")]
    BrowserNotRunning,

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptError(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// The feed state was absent or empty. Retry after scrolling.
    #[error("No feed data on page: {0}")]
    NoFeedData(String),

    /// The feed state was present but could not be decoded.
    #[error("Feed decode failed: {reason}")]
    DecodeFailed { reason: String, payload: String },

    #[error("Item page failed to load: {0}")]
    PageLoadFailed(String),

    #[error("Page recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("Reaction failed after {attempts} attempts: {source}")]
    ReactionFailed {
        attempts: u32,
        #[source]
        source: Box<FeedReactError>,
    },

    #[error("Lost the feed page: {0}")]
    SessionLost(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FeedReactError>;
