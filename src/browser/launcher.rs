use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;

use super::discovery::{discover_browser, BrowserInfo, BrowserType};
use crate::config::BrowserConfig;
use crate::error::{FeedReactError, Result};

/// Browser launcher that starts a browser with CDP enabled
pub struct BrowserLauncher {
    browser_info: BrowserInfo,
    cdp_port: u16,
    headless: bool,
    user_data_dir: PathBuf,
    extra_args: Vec<String>,
}

impl BrowserLauncher {
    /// Create a launcher for the given browser with default settings
    fn with_browser(browser_info: BrowserInfo, session_name: &str) -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feedreact")
            .join("profiles")
            .join(session_name);

        Self {
            browser_info,
            cdp_port: 9222,
            headless: true,
            user_data_dir: data_dir,
            extra_args: Vec::new(),
        }
    }

    /// Create a launcher with a specific browser path
    pub fn with_browser_path(path: PathBuf, session_name: &str) -> Result<Self> {
        if !path.exists() {
            return Err(FeedReactError::BrowserLaunchFailed(format!(
                "Browser not found at: {:?}",
                path
            )));
        }

        // Assume Chrome-compatible
        let browser_info = BrowserInfo::new(BrowserType::Chrome, path);
        Ok(Self::with_browser(browser_info, session_name))
    }

    /// Create a launcher from browser configuration
    pub fn from_config(session_name: &str, config: &BrowserConfig) -> Result<Self> {
        let mut launcher = match config.executable {
            Some(ref path) => {
                let path = PathBuf::from(shellexpand::tilde(path).to_string());
                Self::with_browser_path(path, session_name)?
            }
            None => Self::with_browser(discover_browser()?, session_name),
        };

        launcher.cdp_port = config.cdp_port;
        launcher.headless = config.headless;
        launcher.extra_args = config.extra_args.clone();

        if let Some(ref dir) = config.user_data_dir {
            launcher.user_data_dir = PathBuf::from(shellexpand::tilde(dir).to_string());
        }

        Ok(launcher)
    }

    /// Build the browser launch arguments
    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.cdp_port),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--window-size=1920,1080".to_string(),
            "--disable-extensions".to_string(),
            "--disable-save-password-bubble".to_string(),
            "--disable-translate".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args.extend(self.extra_args.clone());

        args
    }

    /// Launch the browser and return the process handle
    pub fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();

        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            self.browser_info.path,
            args
        );

        let child = Command::new(&self.browser_info.path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                FeedReactError::BrowserLaunchFailed(format!(
                    "Failed to launch {}: {}",
                    self.browser_info.browser_type.name(),
                    e
                ))
            })?;

        Ok(child)
    }

    /// Launch the browser and wait for CDP to be ready
    pub async fn launch_and_wait(&self) -> Result<(Child, String)> {
        let child = self.launch()?;
        let cdp_url = self.wait_for_cdp().await?;

        Ok((child, cdp_url))
    }

    /// Wait for CDP endpoint to be ready
    async fn wait_for_cdp(&self) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/version", self.cdp_port);

        // Build client with NO_PROXY for localhost
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        // Try for up to 10 seconds
        for i in 0..20 {
            sleep(Duration::from_millis(500)).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        FeedReactError::CdpConnectionFailed(format!(
                            "Failed to parse CDP response: {}",
                            e
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::info!("CDP ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("CDP not ready yet (attempt {})", i + 1);
                }
                Err(e) => {
                    tracing::debug!("CDP connection attempt {} failed: {}", i + 1, e);
                }
            }
        }

        Err(FeedReactError::CdpConnectionFailed(
            "Timeout waiting for CDP to be ready".to_string(),
        ))
    }

    /// Get CDP port
    pub fn get_cdp_port(&self) -> u16 {
        self.cdp_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher(headless: bool) -> BrowserLauncher {
        let mut launcher = BrowserLauncher::with_browser(
            BrowserInfo::new(BrowserType::Chromium, PathBuf::from("/usr/bin/chromium")),
            "crawl",
        );
        launcher.cdp_port = 9333;
        launcher.headless = headless;
        launcher.user_data_dir = PathBuf::from("/tmp/feedreact-profile");
        launcher.extra_args = vec!["--disable-gpu".to_string()];
        launcher
    }

    #[test]
    fn args_carry_port_profile_and_extra_flags() {
        let args = launcher(false).build_args();

        assert_eq!(args[0], "--remote-debugging-port=9333");
        assert_eq!(args[1], "--user-data-dir=/tmp/feedreact-profile");
        assert_eq!(args.last().map(String::as_str), Some("--disable-gpu"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn headless_adds_new_headless_flag() {
        let args = launcher(true).build_args();
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let config = BrowserConfig {
            executable: Some("/definitely/not/a/browser".to_string()),
            ..BrowserConfig::default()
        };

        let result = BrowserLauncher::from_config("crawl", &config);
        assert!(matches!(result, Err(FeedReactError::BrowserLaunchFailed(_))));
    }
}
