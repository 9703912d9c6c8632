use std::path::PathBuf;

use crate::config::DiagnosticsConfig;

/// Written when the feed state cannot be decoded
pub const FAILED_FEED_FILE: &str = "failed_unmarshal_feeds.json";
pub const LOGIN_SCREENSHOT_FILE: &str = "login_failure_screenshot.png";
pub const LOGIN_HTML_FILE: &str = "login_failure.html";

/// Best-effort artifact writer for post-mortem debugging.
///
/// A failed write is logged and otherwise ignored; artifacts never change
/// the outcome of the operation that produced them.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        Self::new(shellexpand::tilde(&config.dir).into_owned())
    }

    /// Write `contents` to `name` inside the artifact directory.
    pub fn save(&self, name: &str, contents: &[u8]) -> Option<PathBuf> {
        let path = self.dir.join(name);

        let written =
            std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, contents));
        match written {
            Ok(()) => {
                tracing::info!("Saved {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Could not save {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_creates_the_directory() {
        let temp = TempDir::new().unwrap();
        let diagnostics = Diagnostics::new(temp.path().join("artifacts"));

        let path = diagnostics.save(FAILED_FEED_FILE, b"{}").unwrap();

        assert_eq!(path, temp.path().join("artifacts").join(FAILED_FEED_FILE));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }

    #[test]
    fn save_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "file, not a dir").unwrap();

        let diagnostics = Diagnostics::new(&blocker);
        assert!(diagnostics.save(LOGIN_HTML_FILE, b"<html>").is_none());
    }
}
