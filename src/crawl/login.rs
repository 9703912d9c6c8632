use std::time::Duration;

use tokio::time::{sleep, timeout};

use super::diagnostics::{Diagnostics, LOGIN_HTML_FILE, LOGIN_SCREENSHOT_FILE};
use crate::browser::PageDriver;
use crate::config::LoginConfig;
use crate::error::{FeedReactError, Result};

/// Sign in through the login form.
///
/// On failure a screenshot and the page markup are saved before the error is
/// returned.
pub async fn sign_in(
    driver: &dyn PageDriver,
    login: &LoginConfig,
    email: &str,
    password: &str,
    diagnostics: &Diagnostics,
    element_timeout: Duration,
) -> Result<()> {
    tracing::info!("Signing in at {}", login.url);

    let budget = Duration::from_secs(login.timeout_secs);
    let signed_in = timeout(budget, async {
        fill_form(driver, login, email, password, element_timeout).await?;
        submit(driver, &login.submit_selector).await?;
        sleep(Duration::from_millis(login.settle_ms)).await;
        driver
            .wait_visible(&login.signed_in_selector, element_timeout)
            .await
    })
    .await
    .unwrap_or_else(|_| {
        Err(FeedReactError::Timeout(format!(
            "sign-in did not finish within {:?}",
            budget
        )))
    });

    match signed_in {
        Ok(()) => {
            tracing::info!("Signed in");
            Ok(())
        }
        Err(e) => {
            save_failure_artifacts(driver, diagnostics).await;
            Err(FeedReactError::LoginFailed(e.to_string()))
        }
    }
}

async fn fill_form(
    driver: &dyn PageDriver,
    login: &LoginConfig,
    email: &str,
    password: &str,
    element_timeout: Duration,
) -> Result<()> {
    driver.navigate(&login.url).await?;
    driver
        .wait_visible(&login.email_selector, element_timeout)
        .await?;
    driver.send_keys(&login.email_selector, email).await?;
    driver.send_keys(&login.password_selector, password).await
}

/// Click the submit button from script; the button can sit under an overlay
async fn submit(driver: &dyn PageDriver, selector: &str) -> Result<()> {
    let quoted = serde_json::to_string(selector)?;
    let script = format!(
        r#"(function() {{
    const button = document.querySelector({quoted});
    if (!button) return false;
    button.click();
    return true;
}})()"#
    );

    match driver.evaluate(&script).await?.as_bool() {
        Some(true) => Ok(()),
        _ => Err(FeedReactError::ElementNotFound(selector.to_string())),
    }
}

async fn save_failure_artifacts(driver: &dyn PageDriver, diagnostics: &Diagnostics) {
    match driver.screenshot().await {
        Ok(png) => {
            diagnostics.save(LOGIN_SCREENSHOT_FILE, &png);
        }
        Err(e) => tracing::warn!("Could not capture a login screenshot: {}", e),
    }

    match driver.evaluate("document.documentElement.outerHTML").await {
        Ok(html) => {
            diagnostics.save(LOGIN_HTML_FILE, html.as_str().unwrap_or_default().as_bytes());
        }
        Err(e) => tracing::warn!("Could not capture the login page: {}", e),
    }
}
