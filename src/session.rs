use crate::Error;
use crate::Result;
use crate::config::SubmitConfig;
use chromiumoxide::Browser;
use chromiumoxide::BrowserConfig;
use chromiumoxide::Page;
use chromiumoxide::browser::HeadlessMode;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Owns one browser process for the duration of one submission.
///
/// Teardown is deliberately optional: the deployed policy is to leave the
/// browser open after the run so a human can inspect what the widget ended
/// up showing. `leave_open` implements that policy; `close` exists for
/// callers that do want the process gone.
pub struct BrowserSession {
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    user_data_dir: String,
}

impl BrowserSession {
    pub async fn launch(config: &SubmitConfig) -> Result<Self> {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let user_data_dir = format!(
            "/tmp/widget-submit-{}-{}",
            std::process::id(),
            timestamp
        );

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            // Host isolation flags the widget's page is served under.
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            // Keep the widget's nested frames in-process so their documents
            // stay addressable from the page's CDP session.
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--disable-blink-features=AutomationControlled");

        builder = if config.headless {
            builder.headless_mode(HeadlessMode::New)
        } else {
            builder.with_head()
        };

        let browser_config = builder.build().map_err(Error::Launch)?;

        info!(
            "launching browser (headless={}, profile={})",
            config.headless, user_data_dir
        );
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("browser event: {:?}", event);
            }
        });

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            user_data_dir,
        })
    }

    /// Opens the widget's host page in a fresh tab.
    pub async fn goto(&self, url: &str) -> Result<Page> {
        let browser_guard = self.browser.lock().await;
        let browser = browser_guard
            .as_ref()
            .ok_or_else(|| Error::Launch("browser already closed".into()))?;

        info!("navigating to {url}");
        let page = browser.new_page(url).await?;
        if let Err(err) = page.wait_for_navigation().await {
            // The warm-up and poll waits cover slow loads; this is advisory.
            warn!("navigation wait ended early: {err}");
        }
        Ok(page)
    }

    /// Policy exit: detaches from the browser without closing it, leaving
    /// the final page state on screen.
    pub fn leave_open(self) {
        if let Some(browser) = self.browser.into_inner() {
            // Dropping the handle would kill the child process; forgetting
            // it keeps the window alive past our exit.
            std::mem::forget(browser);
        }
        if let Some(task) = self.handler_task.into_inner() {
            task.abort();
        }
        info!(
            "browser left open (profile {} kept for inspection)",
            self.user_data_dir
        );
    }

    /// Hard teardown, for callers that do not want the inspection window.
    pub async fn close(&self) -> Result<()> {
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        let mut browser_guard = self.browser.lock().await;
        if let Some(mut browser) = browser_guard.take() {
            info!("closing browser");
            browser.close().await?;
            let _ = browser.wait().await;
            if let Err(err) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
                warn!(
                    "could not remove browser profile {}: {err}",
                    self.user_data_dir
                );
            }
        }
        Ok(())
    }
}
