pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod frame;
pub mod sequencer;
pub mod session;
pub mod upload;
pub mod wait;

pub use cli::Cli;
pub use config::SubmitConfig;
pub use config::UploadStrategy;
pub use config::WidgetLocators;
pub use frame::FrameContext;
pub use frame::FrameHop;
pub use frame::FrameLocator;
pub use sequencer::Sequencer;
pub use sequencer::SubmissionRequest;
pub use session::BrowserSession;
pub use wait::Waiter;

use std::time::Duration;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("frame {locator} (hop {hop}) did not appear within {timeout:?}")]
    FrameNotFound {
        hop: usize,
        locator: String,
        timeout: Duration,
    },

    #[error("element {locator} was not ready within {timeout:?}")]
    ElementTimeout { locator: String, timeout: Duration },

    #[error("attachment upload failed: {0}")]
    Upload(String),

    #[error("submission did not finish within the {0:?} deadline")]
    Deadline(Duration),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Entry point used by the `widget-submit` binary.
pub async fn run_main(cli: Cli) -> Result<()> {
    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let (config, request) = cli.into_parts().await?;
    config.validate()?;

    info!(
        "submitting request for {} ({} attachment(s))",
        request.full_name,
        request.attachments.len()
    );

    submit(&config, &request).await
}

/// Runs one complete submission against a fresh browser session.
///
/// Policy carried over from the original deployment: the browser is left
/// open after success, failure and deadline expiry alike, so a human can
/// inspect the widget's final state. The session is launched outside the
/// deadline scope: the timeout cancels only the driving future, never the
/// session handle, whose drop would take the browser process with it.
pub async fn submit(config: &SubmitConfig, request: &SubmissionRequest) -> Result<()> {
    let session = BrowserSession::launch(config).await?;

    let deadline = Duration::from_secs(config.deadline_secs);
    let result = match tokio::time::timeout(deadline, drive(&session, config, request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Deadline(deadline)),
    };

    match &result {
        Ok(()) => info!("submission completed; leaving the browser open for inspection"),
        Err(err) => error!("submission failed: {err}; leaving the browser open for inspection"),
    }
    session.leave_open();

    result
}

async fn drive(
    session: &BrowserSession,
    config: &SubmitConfig,
    request: &SubmissionRequest,
) -> Result<()> {
    let page = session.goto(&config.page_url).await?;

    // The widget exposes no readiness event; give it a head start before the
    // frame chain is even probed. The poll-based waits below are the real
    // synchronization, this is a tunable safety margin.
    info!(
        "waiting {}ms for the widget to finish its initial load",
        config.warmup_ms
    );
    tokio::time::sleep(Duration::from_millis(config.warmup_ms)).await;

    let root = FrameContext::root(page).await?;

    let locator = FrameLocator::from_config(config);
    let ctx = match locator.descend(&root, &config.locators.frame_chain()).await {
        Ok(ctx) => ctx,
        Err(err) => {
            diagnostics::report(&root, "frame-descent", config.diagnostics_dir.as_deref()).await;
            return Err(err);
        }
    };

    Sequencer::new(&ctx, config).run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    struct DropSentinel(Arc<AtomicBool>);

    impl Drop for DropSentinel {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    // Mirrors the ownership shape of `submit`: the session handle lives
    // outside the deadline scope, so expiry cancels the driving future
    // without tearing the handle (and with it the browser) down.
    #[tokio::test]
    async fn deadline_expiry_leaves_the_session_handle_alive() {
        let torn_down = Arc::new(AtomicBool::new(false));
        let session = DropSentinel(torn_down.clone());

        let deadline = Duration::from_millis(20);
        let outcome = tokio::time::timeout(deadline, async {
            let _session = &session;
            std::future::pending::<()>().await;
        })
        .await;

        assert!(outcome.is_err());
        assert!(!torn_down.load(Ordering::SeqCst));

        drop(session);
        assert!(torn_down.load(Ordering::SeqCst));
    }

    #[test]
    fn deadline_error_reports_the_budget() {
        let err = Error::Deadline(Duration::from_secs(600));
        assert!(err.to_string().contains("600s"));
    }
}
