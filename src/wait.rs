use crate::Error;
use crate::Result;
use crate::config::SubmitConfig;
use crate::frame::ElementHandle;
use crate::frame::FrameContext;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio::time::sleep;
use tracing::trace;

/// Repeatedly runs `probe` until it yields a value or `timeout` elapses.
///
/// The probe always runs at least once. Transient failures are the probe's
/// business: it returns `None` for "not yet" regardless of why.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(interval).await;
    }
}

/// Blocking-with-timeout element acquisition, used before every interaction.
///
/// Two notions of readiness: `wait_clickable` for the message box (it must
/// actually take input) and `wait_present` for the file input (the widget
/// keeps it hidden, so DOM presence is the most that can be asked of it).
#[derive(Debug, Clone, Copy)]
pub struct Waiter {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Waiter {
    pub fn from_config(config: &SubmitConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.step_timeout_ms),
            interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    pub async fn wait_clickable(
        &self,
        ctx: &FrameContext,
        selector: &str,
    ) -> Result<ElementHandle> {
        self.wait(ctx, selector, true).await
    }

    pub async fn wait_present(&self, ctx: &FrameContext, selector: &str) -> Result<ElementHandle> {
        self.wait(ctx, selector, false).await
    }

    async fn wait(
        &self,
        ctx: &FrameContext,
        selector: &str,
        interactable: bool,
    ) -> Result<ElementHandle> {
        trace!("waiting for {selector} (interactable={interactable})");
        poll_until(self.timeout, self.interval, move || async move {
            // CDP hiccups while the widget re-renders count as "not yet".
            ctx.query(selector, interactable).await.ok().flatten()
        })
        .await
        .ok_or_else(|| Error::ElementTimeout {
            locator: selector.to_string(),
            timeout: self.timeout,
        })
    }
}
