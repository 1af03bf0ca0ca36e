use crate::Error;
use crate::Result;
use crate::config::SubmitConfig;
use crate::config::UploadStrategy;
use crate::frame::ElementHandle;
use crate::frame::FrameContext;
use crate::wait::Waiter;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use tracing::warn;

/// One capability, two ways to get there: make the widget's native file
/// input reachable, then feed it a path. Which implementation runs is a
/// configuration choice; exactly one is used per submission.
#[async_trait]
pub trait RevealFileInput: Send + Sync {
    /// Makes the file input addressable and returns its handle.
    async fn reveal(
        &self,
        ctx: &FrameContext,
        waiter: &Waiter,
        config: &SubmitConfig,
    ) -> Result<ElementHandle>;

    /// Whether the widget expects a "yes" in the message box after the file
    /// lands. Only the affordance flow triggers that prompt.
    fn wants_confirmation(&self) -> bool;

    async fn upload(
        &self,
        ctx: &FrameContext,
        waiter: &Waiter,
        config: &SubmitConfig,
        path: &Path,
    ) -> Result<()> {
        if !path.is_absolute() {
            // The front-end contract hands us absolute paths; a relative one
            // means something upstream changed.
            warn!("attachment path {} is not absolute", path.display());
        }

        let input = self.reveal(ctx, waiter, config).await?;
        ctx.set_file_input(&input, path)
            .await
            .map_err(|e| Error::Upload(format!("file input rejected {}: {e}", path.display())))?;
        info!("attachment {} handed to the widget", path.display());
        Ok(())
    }
}

pub fn for_strategy(strategy: UploadStrategy) -> Box<dyn RevealFileInput> {
    match strategy {
        UploadStrategy::Affordance => Box::new(AffordanceTrigger),
        UploadStrategy::ForcedVisibility => Box::new(ForcedVisibility),
    }
}

/// Clicks the widget's visible upload control so the widget itself wires up
/// the file input, then waits for that input to appear.
pub struct AffordanceTrigger;

#[async_trait]
impl RevealFileInput for AffordanceTrigger {
    async fn reveal(
        &self,
        ctx: &FrameContext,
        waiter: &Waiter,
        config: &SubmitConfig,
    ) -> Result<ElementHandle> {
        let button = waiter
            .wait_clickable(ctx, &config.locators.upload_button)
            .await
            .map_err(|e| Error::Upload(format!("upload control never appeared: {e}")))?;
        ctx.click(&button)
            .await
            .map_err(|e| Error::Upload(format!("upload control rejected the click: {e}")))?;
        info!("clicked the upload control");

        // Give the widget a moment to mount the input behind the control.
        sleep(Duration::from_millis(config.upload_reveal_ms)).await;

        waiter
            .wait_present(ctx, &config.locators.file_input)
            .await
            .map_err(|e| Error::Upload(format!("file input never appeared: {e}")))
    }

    fn wants_confirmation(&self) -> bool {
        true
    }
}

/// Skips the affordance entirely: flips the hidden file input's display
/// style so it can be fed directly. No confirmation prompt follows.
pub struct ForcedVisibility;

#[async_trait]
impl RevealFileInput for ForcedVisibility {
    async fn reveal(
        &self,
        ctx: &FrameContext,
        waiter: &Waiter,
        config: &SubmitConfig,
    ) -> Result<ElementHandle> {
        let input = waiter
            .wait_present(ctx, &config.locators.file_input)
            .await
            .map_err(|e| Error::Upload(format!("file input never appeared: {e}")))?;

        ctx.eval_value(&force_visible_expression(&config.locators.file_input))
            .await
            .map_err(|e| Error::Upload(format!("could not unhide the file input: {e}")))?;
        info!("forced the file input visible");
        Ok(input)
    }

    fn wants_confirmation(&self) -> bool {
        false
    }
}

fn force_visible_expression(selector: &str) -> String {
    let sel = serde_json::to_string(selector).unwrap_or_default();
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         if (!el) return false; \
         el.style.display = 'block'; \
         return true; }})()"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affordance_flow_requires_the_confirmation_keystroke() {
        assert!(for_strategy(UploadStrategy::Affordance).wants_confirmation());
    }

    #[test]
    fn forced_visibility_skips_the_confirmation_keystroke() {
        assert!(!for_strategy(UploadStrategy::ForcedVisibility).wants_confirmation());
    }

    #[test]
    fn force_visible_expression_escapes_the_selector() {
        let expr = force_visible_expression("input[type='file']");
        assert!(expr.contains(r#""input[type='file']""#));
        assert!(expr.contains("el.style.display = 'block'"));
    }
}
