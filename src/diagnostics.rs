use crate::Result;
use crate::frame::FrameContext;
use chrono::Utc;
use std::path::Path;
use std::path::PathBuf;
use tracing::error;
use tracing::warn;

/// Captured page state for a failed step.
#[derive(Debug)]
pub struct FailureSnapshot {
    pub step: String,
    pub location: String,
    pub html: Option<String>,
    pub file: Option<PathBuf>,
}

/// Captures the current rendered markup of `ctx` and logs it before the
/// sequence is abandoned. Best-effort: capture problems are logged and
/// swallowed so they never mask the error that got us here.
pub async fn report(ctx: &FrameContext, step: &str, dir: Option<&Path>) -> FailureSnapshot {
    let html = match ctx.outer_html().await {
        Ok(html) => Some(html),
        Err(err) => {
            warn!("could not capture page markup for failed step `{step}`: {err}");
            None
        }
    };

    let mut snapshot = FailureSnapshot {
        step: step.to_string(),
        location: ctx.location(),
        html,
        file: None,
    };

    match &snapshot.html {
        Some(html) => error!(
            "step `{}` failed in {}; captured {} bytes of markup: {}",
            snapshot.step,
            snapshot.location,
            html.len(),
            preview(html)
        ),
        None => error!(
            "step `{}` failed in {}; no markup captured",
            snapshot.step, snapshot.location
        ),
    }

    if let (Some(dir), Some(html)) = (dir, snapshot.html.as_deref()) {
        match write_snapshot(dir, step, html).await {
            Ok(path) => {
                error!("markup snapshot written to {}", path.display());
                snapshot.file = Some(path);
            }
            Err(err) => warn!("could not write markup snapshot: {err}"),
        }
    }

    snapshot
}

/// Writes the captured markup to `dir`, creating it if needed.
pub async fn write_snapshot(dir: &Path, step: &str, html: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let name = format!(
        "snapshot-{}-{}.html",
        Utc::now().format("%Y%m%d-%H%M%S"),
        slug(step)
    );
    let path = dir.join(name);
    tokio::fs::write(&path, html).await?;
    Ok(path)
}

fn slug(step: &str) -> String {
    step.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

fn preview(html: &str) -> &str {
    let cut = html
        .char_indices()
        .nth(2000)
        .map(|(i, _)| i)
        .unwrap_or(html.len());
    &html[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_file_lands_in_the_requested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "issue (first entry)", "<html></html>")
            .await
            .unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.file_name().unwrap().to_string_lossy().ends_with(
            "issue--first-entry-.html"
        ));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn snapshot_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let path = write_snapshot(&nested, "frame-descent", "<p/>").await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let s = "é".repeat(3000);
        let p = preview(&s);
        assert_eq!(p.chars().count(), 2000);
    }
}
