use crate::Result;
use crate::config::SubmitConfig;
use crate::config::UploadStrategy;
use crate::sequencer::SubmissionRequest;
use clap::Parser;
use std::path::PathBuf;

/// Command-line interface, invoked by the HTTP front-end with the already
/// validated, already percent-decoded form fields.
///
/// The exit status is the whole contract back to the caller: zero means the
/// script ran to completion, non-zero means it was abandoned. Which step
/// failed only shows up in the logs on stderr.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Requester's full name.
    pub full_name: String,

    /// Property address (the widget asks for it twice; it is sent twice).
    pub address: String,

    /// Contact email.
    pub email: String,

    /// Free-form issue description.
    pub issue: String,

    /// Optional attachment path(s). Only the first is uploaded; the caller
    /// composites multiple images into one file beforehand.
    #[arg(value_name = "FILE")]
    pub attachments: Vec<PathBuf>,

    /// JSON config file; CLI flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Page hosting the embedded widget.
    #[arg(long)]
    pub url: Option<String>,

    /// Render headless instead of the default visible window.
    #[arg(long)]
    pub headless: bool,

    /// Force a visible window even when the config file asks for headless.
    #[arg(long, conflicts_with = "headless")]
    pub no_headless: bool,

    /// Pause after each step, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Overall wall-clock budget for the submission, in seconds.
    #[arg(long, value_name = "SECS")]
    pub deadline_secs: Option<u64>,

    /// How to reach the widget's file input when uploading.
    #[arg(long, value_enum)]
    pub upload_strategy: Option<UploadStrategy>,

    /// Where to write failure snapshots of the page markup.
    #[arg(long, value_name = "DIR")]
    pub diagnostics_dir: Option<PathBuf>,
}

impl Cli {
    /// Resolves the effective config (file, then flag overrides) and the
    /// request itself.
    pub async fn into_parts(self) -> Result<(SubmitConfig, SubmissionRequest)> {
        let mut config = match &self.config {
            Some(path) => SubmitConfig::load(path).await?,
            None => SubmitConfig::default(),
        };

        if let Some(url) = self.url {
            config.page_url = url;
        }
        if self.headless {
            config.headless = true;
        } else if self.no_headless {
            config.headless = false;
        }
        if let Some(settle_ms) = self.settle_ms {
            config.settle_ms = settle_ms;
        }
        if let Some(deadline_secs) = self.deadline_secs {
            config.deadline_secs = deadline_secs;
        }
        if let Some(strategy) = self.upload_strategy {
            config.upload = strategy;
        }
        if let Some(dir) = self.diagnostics_dir {
            config.diagnostics_dir = Some(dir);
        }

        let request = SubmissionRequest {
            full_name: self.full_name,
            address: self.address,
            email: self.email,
            issue: self.issue,
            attachments: self.attachments,
        };

        Ok((config, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("widget-submit").chain(args.iter().copied())).unwrap()
    }

    #[tokio::test]
    async fn positional_contract_matches_the_front_end() {
        let cli = parse(&[
            "Jane Doe",
            "12 Elm St",
            "jane@example.com",
            "Leaking tap",
            "/tmp/photo.jpg",
        ]);
        let (_, request) = cli.into_parts().await.unwrap();
        assert_eq!(request.full_name, "Jane Doe");
        assert_eq!(request.address, "12 Elm St");
        assert_eq!(request.email, "jane@example.com");
        assert_eq!(request.issue, "Leaking tap");
        assert_eq!(request.attachments, vec![PathBuf::from("/tmp/photo.jpg")]);
    }

    #[tokio::test]
    async fn attachments_are_optional() {
        let cli = parse(&["Jane Doe", "12 Elm St", "jane@example.com", "Leaking tap"]);
        let (config, request) = cli.into_parts().await.unwrap();
        assert!(request.attachments.is_empty());
        assert!(!config.headless);
        assert_eq!(config.settle_ms, 10_000);
    }

    #[tokio::test]
    async fn flags_override_defaults() {
        let cli = parse(&[
            "Jane Doe",
            "12 Elm St",
            "jane@example.com",
            "Leaking tap",
            "--headless",
            "--settle-ms",
            "250",
            "--deadline-secs",
            "90",
            "--upload-strategy",
            "forced-visibility",
        ]);
        let (config, _) = cli.into_parts().await.unwrap();
        assert!(config.headless);
        assert_eq!(config.settle_ms, 250);
        assert_eq!(config.deadline_secs, 90);
        assert_eq!(config.upload, UploadStrategy::ForcedVisibility);
    }

    #[tokio::test]
    async fn config_file_is_read_and_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submit.json");
        tokio::fs::write(&path, r#"{"settle_ms": 1, "headless": true}"#)
            .await
            .unwrap();

        let cli = parse(&[
            "Jane Doe",
            "12 Elm St",
            "jane@example.com",
            "Leaking tap",
            "--config",
            path.to_str().unwrap(),
            "--settle-ms",
            "7",
        ]);
        let (config, _) = cli.into_parts().await.unwrap();
        assert!(config.headless);
        assert_eq!(config.settle_ms, 7);
    }

    #[tokio::test]
    async fn no_headless_flag_overrides_a_headless_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submit.json");
        tokio::fs::write(&path, r#"{"headless": true}"#).await.unwrap();

        let cli = parse(&[
            "Jane Doe",
            "12 Elm St",
            "jane@example.com",
            "Leaking tap",
            "--config",
            path.to_str().unwrap(),
            "--no-headless",
        ]);
        let (config, _) = cli.into_parts().await.unwrap();
        assert!(!config.headless);
    }

    #[test]
    fn headless_and_no_headless_are_mutually_exclusive() {
        let result = Cli::try_parse_from([
            "widget-submit",
            "Jane Doe",
            "12 Elm St",
            "jane@example.com",
            "Leaking tap",
            "--headless",
            "--no-headless",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_positional_fields_are_rejected() {
        let result =
            Cli::try_parse_from(["widget-submit", "Jane Doe", "12 Elm St", "jane@example.com"]);
        assert!(result.is_err());
    }
}
