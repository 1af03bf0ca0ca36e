use crate::Error;
use crate::Result;
use crate::frame::FrameHop;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// Tunables for one submission run.
///
/// Every pause in the protocol is configuration, not a literal in the code:
/// the widget has no readiness signal, so the settle delays are safety
/// margins layered on top of the poll-based element waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Page hosting the embedded chat widget.
    #[serde(default = "default_page_url")]
    pub page_url: String,

    /// The widget's JS has been observed to behave differently headless, so
    /// a visible window is the default.
    #[serde(default)]
    pub headless: bool,

    /// One-off pause after navigation, before the frame chain is probed.
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,

    /// Pause after every interaction step.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Interval between element/frame presence probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for any single frame hop or element wait.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Wall-clock budget for the whole submission.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    #[serde(default)]
    pub upload: UploadStrategy,

    /// Pause between triggering the upload affordance and probing for the
    /// native file input it reveals.
    #[serde(default = "default_upload_reveal_ms")]
    pub upload_reveal_ms: u64,

    /// Where failure snapshots are written. None disables snapshot files
    /// (the markup is still logged).
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,

    /// Literal phrase that routes the conversation to a human.
    #[serde(default = "default_routing_phrase")]
    pub routing_phrase: String,

    /// Literal marker the widget's dialogue flow expects for priority.
    #[serde(default = "default_urgency_marker")]
    pub urgency_marker: String,

    #[serde(default)]
    pub locators: WidgetLocators,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            page_url: default_page_url(),
            headless: false,
            warmup_ms: default_warmup_ms(),
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            step_timeout_ms: default_step_timeout_ms(),
            deadline_secs: default_deadline_secs(),
            upload: UploadStrategy::default(),
            upload_reveal_ms: default_upload_reveal_ms(),
            diagnostics_dir: None,
            routing_phrase: default_routing_phrase(),
            urgency_marker: default_urgency_marker(),
            locators: WidgetLocators::default(),
        }
    }
}

impl SubmitConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.page_url)
            .map_err(|e| Error::Config(format!("page_url `{}`: {e}", self.page_url)))?;
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be non-zero".into()));
        }
        Ok(())
    }
}

/// Strategy for making the widget's hidden file input addressable.
/// Exactly one is used per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStrategy {
    /// Click the widget's visible upload control, then feed the file input
    /// it reveals. Requires a "yes" confirmation in the message box.
    #[default]
    Affordance,
    /// Force the file input visible via a style mutation and feed it
    /// directly. No confirmation keystroke.
    ForcedVisibility,
}

/// Every selector the automation relies on, in one place.
///
/// The widget's DOM is a third-party versioned contract; when it drifts,
/// this table changes, not the sequencing logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetLocators {
    /// Element id of the outer resizer frame embedding the widget.
    #[serde(default = "default_outer_frame_id")]
    pub outer_frame_id: String,

    /// Exact class attribute of the inner messenger frame.
    #[serde(default = "default_inner_frame_class")]
    pub inner_frame_class: String,

    /// The single chat message input everything is typed into.
    #[serde(default = "default_message_input")]
    pub message_input: String,

    /// The paperclip-style upload control.
    #[serde(default = "default_upload_button")]
    pub upload_button: String,

    /// The native file input, normally hidden by the widget's CSS.
    #[serde(default = "default_file_input")]
    pub file_input: String,
}

impl Default for WidgetLocators {
    fn default() -> Self {
        Self {
            outer_frame_id: default_outer_frame_id(),
            inner_frame_class: default_inner_frame_class(),
            message_input: default_message_input(),
            upload_button: default_upload_button(),
            file_input: default_file_input(),
        }
    }
}

impl WidgetLocators {
    /// The fixed two-hop descent to the widget's live input surface.
    pub fn frame_chain(&self) -> Vec<FrameHop> {
        vec![
            FrameHop::Id(self.outer_frame_id.clone()),
            FrameHop::Class(self.inner_frame_class.clone()),
        ]
    }
}

fn default_page_url() -> String {
    "http://localhost:5000/tapi.html".to_string()
}

fn default_warmup_ms() -> u64 {
    30_000
}

fn default_settle_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_step_timeout_ms() -> u64 {
    20_000
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_upload_reveal_ms() -> u64 {
    5_000
}

fn default_routing_phrase() -> String {
    "send to property manager".to_string()
}

fn default_urgency_marker() -> String {
    "urgent".to_string()
}

fn default_outer_frame_id() -> String {
    "iFrameResizer0".to_string()
}

fn default_inner_frame_class() -> String {
    "__flowai_messenger_frame__ __flowai_messenger_frame__embedded__".to_string()
}

fn default_message_input() -> String {
    "input[placeholder='Send a message']".to_string()
}

fn default_upload_button() -> String {
    "button[title='Upload']".to_string()
}

fn default_file_input() -> String {
    "input[type='file']".to_string()
}
