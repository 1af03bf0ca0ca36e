use crate::Result;
use crate::config::SubmitConfig;
use crate::diagnostics;
use crate::frame::FrameContext;
use crate::upload;
use crate::wait::Waiter;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use tracing::warn;

/// One support request, as handed over by the HTTP front-end. All text is
/// already percent-decoded; it is delivered to the widget verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub full_name: String,
    pub address: String,
    pub email: String,
    pub issue: String,
    pub attachments: Vec<PathBuf>,
}

/// One entry of the fixed interaction script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Type `text` into the message box and submit it.
    Say { label: &'static str, text: String },
    /// Reveal the file input and feed it `path`.
    Upload { path: PathBuf },
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::Say { label, .. } => *label,
            Step::Upload { .. } => "attachment",
        }
    }
}

/// Builds the fixed, ordered script for one request.
///
/// The shape is a contract of the external widget's dialogue flow, not of
/// this code: the address is asked for twice and the issue text is repeated
/// at the end. Deduplicating either would break the conversation.
///
/// Policy (the deployed behavior): when an attachment is supplied, the
/// upload happens before the name entry. The widget prompts for the image
/// up front, and the affordance strategy answers its "anything to add?"
/// prompt with a literal "yes" right after the file lands.
pub fn plan(request: &SubmissionRequest, config: &SubmitConfig) -> Vec<Step> {
    let mut steps = Vec::with_capacity(9);

    if let Some(path) = request.attachments.first() {
        if request.attachments.len() > 1 {
            // Upstream is expected to composite multiple images into one
            // file before invoking us; extras are a known limitation.
            warn!(
                "{} attachments supplied, only {} will be uploaded",
                request.attachments.len(),
                path.display()
            );
        }
        steps.push(Step::Upload { path: path.clone() });
    }

    steps.push(Step::Say {
        label: "full name",
        text: request.full_name.clone(),
    });
    steps.push(Step::Say {
        label: "address (first entry)",
        text: request.address.clone(),
    });
    steps.push(Step::Say {
        label: "address (second entry)",
        text: request.address.clone(),
    });
    steps.push(Step::Say {
        label: "email",
        text: request.email.clone(),
    });
    steps.push(Step::Say {
        label: "issue (first entry)",
        text: request.issue.clone(),
    });
    steps.push(Step::Say {
        label: "routing phrase",
        text: config.routing_phrase.clone(),
    });
    steps.push(Step::Say {
        label: "urgency marker",
        text: config.urgency_marker.clone(),
    });
    steps.push(Step::Say {
        label: "issue (second entry)",
        text: request.issue.clone(),
    });

    steps
}

/// Cursor over the fixed step list. Advances only on success; the whole
/// sequence is abandoned on the first failure, never resumed.
#[derive(Debug)]
pub struct SequenceState {
    steps: Vec<Step>,
    cursor: usize,
}

impl SequenceState {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps, cursor: 0 }
    }

    pub fn current(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    pub fn position(&self) -> (usize, usize) {
        (self.cursor, self.steps.len())
    }
}

/// Executes the script against the widget's single message input, one step
/// at a time, re-acquiring the input before every step.
pub struct Sequencer<'a> {
    ctx: &'a FrameContext,
    config: &'a SubmitConfig,
    waiter: Waiter,
}

impl<'a> Sequencer<'a> {
    pub fn new(ctx: &'a FrameContext, config: &'a SubmitConfig) -> Self {
        Self {
            ctx,
            config,
            waiter: Waiter::from_config(config),
        }
    }

    pub async fn run(&self, request: &SubmissionRequest) -> Result<()> {
        let mut state = SequenceState::new(plan(request, self.config));

        while let Some(step) = state.current() {
            let (done, total) = state.position();
            info!("step {}/{}: {}", done + 1, total, step.label());

            if let Err(err) = self.execute(step).await {
                diagnostics::report(
                    self.ctx,
                    step.label(),
                    self.config.diagnostics_dir.as_deref(),
                )
                .await;
                return Err(err);
            }
            state.advance();
        }

        info!("all steps submitted");
        Ok(())
    }

    async fn execute(&self, step: &Step) -> Result<()> {
        match step {
            Step::Say { label, text } => {
                self.send_message(label, text).await?;
            }
            Step::Upload { path } => {
                let uploader = upload::for_strategy(self.config.upload);
                uploader
                    .upload(self.ctx, &self.waiter, self.config, path)
                    .await?;
                if uploader.wants_confirmation() {
                    self.settle().await;
                    self.send_message("attachment confirmation", "yes").await?;
                }
            }
        }
        self.settle().await;
        Ok(())
    }

    /// One text-entry step: locate the message box fresh (the widget may
    /// have re-rendered it since the last step), focus, type, submit.
    async fn send_message(&self, label: &str, text: &str) -> Result<()> {
        let input = self
            .waiter
            .wait_clickable(self.ctx, &self.config.locators.message_input)
            .await?;
        self.ctx.focus(&input).await?;
        self.ctx.type_text(text).await?;
        self.ctx.press_enter().await?;
        info!("submitted {label}");
        Ok(())
    }

    async fn settle(&self) {
        sleep(Duration::from_millis(self.config.settle_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(attachments: Vec<PathBuf>) -> SubmissionRequest {
        SubmissionRequest {
            full_name: "Jane Doe".into(),
            address: "12 Elm St".into(),
            email: "jane@example.com".into(),
            issue: "Leaking tap".into(),
            attachments,
        }
    }

    fn texts(steps: &[Step]) -> Vec<&str> {
        steps
            .iter()
            .filter_map(|s| match s {
                Step::Say { text, .. } => Some(text.as_str()),
                Step::Upload { .. } => None,
            })
            .collect()
    }

    #[test]
    fn plan_without_attachment_is_eight_text_steps() {
        let steps = plan(&request(vec![]), &SubmitConfig::default());
        assert_eq!(steps.len(), 8);
        assert!(steps.iter().all(|s| matches!(s, Step::Say { .. })));
        assert_eq!(
            texts(&steps),
            vec![
                "Jane Doe",
                "12 Elm St",
                "12 Elm St",
                "jane@example.com",
                "Leaking tap",
                "send to property manager",
                "urgent",
                "Leaking tap",
            ]
        );
    }

    #[test]
    fn plan_with_attachment_prepends_the_upload_step() {
        let steps = plan(
            &request(vec![PathBuf::from("/tmp/photo.jpg")]),
            &SubmitConfig::default(),
        );
        assert_eq!(steps.len(), 9);
        assert_eq!(
            steps[0],
            Step::Upload {
                path: PathBuf::from("/tmp/photo.jpg")
            }
        );
        // The trailing eight text steps are unchanged by the upload branch.
        assert_eq!(texts(&steps).len(), 8);
    }

    #[test]
    fn address_and_issue_are_sent_exactly_twice_verbatim() {
        let req = request(vec![]);
        let steps = plan(&req, &SubmitConfig::default());
        let texts = texts(&steps);
        assert_eq!(texts.iter().filter(|t| **t == req.address).count(), 2);
        assert_eq!(texts.iter().filter(|t| **t == req.issue).count(), 2);
    }

    #[test]
    fn multiple_attachments_collapse_to_the_first() {
        let steps = plan(
            &request(vec![PathBuf::from("/tmp/a.jpg"), PathBuf::from("/tmp/b.jpg")]),
            &SubmitConfig::default(),
        );
        let uploads: Vec<_> = steps
            .iter()
            .filter(|s| matches!(s, Step::Upload { .. }))
            .collect();
        assert_eq!(uploads.len(), 1);
        assert_eq!(
            uploads[0],
            &Step::Upload {
                path: PathBuf::from("/tmp/a.jpg")
            }
        );
    }

    #[test]
    fn decoded_text_is_not_re_encoded() {
        let mut req = request(vec![]);
        req.issue = r#"50% "off" & more ½"#.into();
        let steps = plan(&req, &SubmitConfig::default());
        let texts = texts(&steps);
        assert_eq!(texts[4], r#"50% "off" & more ½"#);
        assert_eq!(texts[7], r#"50% "off" & more ½"#);
    }

    #[test]
    fn custom_phrases_come_from_config() {
        let config = SubmitConfig {
            routing_phrase: "escalate".into(),
            urgency_marker: "asap".into(),
            ..SubmitConfig::default()
        };
        let steps = plan(&request(vec![]), &config);
        let texts_vec = texts(&steps);
        assert_eq!(texts_vec[5], "escalate");
        assert_eq!(texts_vec[6], "asap");
    }

    #[test]
    fn cursor_advances_only_when_told() {
        let mut state = SequenceState::new(plan(&request(vec![]), &SubmitConfig::default()));
        assert_eq!(state.position(), (0, 8));
        assert_eq!(state.current().unwrap().label(), "full name");
        state.advance();
        assert_eq!(state.current().unwrap().label(), "address (first entry)");
        for _ in 0..7 {
            state.advance();
        }
        assert!(state.current().is_none());
    }
}
