use crate::Error;
use crate::Result;
use crate::config::SubmitConfig;
use crate::wait::poll_until;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::dom;
use chromiumoxide::cdp::browser_protocol::input::DispatchKeyEventParams;
use chromiumoxide::cdp::browser_protocol::input::DispatchKeyEventType;
use chromiumoxide::cdp::browser_protocol::page::CreateIsolatedWorldParams;
use chromiumoxide::cdp::browser_protocol::page::FrameId;
use chromiumoxide::cdp::js_protocol::runtime::CallFunctionOnParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::cdp::js_protocol::runtime::ExecutionContextId;
use chromiumoxide::cdp::js_protocol::runtime::RemoteObject;
use chromiumoxide::cdp::js_protocol::runtime::RemoteObjectId;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use tracing::info;

const ISOLATED_WORLD_NAME: &str = "widget_submit";

/// One step of the descent into the widget's nested frames.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameHop {
    /// Match the iframe by its element id.
    Id(String),
    /// Match the iframe by its exact class attribute.
    Class(String),
    /// Match the iframe by an arbitrary CSS selector.
    Css(String),
}

impl FrameHop {
    pub fn selector(&self) -> String {
        match self {
            FrameHop::Id(id) => format!("iframe[id='{id}']"),
            FrameHop::Class(class) => format!("iframe[class='{class}']"),
            FrameHop::Css(css) => css.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FrameHop::Id(id) => format!("id={id}"),
            FrameHop::Class(class) => format!("class={class}"),
            FrameHop::Css(css) => format!("css={css}"),
        }
    }
}

/// A resolved element inside a [`FrameContext`].
///
/// Handles are only valid until the widget re-renders; callers re-acquire
/// them through the waiter before every interaction rather than caching.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub object_id: RemoteObjectId,
    pub backend_node_id: dom::BackendNodeId,
    pub selector: String,
}

/// The current document scope: the root page, or an isolated world inside
/// one of the widget's nested frames.
///
/// Descent is one-way for this protocol; the hop chain is recorded so
/// diagnostics can say where in the tree a failure happened.
#[derive(Clone)]
pub struct FrameContext {
    page: Page,
    context_id: ExecutionContextId,
    chain: Vec<String>,
}

impl FrameContext {
    /// Binds the root document of `page` as the initial context.
    pub async fn root(page: Page) -> Result<Self> {
        page.execute(dom::EnableParams::default()).await?;
        page.execute(dom::GetDocumentParams::default()).await?;

        // The main frame id can lag right after navigation.
        let mut frame_id = None;
        for _ in 0..20 {
            if let Some(id) = page.mainframe().await? {
                frame_id = Some(id);
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
        let frame_id =
            frame_id.ok_or_else(|| Error::Cdp("main frame never became available".into()))?;

        let context_id = isolated_world(&page, frame_id).await?;
        Ok(Self {
            page,
            context_id,
            chain: Vec::new(),
        })
    }

    /// Descends one hop: finds the iframe element in this context and enters
    /// its document. Errors when the frame element is not present yet; the
    /// locator polls around this.
    pub async fn enter_frame(&self, hop: &FrameHop) -> Result<FrameContext> {
        let selector = hop.selector();
        let element = self
            .query(&selector, false)
            .await?
            .ok_or_else(|| Error::Cdp(format!("frame element {selector} not present")))?;

        let describe = dom::DescribeNodeParams::builder()
            .object_id(element.object_id.clone())
            .build();
        let node = self.page.execute(describe).await?.result.node;
        let frame_id = node
            .frame_id
            .ok_or_else(|| Error::Cdp(format!("{selector} is not a frame owner")))?;

        let context_id = isolated_world(&self.page, frame_id).await?;
        let mut chain = self.chain.clone();
        chain.push(hop.describe());
        debug!("entered frame context {}", chain.join(" > "));

        Ok(FrameContext {
            page: self.page.clone(),
            context_id,
            chain,
        })
    }

    /// Runs `expression` in this context, returning the raw remote object.
    async fn evaluate(&self, expression: &str) -> Result<RemoteObject> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(self.context_id.clone())
            .build()
            .map_err(Error::Cdp)?;
        let returns = self.page.execute(params).await?.result;
        if let Some(details) = returns.exception_details {
            return Err(Error::Cdp(format!("script threw: {}", details.text)));
        }
        Ok(returns.result)
    }

    /// Runs `expression` and deserializes its value.
    pub async fn eval_value(&self, expression: &str) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(self.context_id.clone())
            .return_by_value(true)
            .build()
            .map_err(Error::Cdp)?;
        let returns = self.page.execute(params).await?.result;
        if let Some(details) = returns.exception_details {
            return Err(Error::Cdp(format!("script threw: {}", details.text)));
        }
        Ok(returns.result.value.unwrap_or(Value::Null))
    }

    /// Looks the selector up fresh in this context. `interactable` demands a
    /// visible, enabled element; otherwise DOM presence is enough (the
    /// widget keeps its file input hidden, so presence is all it can offer).
    pub async fn query(&self, selector: &str, interactable: bool) -> Result<Option<ElementHandle>> {
        let object = self.evaluate(&query_expression(selector, interactable)).await?;
        let Some(object_id) = object.object_id else {
            return Ok(None);
        };

        let describe = dom::DescribeNodeParams::builder()
            .object_id(object_id.clone())
            .build();
        let node = self.page.execute(describe).await?.result.node;

        Ok(Some(ElementHandle {
            object_id,
            backend_node_id: node.backend_node_id,
            selector: selector.to_string(),
        }))
    }

    pub async fn focus(&self, element: &ElementHandle) -> Result<()> {
        let params = dom::FocusParams::builder()
            .backend_node_id(element.backend_node_id.clone())
            .build();
        self.page.execute(params).await?;
        Ok(())
    }

    /// Types `text` into the focused element as individual key events,
    /// byte-for-byte: the caller's already-decoded text is the payload.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        debug!("typing {} chars", text.chars().count());
        for ch in text.chars() {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(ch.to_string())
                .build()
                .map_err(Error::Cdp)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    /// Press-enter equivalent of submitting the message box.
    pub async fn press_enter(&self) -> Result<()> {
        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key("Enter")
            .code("Enter")
            .text("\r")
            .windows_virtual_key_code(13)
            .build()
            .map_err(Error::Cdp)?;
        self.page.execute(down).await?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .build()
            .map_err(Error::Cdp)?;
        self.page.execute(up).await?;
        Ok(())
    }

    /// Clicks the element through its own DOM handle, which works even for
    /// controls the widget positions off-screen.
    pub async fn click(&self, element: &ElementHandle) -> Result<()> {
        let params = CallFunctionOnParams::builder()
            .function_declaration("function() { this.click(); }")
            .object_id(element.object_id.clone())
            .build()
            .map_err(Error::Cdp)?;
        self.page.execute(params).await?;
        Ok(())
    }

    /// Feeds an absolute file path to a (possibly hidden) file input.
    pub async fn set_file_input(&self, element: &ElementHandle, path: &Path) -> Result<()> {
        let params = dom::SetFileInputFilesParams {
            files: vec![path.to_string_lossy().into_owned()],
            node_id: None,
            backend_node_id: Some(element.backend_node_id.clone()),
            object_id: None,
        };
        self.page.execute(params).await?;
        Ok(())
    }

    /// Serialized markup of this context's document, for failure reports.
    pub async fn outer_html(&self) -> Result<String> {
        let value = self
            .eval_value("document.documentElement.outerHTML")
            .await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::Cdp("document markup was not a string".into()))
    }

    /// `root > id=... > class=...` style description of where this context
    /// sits in the frame tree.
    pub fn location(&self) -> String {
        if self.chain.is_empty() {
            "root".to_string()
        } else {
            format!("root > {}", self.chain.join(" > "))
        }
    }
}

async fn isolated_world(page: &Page, frame_id: FrameId) -> Result<ExecutionContextId> {
    let params = CreateIsolatedWorldParams::builder()
        .frame_id(frame_id)
        .world_name(ISOLATED_WORLD_NAME)
        // Upstream protocol binding spells the setter without the "sal".
        .grant_univeral_access(true)
        .build()
        .map_err(Error::Cdp)?;
    Ok(page.execute(params).await?.result.execution_context_id)
}

/// JS probe returning the matched element, or null while it is absent or
/// (when `interactable`) still hidden or disabled.
pub(crate) fn query_expression(selector: &str, interactable: bool) -> String {
    let sel = serde_json::to_string(selector).unwrap_or_default();
    if interactable {
        format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el || el.disabled) return null; \
             const style = getComputedStyle(el); \
             if (style.display === 'none' || style.visibility === 'hidden') return null; \
             return el; }})()"
        )
    } else {
        format!("document.querySelector({sel})")
    }
}

/// Walks the fixed chain of nested frames down to the widget's input
/// surface. Each hop waits (bounded) for the frame element to show up in the
/// current context before entering it; a miss at any hop is fatal.
pub struct FrameLocator {
    timeout: Duration,
    interval: Duration,
}

impl FrameLocator {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_config(config: &SubmitConfig) -> Self {
        Self::new(
            Duration::from_millis(config.step_timeout_ms),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    pub async fn descend(&self, root: &FrameContext, chain: &[FrameHop]) -> Result<FrameContext> {
        let mut ctx = root.clone();
        for (index, hop) in chain.iter().enumerate() {
            info!("locating frame {} ({})", index + 1, hop.describe());
            let ctx_ref = &ctx;
            let next = poll_until(self.timeout, self.interval, move || async move {
                ctx_ref.enter_frame(hop).await.ok()
            })
            .await;

            ctx = next.ok_or_else(|| Error::FrameNotFound {
                hop: index + 1,
                locator: hop.describe(),
                timeout: self.timeout,
            })?;
            info!("switched into frame {} ({})", index + 1, hop.describe());
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hop_selectors() {
        assert_eq!(
            FrameHop::Id("iFrameResizer0".into()).selector(),
            "iframe[id='iFrameResizer0']"
        );
        assert_eq!(
            FrameHop::Class("a b".into()).selector(),
            "iframe[class='a b']"
        );
        assert_eq!(FrameHop::Css("div > iframe".into()).selector(), "div > iframe");
    }

    #[test]
    fn isolated_world_params_carry_universal_access() {
        let params = CreateIsolatedWorldParams::builder()
            .frame_id(FrameId::new("frame-1"))
            .world_name(ISOLATED_WORLD_NAME)
            .grant_univeral_access(true)
            .build()
            .unwrap();
        assert_eq!(params.grant_univeral_access, Some(true));
        assert_eq!(params.world_name.as_deref(), Some(ISOLATED_WORLD_NAME));
    }

    #[test]
    fn query_expression_escapes_selector() {
        let expr = query_expression("input[placeholder='Send a message']", false);
        assert_eq!(
            expr,
            r#"document.querySelector("input[placeholder='Send a message']")"#
        );
    }

    #[test]
    fn interactable_probe_checks_visibility() {
        let expr = query_expression("input[type='file']", true);
        assert!(expr.contains("el.disabled"));
        assert!(expr.contains("getComputedStyle"));
        assert!(expr.contains(r#""input[type='file']""#));
    }

    #[test]
    fn query_expression_survives_quotes_in_selector() {
        let expr = query_expression(r#"input[data-x="a"]"#, false);
        assert!(expr.contains(r#"\"a\""#));
    }
}
