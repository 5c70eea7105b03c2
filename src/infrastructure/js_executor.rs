//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"与 DOM 操作能力

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{AutomationError, Result};

/// DOM 选择器
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomSelector {
    Css(String),
    XPath(String),
}

impl DomSelector {
    pub fn css(selector: impl Into<String>) -> Self {
        DomSelector::Css(selector.into())
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        DomSelector::XPath(selector.into())
    }

    /// 返回一个求值为元素或 null 的 JS 表达式
    fn element_expr(&self) -> String {
        match self {
            DomSelector::Css(css) => {
                format!("document.querySelector({})", js_string(css))
            }
            DomSelector::XPath(xpath) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(xpath)
            ),
        }
    }
}

impl std::fmt::Display for DomSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomSelector::Css(css) => write!(f, "css={}", css),
            DomSelector::XPath(xpath) => write!(f, "xpath={}", xpath),
        }
    }
}

/// 元素需要满足的条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomCondition {
    Present,
    Visible,
    /// 可见且未禁用
    Clickable,
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// 浏览器 DOM 能力
///
/// 流程层只依赖此 trait，测试中以假实现替换。
#[async_trait]
pub trait WebSession: Send + Sync {
    async fn probe(&self, selector: &DomSelector, condition: DomCondition) -> Result<bool>;
    async fn click(&self, selector: &DomSelector) -> Result<()>;
    async fn fill(&self, selector: &DomSelector, text: &str) -> Result<()>;
    async fn read_attribute(&self, selector: &DomSelector, name: &str) -> Result<Option<String>>;
    async fn select_value(&self, selector: &DomSelector, value: &str) -> Result<()>;
    async fn goto(&self, url: &str) -> Result<()>;
    /// 当前会话的 cookie (name, value)
    async fn cookies(&self) -> Result<Vec<(String, String)>>;
    async fn user_agent(&self) -> Result<String>;
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力
/// - 不认识候选人 / 附件
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    value: Option<String>,
    /// 探测之后元素又消失了
    #[serde(default)]
    missing: bool,
}

impl ActionReply {
    /// 元素消失映射为 `NotFound`（可重试），其余失败为脚本错误
    fn check(self, selector: &DomSelector) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else if self.missing {
            Err(AutomationError::not_found(selector.to_string(), Duration::ZERO))
        } else {
            Err(AutomationError::Script(format!(
                "{}: {}",
                selector,
                self.error.unwrap_or_default()
            )))
        }
    }
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 对选中元素执行 `body`（其中 `el` 为元素），统一返回 {ok, error, value}
    async fn act_on(&self, selector: &DomSelector, body: &str) -> Result<ActionReply> {
        let js_code = format!(
            r#"
            (() => {{
                try {{
                    const el = {};
                    if (!el) {{
                        return {{ ok: false, missing: true }};
                    }}
                    {}
                }} catch (error) {{
                    return {{ ok: false, error: String(error && error.message || error) }};
                }}
            }})()
            "#,
            selector.element_expr(),
            body
        );
        let reply: ActionReply = self.eval_as(js_code).await?;
        reply.check(selector)
    }
}

#[async_trait]
impl WebSession for JsExecutor {
    async fn probe(&self, selector: &DomSelector, condition: DomCondition) -> Result<bool> {
        let check = match condition {
            DomCondition::Present => "true",
            DomCondition::Visible => "el.getClientRects().length > 0",
            DomCondition::Clickable => "el.getClientRects().length > 0 && !el.disabled",
        };
        let js_code = format!(
            "(() => {{ const el = {}; return !!el && ({}); }})()",
            selector.element_expr(),
            check
        );
        self.eval_as(js_code).await
    }

    async fn click(&self, selector: &DomSelector) -> Result<()> {
        self.act_on(
            selector,
            "el.scrollIntoView({ block: 'center' }); el.click(); return { ok: true };",
        )
        .await
        .map(|_| ())
    }

    async fn fill(&self, selector: &DomSelector, text: &str) -> Result<()> {
        // 通过原生 setter 赋值，受控输入框才能收到 input 事件
        let body = format!(
            r#"
            const proto = Object.getPrototypeOf(el);
            const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
            el.focus();
            setter.call(el, {});
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true }};
            "#,
            js_string(text)
        );
        self.act_on(selector, &body).await.map(|_| ())
    }

    async fn read_attribute(&self, selector: &DomSelector, name: &str) -> Result<Option<String>> {
        // 优先取 DOM 属性（href 会解析为绝对地址），否则取原始 attribute
        let body = format!(
            r#"
            const name = {};
            const prop = el[name];
            const value = typeof prop === 'string' ? prop : el.getAttribute(name);
            return {{ ok: true, value: value || null }};
            "#,
            js_string(name)
        );
        let reply = self.act_on(selector, &body).await?;
        Ok(reply.value)
    }

    async fn select_value(&self, selector: &DomSelector, value: &str) -> Result<()> {
        let body = format!(
            r#"
            el.value = {};
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true }};
            "#,
            js_string(value)
        );
        self.act_on(selector, &body).await.map(|_| ())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }

    async fn user_agent(&self) -> Result<String> {
        self.eval_as("navigator.userAgent").await
    }
}
