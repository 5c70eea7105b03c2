//! 基础设施层
//!
//! 持有稀缺资源（浏览器页面、屏幕、键鼠、HTTP 客户端），只暴露能力。

pub mod desktop;
pub mod fetcher;
pub mod js_executor;
pub mod template_match;

pub use desktop::{Desktop, MouseButton, Point, Screen, SystemDesktop};
pub use fetcher::{DocumentFetcher, HttpFetcher, SessionCredentials};
pub use js_executor::{DomCondition, DomSelector, JsExecutor, WebSession};
pub use template_match::{find_template, MatchBox, MatchOptions};
