//! 目标元素
//!
//! 流程中要操作的每个元素都是一个具名目标，启动时统一解析为
//! DOM 选择器或图像模板，不在流程中出现字符串查表。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AutomationError, Result};
use crate::infrastructure::{DomCondition, DomSelector, MatchBox, Point};

/// 流程中用到的全部目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedTarget {
    LoginEntry,
    AccountInput,
    PasswordInput,
    LoginSubmit,
    EntriesNav,
    StatusFilter,
    SearchButton,
    ExportButton,
    SearchBox,
    ResultRow,
    ResultCell,
    ResumeLink,
    OverlayClose,
    StatusSelect,
    /// 保存 / 打印对话框中的保存按钮（图像）
    PrintSaveButton,
}

impl NamedTarget {
    pub const ALL: [NamedTarget; 15] = [
        NamedTarget::LoginEntry,
        NamedTarget::AccountInput,
        NamedTarget::PasswordInput,
        NamedTarget::LoginSubmit,
        NamedTarget::EntriesNav,
        NamedTarget::StatusFilter,
        NamedTarget::SearchButton,
        NamedTarget::ExportButton,
        NamedTarget::SearchBox,
        NamedTarget::ResultRow,
        NamedTarget::ResultCell,
        NamedTarget::ResumeLink,
        NamedTarget::OverlayClose,
        NamedTarget::StatusSelect,
        NamedTarget::PrintSaveButton,
    ];

    /// 配置文件中使用的名字
    pub fn key(&self) -> &'static str {
        match self {
            NamedTarget::LoginEntry => "login_entry",
            NamedTarget::AccountInput => "account_input",
            NamedTarget::PasswordInput => "password_input",
            NamedTarget::LoginSubmit => "login_submit",
            NamedTarget::EntriesNav => "entries_nav",
            NamedTarget::StatusFilter => "status_filter",
            NamedTarget::SearchButton => "search_button",
            NamedTarget::ExportButton => "export_button",
            NamedTarget::SearchBox => "search_box",
            NamedTarget::ResultRow => "result_row",
            NamedTarget::ResultCell => "result_cell",
            NamedTarget::ResumeLink => "resume_link",
            NamedTarget::OverlayClose => "overlay_close",
            NamedTarget::StatusSelect => "status_select",
            NamedTarget::PrintSaveButton => "print_save_button",
        }
    }

    fn default_locate(&self) -> DefaultLocate {
        use DefaultLocate::*;
        use DomCondition::*;
        match self {
            NamedTarget::LoginEntry => {
                XPath("//*[@id='__next']/div/main/div[2]/div[2]/a", Clickable)
            }
            NamedTarget::AccountInput => Css("#account", Present),
            NamedTarget::PasswordInput => Css("#password", Present),
            NamedTarget::LoginSubmit => {
                XPath("//*[@id='mainContent']/div/div[2]/div[4]/input", Clickable)
            }
            NamedTarget::EntriesNav => {
                XPath("//*[@id='__next']/header/div/nav/ul/li[3]/a", Clickable)
            }
            NamedTarget::StatusFilter => {
                XPath("//select[@name='selectionStatus' and @data-select='selectBox']", Clickable)
            }
            NamedTarget::SearchButton => {
                XPath("//*[@id='applicationList']/form/div/button", Clickable)
            }
            NamedTarget::ExportButton => {
                XPath("//button[@data-la='entries_download_btn_click']", Present)
            }
            NamedTarget::SearchBox => Css("[name='searchWord']", Present),
            NamedTarget::ResultRow => Css("table tbody tr:first-child", Clickable),
            NamedTarget::ResultCell => Css("table tbody tr:first-child td:first-child", Clickable),
            NamedTarget::ResumeLink => {
                XPath("//a[@data-la='entry_detail_resume_btn_click']", Present)
            }
            NamedTarget::OverlayClose => {
                XPath("//img[@data-la='overlay_entry_detail_close_btn_click']", Clickable)
            }
            NamedTarget::StatusSelect => {
                XPath("(//select[@data-select='selectBoxTable'])[1]", Clickable)
            }
            NamedTarget::PrintSaveButton => Image("print_save_button.png", ClickOffset::Center),
        }
    }
}

enum DefaultLocate {
    Css(&'static str, DomCondition),
    XPath(&'static str, DomCondition),
    Image(&'static str, ClickOffset),
}

/// 图像目标的点击位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOffset {
    Center,
    Left,
    Right,
    Top,
}

impl ClickOffset {
    /// 根据匹配框和截图原点计算屏幕坐标
    pub fn point(&self, found: &MatchBox, origin: (i32, i32)) -> Point {
        let x = origin.0 as f64 + found.x as f64;
        let y = origin.1 as f64 + found.y as f64;
        let w = found.width as f64;
        let h = found.height as f64;
        let (dx, dy) = match self {
            ClickOffset::Center => (w * 0.5, h * 0.5),
            ClickOffset::Left => (w * 0.2, h * 0.5),
            ClickOffset::Right => (w * 0.8, h * 0.5),
            ClickOffset::Top => (w * 0.5, h * 0.2),
        };
        Point::new(x + dx, y + dy)
    }
}

#[derive(Debug, Clone)]
pub struct DomTarget {
    pub selector: DomSelector,
    pub condition: DomCondition,
}

#[derive(Debug, Clone)]
pub struct ImageTarget {
    pub template: Arc<RgbaImage>,
    pub confidence: f32,
    pub grayscale: bool,
    pub offset: ClickOffset,
}

#[derive(Debug, Clone)]
pub enum Locate {
    Dom(DomTarget),
    Image(ImageTarget),
}

/// 目标能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Locatable,
    Clickable,
    Readable,
}

/// 一个可定位的目标
#[derive(Debug, Clone)]
pub struct Target {
    pub name: NamedTarget,
    pub locate: Locate,
}

impl Target {
    pub fn dom(name: NamedTarget, selector: DomSelector, condition: DomCondition) -> Self {
        Self {
            name,
            locate: Locate::Dom(DomTarget {
                selector,
                condition,
            }),
        }
    }

    pub fn image(name: NamedTarget, image: ImageTarget) -> Self {
        Self {
            name,
            locate: Locate::Image(image),
        }
    }

    /// 图像目标只能定位和点击，不能读取 / 输入
    pub fn supports(&self, capability: Capability) -> bool {
        match self.locate {
            Locate::Dom(_) => true,
            Locate::Image(_) => capability != Capability::Readable,
        }
    }

    pub fn label(&self) -> &'static str {
        self.name.key()
    }
}

/// 启动时解析好的目标集合
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: HashMap<NamedTarget, Target>,
}

impl TargetSet {
    /// 仅包含默认 DOM 目标（图像目标需要模板文件）
    pub fn dom_defaults() -> Self {
        let mut set = Self::default();
        for name in NamedTarget::ALL {
            match name.default_locate() {
                DefaultLocate::Css(css, condition) => {
                    set.insert(Target::dom(name, DomSelector::css(css), condition))
                }
                DefaultLocate::XPath(xpath, condition) => {
                    set.insert(Target::dom(name, DomSelector::xpath(xpath), condition))
                }
                DefaultLocate::Image(..) => {}
            }
        }
        set
    }

    /// 默认目标 + 配置覆盖 + 模板目录中的图像
    pub fn resolve(config: &Config) -> Result<Self> {
        let mut set = Self::dom_defaults();

        for (key, spec) in &config.target_overrides {
            let name = NamedTarget::ALL
                .into_iter()
                .find(|n| n.key() == key.as_str())
                .ok_or_else(|| AutomationError::Config(format!("未知的目标名: {}", key)))?;
            let selector = parse_selector(spec)?;
            let condition = match set.targets.get(&name).map(|t| &t.locate) {
                Some(Locate::Dom(dom)) => dom.condition,
                _ => DomCondition::Clickable,
            };
            debug!("目标 {} 使用自定义选择器 {}", key, selector);
            set.insert(Target::dom(name, selector, condition));
        }

        let template_dir = config.template_dir();
        for name in NamedTarget::ALL {
            if set.targets.contains_key(&name) {
                continue;
            }
            if let DefaultLocate::Image(file, offset) = name.default_locate() {
                match load_template(&template_dir.join(file)) {
                    Ok(template) => set.insert(Target::image(
                        name,
                        ImageTarget {
                            template: Arc::new(template),
                            confidence: config.image_confidence,
                            grayscale: config.image_grayscale,
                            offset,
                        },
                    )),
                    Err(e) => warn!("⚠️ 图像目标 {} 不可用: {}", name.key(), e),
                }
            }
        }

        Ok(set)
    }

    pub fn insert(&mut self, target: Target) {
        self.targets.insert(target.name, target);
    }

    pub fn get(&self, name: NamedTarget) -> Option<&Target> {
        self.targets.get(&name)
    }

    pub fn require(&self, name: NamedTarget) -> Result<&Target> {
        self.get(name)
            .ok_or_else(|| AutomationError::Config(format!("目标未配置: {}", name.key())))
    }
}

fn parse_selector(spec: &str) -> Result<DomSelector> {
    if let Some(css) = spec.strip_prefix("css:") {
        Ok(DomSelector::css(css.trim()))
    } else if let Some(xpath) = spec.strip_prefix("xpath:") {
        Ok(DomSelector::xpath(xpath.trim()))
    } else {
        Err(AutomationError::Config(format!(
            "选择器需以 css: 或 xpath: 开头: {}",
            spec
        )))
    }
}

fn load_template(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_defaults_cover_every_dom_target() {
        let set = TargetSet::dom_defaults();
        for name in NamedTarget::ALL {
            let expected = name != NamedTarget::PrintSaveButton;
            assert_eq!(set.get(name).is_some(), expected, "{}", name.key());
        }
    }

    #[test]
    fn test_resolve_applies_overrides_and_skips_missing_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.template_folder = dir.path().display().to_string();
        config
            .target_overrides
            .insert("search_box".into(), "css:input#keyword".into());

        let set = TargetSet::resolve(&config).unwrap();
        match &set.require(NamedTarget::SearchBox).unwrap().locate {
            Locate::Dom(dom) => {
                assert_eq!(dom.selector, DomSelector::css("input#keyword"));
                assert_eq!(dom.condition, DomCondition::Present);
            }
            Locate::Image(_) => panic!("应为 DOM 目标"),
        }
        assert!(set.get(NamedTarget::PrintSaveButton).is_none());
    }

    #[test]
    fn test_resolve_loads_image_template() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::new(12, 12)
            .save(dir.path().join("print_save_button.png"))
            .unwrap();
        let mut config = Config::default();
        config.template_folder = dir.path().display().to_string();

        let set = TargetSet::resolve(&config).unwrap();
        let target = set.require(NamedTarget::PrintSaveButton).unwrap();
        assert!(target.supports(Capability::Clickable));
        assert!(!target.supports(Capability::Readable));
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let mut config = Config::default();
        config
            .target_overrides
            .insert("nope".into(), "css:div".into());
        assert!(TargetSet::resolve(&config).is_err());
    }

    #[test]
    fn test_click_offsets() {
        let found = MatchBox {
            x: 100,
            y: 50,
            width: 40,
            height: 20,
            score: 1.0,
        };
        assert_eq!(ClickOffset::Center.point(&found, (0, 0)), Point::new(120.0, 60.0));
        assert_eq!(ClickOffset::Left.point(&found, (0, 0)), Point::new(108.0, 60.0));
        assert_eq!(ClickOffset::Right.point(&found, (0, 0)), Point::new(132.0, 60.0));
        assert_eq!(ClickOffset::Top.point(&found, (10, 5)), Point::new(130.0, 59.0));
    }
}
