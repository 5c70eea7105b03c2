/// 拠点对应的收件人信息
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    pub address: String,
    pub cc: String,
    /// 担当者
    pub display_name: String,
}
