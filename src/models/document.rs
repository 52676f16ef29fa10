use crate::models::JobKey;

/// 报表所在 frame 的选取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameChoice {
    /// 按配置的名称/ID 命中
    Named,
    /// 没找到指定 frame，退回页面上的第一个 iframe
    FirstAvailable,
}

/// 驱动产出的原始报表文档，只被抽取器消费一次
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub key: JobKey,
    pub html: String,
    pub frame: FrameChoice,
}

impl RawDocument {
    pub fn new(key: JobKey, html: impl Into<String>, frame: FrameChoice) -> Self {
        Self {
            key,
            html: html.into(),
            frame,
        }
    }
}
