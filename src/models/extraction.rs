//! 抽取降级信息

use serde::Serialize;

/// 档案字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Institution,
    AcademicCareer,
    Term,
    TotalAttendancePercent,
    MedicalAttendancePercent,
    OverallAttendancePercent,
}

/// 抽取过程中的降级信息
///
/// 抓取完成时随任务状态一起保存，状态查询里以 `degraded` 字段返回
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionReport {
    /// 页面上找不到的档案字段
    pub missing_fields: Vec<ProfileField>,
    /// 存在但无法解析、已按 0 处理的数值字段
    pub defaulted_fields: Vec<ProfileField>,
    pub table_found: bool,
    /// 单元格不足被跳过的行
    pub skipped_rows: usize,
    /// 出勤百分比无法解析、已按 0 处理的行
    pub defaulted_percentages: usize,
}

impl ExtractionReport {
    pub fn is_degraded(&self) -> bool {
        !self.missing_fields.is_empty()
            || !self.defaulted_fields.is_empty()
            || !self.table_found
            || self.skipped_rows > 0
            || self.defaulted_percentages > 0
    }
}
