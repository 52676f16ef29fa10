use serde::{Deserialize, Serialize};

/// 高出勤阈值（含）
pub const HIGH_ATTENDANCE_THRESHOLD: f64 = 80.0;
/// 低出勤阈值（不含）
pub const LOW_ATTENDANCE_THRESHOLD: f64 = 75.0;

/// 学生档案
///
/// 所有字段都可能缺失；缺失（`None`）与零值是两回事。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub name: Option<String>,
    pub institution: Option<String>,
    pub academic_career: Option<String>,
    pub term: Option<String>,
    pub total_attendance_percent: Option<f64>,
    pub medical_attendance_percent: Option<f64>,
    pub overall_attendance_percent: Option<f64>,
}

impl StudentProfile {
    /// 用新抓取的档案覆盖当前档案，新档案中缺失的字段保留旧值
    pub fn merge_from(&mut self, update: &StudentProfile) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        take(&mut self.name, &update.name);
        take(&mut self.institution, &update.institution);
        take(&mut self.academic_career, &update.academic_career);
        take(&mut self.term, &update.term);
        take(
            &mut self.total_attendance_percent,
            &update.total_attendance_percent,
        );
        take(
            &mut self.medical_attendance_percent,
            &update.medical_attendance_percent,
        );
        take(
            &mut self.overall_attendance_percent,
            &update.overall_attendance_percent,
        );
    }
}

/// 单门课程的出勤记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub class_number: String,
    pub class_title: String,
    pub subject_catalog: String,
    pub academic_career: String,
    pub institution: String,
    pub attendance_percentage: f64,
}

/// 出勤统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub total_subjects: usize,
    pub high_attendance: usize,
    pub low_attendance: usize,
    pub average_attendance: f64,
}

impl AttendanceSummary {
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let total: f64 = records.iter().map(|r| r.attendance_percentage).sum();

        Self {
            total_subjects: records.len(),
            high_attendance: records
                .iter()
                .filter(|r| r.attendance_percentage >= HIGH_ATTENDANCE_THRESHOLD)
                .count(),
            low_attendance: records
                .iter()
                .filter(|r| r.attendance_percentage < LOW_ATTENDANCE_THRESHOLD)
                .count(),
            average_attendance: total / records.len() as f64,
        }
    }
}
