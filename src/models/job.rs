//! 抓取任务相关的数据结构

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::models::ExtractionReport;

/// 任务键：学生在门户上的登录学号
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn new(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobKey {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// 门户登录凭据
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// 凭据对应的任务键
    pub fn key(&self) -> JobKey {
        JobKey::new(self.username.as_str())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    NotStarted,
    Scraping,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// 一个学号对应的任务条目
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeJob {
    pub key: JobKey,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub message: Option<String>,
    pub error_kind: Option<FailureKind>,
    /// 完成时抽取有降级才有值
    pub degraded: Option<ExtractionReport>,
}

impl ScrapeJob {
    pub fn new(key: JobKey) -> Self {
        Self {
            key,
            status: JobStatus::NotStarted,
            progress: 0,
            message: None,
            error_kind: None,
            degraded: None,
        }
    }

    /// 进入新一轮抓取
    pub(crate) fn begin(&mut self) {
        self.status = JobStatus::Scraping;
        self.progress = 0;
        self.message = None;
        self.error_kind = None;
        self.degraded = None;
    }

    /// 运行中的进度只增不减
    pub(crate) fn advance(&mut self, progress: u8) {
        if self.status == JobStatus::Scraping {
            self.progress = self.progress.max(progress.min(100));
        }
    }

    /// 完成；没有降级的报告不保留
    pub(crate) fn complete(&mut self, report: Option<ExtractionReport>) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = None;
        self.error_kind = None;
        self.degraded = report.filter(ExtractionReport::is_degraded);
    }

    pub(crate) fn fail(&mut self, kind: Option<FailureKind>, message: String) {
        self.status = JobStatus::Error;
        self.message = Some(message);
        self.error_kind = kind;
        self.degraded = None;
    }

    /// 通用状态写入
    pub(crate) fn apply(&mut self, status: JobStatus, progress: u8, message: Option<String>) {
        match status {
            JobStatus::Scraping if self.status == JobStatus::Scraping => self.advance(progress),
            JobStatus::Scraping => {
                self.begin();
                self.progress = progress.min(100);
            }
            JobStatus::Completed => self.complete(None),
            JobStatus::Error => {
                self.fail(None, message.unwrap_or_default());
                self.progress = progress.min(100);
            }
            JobStatus::NotStarted => {
                self.status = JobStatus::NotStarted;
                self.progress = progress.min(100);
                self.message = message;
                self.error_kind = None;
                self.degraded = None;
            }
        }
    }

    pub fn report(&self) -> StatusReport {
        let progress = match self.status {
            JobStatus::Scraping | JobStatus::Completed => Some(self.progress),
            JobStatus::NotStarted | JobStatus::Error => None,
        };

        StatusReport {
            status: self.status,
            progress,
            message: self.message.clone(),
            error_code: self.error_kind,
            degraded: self.degraded.clone(),
        }
    }
}

/// 状态查询接口的返回值
///
/// 未知学号序列化为 `{"status":"not_started"}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<FailureKind>,
    /// 完成但报表不完整时的降级明细
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ExtractionReport>,
}

/// 门户驱动的状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Authenticating,
    Authenticated,
    NavigatingToReport,
    LocatingFrame,
    WaitingForTable,
    DocumentReady,
    Failed,
}

impl DriverState {
    /// 该状态对应的任务进度
    pub fn progress(self) -> Option<u8> {
        match self {
            DriverState::Idle | DriverState::Failed => None,
            DriverState::Authenticating => Some(10),
            DriverState::Authenticated => Some(25),
            DriverState::NavigatingToReport => Some(35),
            DriverState::LocatingFrame => Some(50),
            DriverState::WaitingForTable => Some(65),
            DriverState::DocumentReady => Some(75),
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Idle => "idle",
            DriverState::Authenticating => "authenticating",
            DriverState::Authenticated => "authenticated",
            DriverState::NavigatingToReport => "navigating_to_report",
            DriverState::LocatingFrame => "locating_frame",
            DriverState::WaitingForTable => "waiting_for_table",
            DriverState::DocumentReady => "document_ready",
            DriverState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_report() {
        let job = ScrapeJob::new(JobKey::new("BE23CS060"));
        let json = serde_json::to_value(job.report()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "not_started" }));
    }

    #[test]
    fn test_progress_never_moves_back() {
        let mut job = ScrapeJob::new(JobKey::new("BE23CS060"));
        job.begin();
        job.advance(50);
        job.advance(25);
        assert_eq!(job.progress, 50);

        job.apply(JobStatus::Scraping, 10, None);
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_completed_always_carries_full_progress() {
        let mut job = ScrapeJob::new(JobKey::new("BE23CS060"));
        job.apply(JobStatus::Scraping, 40, None);
        job.apply(JobStatus::Completed, 10, None);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(
            serde_json::to_value(job.report()).unwrap(),
            serde_json::json!({ "status": "completed", "progress": 100 })
        );
    }

    #[test]
    fn test_degraded_report_kept_until_next_run() {
        let mut job = ScrapeJob::new(JobKey::new("BE23CS060"));
        job.begin();
        job.complete(Some(ExtractionReport {
            table_found: true,
            skipped_rows: 1,
            ..Default::default()
        }));

        let json = serde_json::to_value(job.report()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["degraded"]["skipped_rows"], 1);
        assert_eq!(json["degraded"]["table_found"], true);

        job.begin();
        assert_eq!(job.report().degraded, None);

        job.complete(Some(ExtractionReport {
            table_found: true,
            ..Default::default()
        }));
        assert_eq!(
            serde_json::to_value(job.report()).unwrap(),
            serde_json::json!({ "status": "completed", "progress": 100 })
        );
    }

    #[test]
    fn test_error_keeps_message_verbatim() {
        let mut job = ScrapeJob::new(JobKey::new("BE23CS060"));
        job.begin();
        job.apply(JobStatus::Error, 0, Some("Failed to scrape data".to_string()));

        let report = job.report();
        assert_eq!(report.status, JobStatus::Error);
        assert_eq!(report.message.as_deref(), Some("Failed to scrape data"));
        assert_eq!(report.progress, None);
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let credential = Credential::new("BE23CS060", "212004");
        let printed = format!("{:?}", credential);
        assert!(printed.contains("BE23CS060"));
        assert!(!printed.contains("212004"));
    }
}
