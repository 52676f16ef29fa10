//! 任务状态表 - 流程层
//!
//! 每个学号一条任务记录，被抓取任务写、被轮询方读。
//! 所有读改写都在 dashmap 的分片锁内完成，同一学号的状态转换是串行的。

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{ScrapeError, TriggerError};
use crate::models::{ExtractionReport, JobKey, JobStatus, ScrapeJob, StatusReport};

/// 任务状态表句柄，克隆后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct JobStatusStore {
    jobs: Arc<DashMap<JobKey, ScrapeJob>>,
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取任务；未知学号会登记一条 `NotStarted` 记录
    pub fn get(&self, key: &JobKey) -> ScrapeJob {
        if let Some(job) = self.jobs.get(key) {
            return job.clone();
        }
        self.jobs
            .entry(key.clone())
            .or_insert_with(|| ScrapeJob::new(key.clone()))
            .clone()
    }

    /// 通用状态写入
    pub fn set(&self, key: &JobKey, status: JobStatus, progress: u8, message: Option<String>) {
        self.with_job(key, |job| job.apply(status, progress, message));
    }

    /// 原子地开始一轮抓取；同一学号已在运行时拒绝
    pub fn try_begin(&self, key: &JobKey) -> Result<(), TriggerError> {
        match self.jobs.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status == JobStatus::Scraping {
                    return Err(TriggerError::AlreadyRunning(key.clone()));
                }
                entry.get_mut().begin();
            }
            Entry::Vacant(entry) => {
                let mut job = ScrapeJob::new(key.clone());
                job.begin();
                entry.insert(job);
            }
        }
        Ok(())
    }

    pub fn advance(&self, key: &JobKey, progress: u8) {
        self.with_job(key, |job| job.advance(progress));
    }

    /// 标记完成；降级的抽取报告随状态保存
    pub fn complete(&self, key: &JobKey, report: Option<ExtractionReport>) {
        self.with_job(key, |job| job.complete(report));
    }

    /// 记录失败，错误码随消息一起保存
    pub fn fail(&self, key: &JobKey, error: &ScrapeError) {
        let message = error.to_string();
        self.with_job(key, |job| job.fail(Some(error.kind()), message));
    }

    pub fn is_running(&self, key: &JobKey) -> bool {
        self.jobs
            .get(key)
            .map(|job| job.status == JobStatus::Scraping)
            .unwrap_or(false)
    }

    /// 状态查询
    pub fn report(&self, key: &JobKey) -> StatusReport {
        match self.jobs.get(key) {
            Some(job) => job.report(),
            None => ScrapeJob::new(key.clone()).report(),
        }
    }

    fn with_job(&self, key: &JobKey, update: impl FnOnce(&mut ScrapeJob)) {
        let mut job = self
            .jobs
            .entry(key.clone())
            .or_insert_with(|| ScrapeJob::new(key.clone()));
        update(&mut job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::DriverState;
    use std::time::Duration;

    #[test]
    fn test_unknown_key_is_not_started() {
        let store = JobStatusStore::new();
        let key = JobKey::new("BE23CS060");

        assert_eq!(store.report(&key).status, JobStatus::NotStarted);
        let job = store.get(&key);
        assert_eq!(job.status, JobStatus::NotStarted);
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_try_begin_rejects_running_key() {
        let store = JobStatusStore::new();
        let key = JobKey::new("BE23CS060");

        store.try_begin(&key).unwrap();
        assert_eq!(
            store.try_begin(&key),
            Err(TriggerError::AlreadyRunning(key.clone()))
        );

        store.complete(&key, None);
        assert!(store.try_begin(&key).is_ok());
        assert_eq!(store.get(&key).progress, 0);
    }

    #[test]
    fn test_concurrent_try_begin_admits_one() {
        let store = JobStatusStore::new();
        let key = JobKey::new("BE23CS060");

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.try_begin(&key).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_failure_records_code_and_message() {
        let store = JobStatusStore::new();
        let key = JobKey::new("BE23CS060");
        store.try_begin(&key).unwrap();
        store.advance(&key, 50);

        let error = ScrapeError::NavigationTimeout {
            step: DriverState::WaitingForTable,
            waited: Duration::from_secs(30),
        };
        store.fail(&key, &error);

        let job = store.get(&key);
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error_kind, Some(FailureKind::NavigationTimeout));
        assert_eq!(job.message.as_deref(), Some(error.to_string().as_str()));

        let json = serde_json::to_value(store.report(&key)).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_code"], "navigation_timeout");
    }

    #[test]
    fn test_set_follows_job_rules() {
        let store = JobStatusStore::new();
        let key = JobKey::new("BE23CS060");

        store.set(&key, JobStatus::Scraping, 40, None);
        store.set(&key, JobStatus::Scraping, 20, None);
        assert_eq!(store.get(&key).progress, 40);

        store.set(&key, JobStatus::Completed, 0, Some("ignored".to_string()));
        let job = store.get(&key);
        assert_eq!(job.progress, 100);
        assert_eq!(job.message, None);
    }
}
