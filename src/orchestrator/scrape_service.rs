//! 抓取任务调度 - 编排层
//!
//! - 提交即返回，任务在后台运行，结果通过状态表轮询
//! - 同一学号同时只允许一个任务
//! - 浏览器会话数由 Semaphore 限制，排队任务数有上限
//! - 任务无论以何种方式结束，状态表里都会留下终态

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::JobsConfig;
use crate::error::{ScrapeError, TriggerError};
use crate::models::{Credential, JobKey, JobStatus, StatusReport};
use crate::workflow::{JobStatusStore, ScrapeFlow};

struct Inner {
    flow: ScrapeFlow,
    sessions: Arc<Semaphore>,
    pending: AtomicUsize,
    max_pending: usize,
}

/// 抓取服务句柄，克隆后共享同一个任务池
#[derive(Clone)]
pub struct ScrapeService {
    inner: Arc<Inner>,
}

/// 占用一个排队名额，析构时归还
struct PendingSlot {
    inner: Arc<Inner>,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.inner.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 任务在写入终态前结束（panic、被丢弃）时，把状态改为失败
struct RunGuard {
    jobs: JobStatusStore,
    key: JobKey,
    armed: bool,
}

impl RunGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.armed && self.jobs.is_running(&self.key) {
            warn!("[学号 {}] 任务在完成前中断", self.key);
            self.jobs.fail(
                &self.key,
                &ScrapeError::TaskAborted("任务在写入结果前结束".to_string()),
            );
        }
    }
}

impl ScrapeService {
    pub fn new(flow: ScrapeFlow, config: &JobsConfig) -> Self {
        let sessions = config.max_concurrent_sessions.max(1);
        let max_pending = config.max_pending_jobs.max(1);
        info!("📊 浏览器会话上限: {}, 排队上限: {}", sessions, max_pending);

        Self {
            inner: Arc::new(Inner {
                flow,
                sessions: Arc::new(Semaphore::new(sessions)),
                pending: AtomicUsize::new(0),
                max_pending,
            }),
        }
    }

    pub fn jobs(&self) -> &JobStatusStore {
        self.inner.flow.jobs()
    }

    pub fn status(&self, key: &JobKey) -> StatusReport {
        self.jobs().report(key)
    }

    /// 提交抓取任务，立即返回
    ///
    /// 返回的句柄在任务结束时给出终态，调用方也可以只轮询 [`Self::status`]
    pub fn trigger_scrape(&self, key: JobKey, credential: Credential) -> Result<JoinHandle<JobStatus>, TriggerError> {
        let slot = self.admit(&key)?;
        info!("[学号 {}] 📥 任务已受理", key);

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            execute(inner, slot, key, credential).await
        }))
    }

    /// 与 [`Self::trigger_scrape`] 相同的流程，在当前任务里等待结果
    pub async fn run(&self, key: JobKey, credential: Credential) -> Result<JobStatus, TriggerError> {
        let slot = self.admit(&key)?;
        Ok(execute(self.inner.clone(), slot, key, credential).await)
    }

    /// 占排队名额并把学号标记为运行中
    fn admit(&self, key: &JobKey) -> Result<PendingSlot, TriggerError> {
        let limit = self.inner.max_pending;
        self.inner
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < limit {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .map_err(|_| TriggerError::QueueFull { limit })?;
        let slot = PendingSlot {
            inner: self.inner.clone(),
        };

        self.jobs().try_begin(key)?;
        Ok(slot)
    }
}

async fn execute(inner: Arc<Inner>, slot: PendingSlot, key: JobKey, credential: Credential) -> JobStatus {
    let _slot = slot;
    let jobs = inner.flow.jobs().clone();
    let guard = RunGuard {
        jobs: jobs.clone(),
        key: key.clone(),
        armed: true,
    };

    let _permit = match inner.sessions.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            error!("[学号 {}] 无法获取浏览器会话: {}", key, e);
            jobs.fail(&key, &ScrapeError::TaskAborted(e.to_string()));
            guard.disarm();
            return JobStatus::Error;
        }
    };

    let status = match inner.flow.run(&key, &credential).await {
        Ok(outcome) => {
            info!("[学号 {}] ✅ 抓取完成 ({} 条记录)", key, outcome.records);
            jobs.complete(&key, Some(outcome.report));
            JobStatus::Completed
        }
        Err(e) => {
            error!("[学号 {}] ❌ 抓取失败: {}", key, e);
            jobs.fail(&key, &e);
            JobStatus::Error
        }
    };

    guard.disarm();
    status
}
