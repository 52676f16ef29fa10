//! 抓取流程 - 流程层
//!
//! 核心职责：定义"一个学生"的一次抓取
//!
//! 流程顺序：
//! 1. 确认学生已登记
//! 2. 驱动门户拿到报表（进度随驱动状态推进）
//! 3. 抽取 → 写调试快照
//! 4. 档案和出勤记录在一次存储操作里写入
//!
//! 终态（完成/失败）由调用方写入。

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ScrapeError;
use crate::models::{Credential, DriverState, JobKey};
use crate::services::{DriverObserver, ExtractionReport, Extractor, ReportFetcher, SnapshotWriter};
use crate::storage::AttendanceStore;
use crate::workflow::JobStatusStore;

/// 抽取完成后的进度
pub const PROGRESS_EXTRACTED: u8 = 85;

/// 一次成功抓取的结果
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub records: usize,
    pub report: ExtractionReport,
}

/// 把驱动状态转换为任务进度
struct ProgressObserver<'a> {
    key: &'a JobKey,
    jobs: &'a JobStatusStore,
}

impl DriverObserver for ProgressObserver<'_> {
    fn on_state(&self, state: DriverState) {
        if let Some(progress) = state.progress() {
            self.jobs.advance(self.key, progress);
        }
    }
}

/// 单个学生的抓取流程
///
/// - 不持有浏览器，浏览器会话由 `ReportFetcher` 在一次调用内创建和释放
/// - 不写终态
pub struct ScrapeFlow {
    fetcher: Arc<dyn ReportFetcher>,
    extractor: Extractor,
    store: Arc<dyn AttendanceStore>,
    jobs: JobStatusStore,
    snapshots: SnapshotWriter,
}

impl ScrapeFlow {
    pub fn new(
        fetcher: Arc<dyn ReportFetcher>,
        extractor: Extractor,
        store: Arc<dyn AttendanceStore>,
        jobs: JobStatusStore,
        snapshots: SnapshotWriter,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            store,
            jobs,
            snapshots,
        }
    }

    pub fn jobs(&self) -> &JobStatusStore {
        &self.jobs
    }

    pub async fn run(&self, key: &JobKey, credential: &Credential) -> Result<ScrapeOutcome, ScrapeError> {
        if self.store.get_profile(key).await?.is_none() {
            return Err(ScrapeError::StudentNotFound(key.clone()));
        }

        info!("[学号 {}] 🌐 开始抓取", key);
        let observer = ProgressObserver {
            key,
            jobs: &self.jobs,
        };
        let document = self.fetcher.fetch_report(credential, &observer).await?;

        // scraper 的 Html 不是 Send，解析和抽取在同一个同步调用里完成
        let extraction = self.extractor.extract(&document);
        self.jobs.advance(key, PROGRESS_EXTRACTED);

        if extraction.report.is_degraded() {
            warn!("[学号 {}] ⚠️ 报表不完整: {:?}", key, extraction.report);
        }
        self.snapshots.write(&document).await;

        self.store
            .save_scrape(key, &extraction.profile, &extraction.records)
            .await?;
        info!(
            "[学号 {}] ✓ 已保存 {} 条出勤记录",
            key,
            extraction.records.len()
        );

        Ok(ScrapeOutcome {
            records: extraction.records.len(),
            report: extraction.report,
        })
    }
}
