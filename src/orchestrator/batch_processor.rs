//! 批量抓取处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量抓取和资源装配。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：连接数据库、创建门户驱动、装配抓取服务
//! 2. **批量加载**：读取账号清单（`Vec<Credential>`）并登记学生
//! 3. **分批处理**：每批数量不超过浏览器会话上限，一批完成后再开始下一批
//! 4. **结果导出**：把所有成功抓取的记录写入 CSV
//! 5. **全局统计**：汇总所有账号的处理结果

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{load_accounts, AttendanceRecord, AttendanceSummary, Credential, JobKey, JobStatus};
use crate::orchestrator::ScrapeService;
use crate::services::{csv_export, Extractor, PortalDriver, ReportFetcher, SnapshotWriter};
use crate::storage::{AttendanceStore, SqliteStore};
use crate::utils::logging::{
    log_accounts_loaded, log_batch_complete, log_batch_start, log_startup, print_final_stats,
};
use crate::workflow::{JobStatusStore, ScrapeFlow};

/// 批量抓取统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// 成功账号的出勤记录总数
    pub records: usize,
    pub csv_path: Option<PathBuf>,
}

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<dyn AttendanceStore>,
    service: ScrapeService,
}

impl App {
    /// 初始化应用：sqlite 存储 + 真实门户驱动
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let store = SqliteStore::connect(&config.database_url)
            .await
            .with_context(|| format!("无法打开数据库: {}", config.database_url))?;
        let fetcher = Arc::new(PortalDriver::new(&config));

        Ok(Self::from_parts(config, fetcher, Arc::new(store)))
    }

    /// 用给定的报表来源和存储装配应用
    pub fn from_parts(config: Config, fetcher: Arc<dyn ReportFetcher>, store: Arc<dyn AttendanceStore>) -> Self {
        let flow = ScrapeFlow::new(
            fetcher,
            Extractor::new(&config.extractor),
            store.clone(),
            JobStatusStore::new(),
            SnapshotWriter::new(config.snapshot_dir.clone()),
        );
        let service = ScrapeService::new(flow, &config.jobs);

        Self {
            config,
            store,
            service,
        }
    }

    pub fn service(&self) -> &ScrapeService {
        &self.service
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    /// 运行批量模式：账号清单来自配置
    pub async fn run(&self) -> Result<BatchStats> {
        info!("\n📁 正在读取账号清单...");
        let accounts = load_accounts(Path::new(&self.config.credentials_file)).await?;

        if accounts.is_empty() {
            warn!("⚠️ 账号清单为空，程序结束");
            return Ok(BatchStats::default());
        }

        self.run_accounts(accounts).await
    }

    /// 批量抓取给定账号并导出 CSV
    pub async fn run_accounts(&self, accounts: Vec<Credential>) -> Result<BatchStats> {
        let batch_size = self
            .config
            .jobs
            .max_concurrent_sessions
            .min(self.config.jobs.max_pending_jobs)
            .max(1);
        let total = accounts.len();
        log_accounts_loaded(total, batch_size);

        let mut stats = BatchStats {
            total,
            ..Default::default()
        };
        let mut exported: Vec<(JobKey, Vec<AttendanceRecord>)> = Vec::new();
        let total_batches = total.div_ceil(batch_size);

        for (batch_idx, batch) in accounts.chunks(batch_size).enumerate() {
            let batch_start = batch_idx * batch_size;
            log_batch_start(batch_idx + 1, total_batches, batch_start + 1, batch_start + batch.len(), total);

            let completed = self.process_batch(batch).await?;
            let batch_success = completed.len();

            for key in completed {
                let records = self.store.attendance(&key).await?;
                stats.records += records.len();
                exported.push((key, records));
            }

            stats.success += batch_success;
            stats.failed += batch.len() - batch_success;
            log_batch_complete(batch_idx + 1, batch_success, batch.len());
        }

        if stats.records > 0 {
            let path = PathBuf::from(&self.config.output_csv);
            csv_export::export(&path, &exported).await?;
            stats.csv_path = Some(path);
        } else {
            warn!("⚠️ 没有抓取到任何记录，不导出 CSV");
        }

        print_final_stats(
            stats.success,
            stats.failed,
            stats.total,
            stats.records,
            stats.csv_path.as_ref().and_then(|p| p.to_str()),
        );

        Ok(stats)
    }

    /// 处理单个批次，返回成功完成的学号
    async fn process_batch(&self, batch: &[Credential]) -> Result<Vec<JobKey>> {
        let mut handles = Vec::new();

        for credential in batch {
            let key = credential.key();
            if self.store.register_student(&key).await? {
                info!("[学号 {}] 已登记新学生", key);
            }

            match self.service.trigger_scrape(key.clone(), credential.clone()) {
                Ok(handle) => handles.push((key, handle)),
                Err(e) => warn!("[学号 {}] ⚠️ 未能提交任务: {}", key, e),
            }
        }

        let mut completed = Vec::new();
        for (key, handle) in handles {
            match handle.await {
                Ok(JobStatus::Completed) => completed.push(key),
                Ok(_) => {
                    let report = self.service.status(&key);
                    warn!(
                        "[学号 {}] ✗ 未能抓取: {}",
                        key,
                        report.message.unwrap_or_default()
                    );
                }
                Err(e) => error!("[学号 {}] 任务执行失败: {}", key, e),
            }
        }

        Ok(completed)
    }

    /// 学生的档案、出勤记录、统计和当前任务状态
    pub async fn show_student(&self, key: &JobKey) -> Result<JsonValue> {
        let profile = self
            .store
            .get_profile(key)
            .await?
            .ok_or_else(|| anyhow!("学生 {} 不存在", key))?;
        let records = self.store.attendance(key).await?;
        let summary = AttendanceSummary::from_records(&records);

        Ok(json!({
            "student_id": key,
            "profile": profile,
            "records": records,
            "summary": summary,
            "job": self.service.status(key),
        }))
    }
}
