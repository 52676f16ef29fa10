//! # Attendance Scraper
//!
//! 登录学校门户、抓取学生出勤报表并保存的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `browser/` - 浏览器启动/连接，`BrowserSession` 保证会话在任何路径上释放
//! - `infrastructure/` - `FrameExecutor` 持有页面，提供 eval() 和有界等待能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个学生
//! - `PortalDriver` - 登录门户、定位报表 frame、拿到报表 HTML
//! - `Extractor` - 从 HTML 抽取档案和出勤记录
//! - `SnapshotWriter` - 写调试快照能力
//! - `storage/` - `AttendanceStore`（sqlite / 内存）
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个学生"的完整抓取流程
//! - `JobStatusStore` - 任务状态表（dashmap）
//! - `ScrapeFlow` - 流程编排（驱动 → 抽取 → 快照 → 保存）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/scrape_service` - 任务受理、互斥与并发上限
//! - `orchestrator/batch_processor` - 批量抓取、CSV 导出
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod storage;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{FailureKind, PersistenceError, ScrapeError, ScrapeResult, TriggerError};
pub use infrastructure::FrameExecutor;
pub use models::{AttendanceRecord, Credential, JobKey, JobStatus, StatusReport, StudentProfile};
pub use orchestrator::{App, BatchStats, ScrapeService};
pub use services::{Extractor, PortalDriver, ReportFetcher};
pub use storage::{AttendanceStore, MemoryStore, SqliteStore};
pub use workflow::{JobStatusStore, ScrapeFlow};
