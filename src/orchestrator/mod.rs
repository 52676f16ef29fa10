//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `scrape_service` - 抓取任务调度
//! - 受理抓取请求，立即返回
//! - 同一学号互斥、排队上限、浏览器会话上限（Semaphore）
//! - 保证每个任务都留下终态
//!
//! ### `batch_processor` - 批量抓取处理器
//! - 装配存储、门户驱动和抓取服务
//! - 读取账号清单，分批提交
//! - 导出 CSV，输出全局统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Credential>)
//!     ↓
//! scrape_service (调度单个任务)
//!     ↓
//! workflow::ScrapeFlow (处理单个学生)
//!     ↓
//! services (能力层：portal_driver / extractor / snapshot)
//!     ↓
//! infrastructure (基础设施：FrameExecutor)
//! ```

pub mod batch_processor;
pub mod scrape_service;

pub use batch_processor::{App, BatchStats};
pub use scrape_service::ScrapeService;
