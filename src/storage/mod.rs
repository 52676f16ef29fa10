//! 持久化适配层
//!
//! 抓取流程只依赖 [`AttendanceStore`]；生产环境用 sqlite，测试用内存实现。

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::{AttendanceRecord, JobKey, StudentProfile};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// 登记学生；已存在时返回 `false`
    async fn register_student(&self, key: &JobKey) -> Result<bool, PersistenceError>;

    /// 未登记的学生返回 `None`
    async fn get_profile(&self, key: &JobKey) -> Result<Option<StudentProfile>, PersistenceError>;

    /// 合并更新档案：`update` 中为 `None` 的字段保留原值
    async fn update_profile(&self, key: &JobKey, update: &StudentProfile) -> Result<(), PersistenceError>;

    /// 整体替换出勤记录，读者只会看到替换前或替换后的完整集合
    async fn replace_attendance(&self, key: &JobKey, records: &[AttendanceRecord]) -> Result<(), PersistenceError>;

    /// 一次抓取的结果：合并档案并整体替换出勤记录
    ///
    /// 两步要么都生效，要么都不生效
    async fn save_scrape(
        &self,
        key: &JobKey,
        profile: &StudentProfile,
        records: &[AttendanceRecord],
    ) -> Result<(), PersistenceError>;

    /// 按写入顺序返回出勤记录
    async fn attendance(&self, key: &JobKey) -> Result<Vec<AttendanceRecord>, PersistenceError>;
}
