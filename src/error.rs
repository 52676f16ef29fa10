//! 错误类型
//!
//! 按故障分类划分：认证失败、导航超时、元素缺失、浏览器传输、持久化。
//! 抽取降级不是错误，见 [`crate::services::extractor::ExtractionReport`]。

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::{DriverState, JobKey};

/// 单次抓取的硬故障
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// 账号密码错误，或门户拒绝登录
    #[error("门户拒绝登录: {0}")]
    AuthenticationFailure(String),

    /// 期望的元素/内容没有在限定时间内出现
    #[error("等待超时 (阶段: {step}, 已等待 {}s)", .waited.as_secs())]
    NavigationTimeout { step: DriverState, waited: Duration },

    /// 页面上找不到必须的控件
    #[error("未找到元素 {target} (阶段: {step})")]
    ElementNotFound { step: DriverState, target: String },

    /// CDP 通信失败
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// 浏览器启动参数无效
    #[error("浏览器配置失败: {0}")]
    BrowserConfig(String),

    /// 页面脚本返回了无法解析的结果
    #[error("脚本结果解析失败: {0}")]
    Script(#[from] serde_json::Error),

    /// 学生尚未登记
    #[error("学生 {0} 不存在")]
    StudentNotFound(JobKey),

    /// 持久化层写入失败
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// 后台任务在写入终态之前被中断
    #[error("任务异常终止: {0}")]
    TaskAborted(String),
}

impl ScrapeError {
    /// 对外暴露的错误码
    pub fn kind(&self) -> FailureKind {
        match self {
            ScrapeError::AuthenticationFailure(_) => FailureKind::AuthenticationFailure,
            ScrapeError::NavigationTimeout { .. } => FailureKind::NavigationTimeout,
            ScrapeError::ElementNotFound { .. } => FailureKind::ElementNotFound,
            ScrapeError::Browser(_) | ScrapeError::BrowserConfig(_) | ScrapeError::Script(_) => {
                FailureKind::BrowserFailure
            }
            ScrapeError::StudentNotFound(_)
            | ScrapeError::Persistence(PersistenceError::StudentNotFound(_)) => {
                FailureKind::StudentNotFound
            }
            ScrapeError::Persistence(_) => FailureKind::PersistenceFailure,
            ScrapeError::TaskAborted(_) => FailureKind::TaskAborted,
        }
    }
}

/// 错误码，随 `error` 状态一起返回给轮询方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthenticationFailure,
    NavigationTimeout,
    ElementNotFound,
    BrowserFailure,
    StudentNotFound,
    PersistenceFailure,
    TaskAborted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AuthenticationFailure => "authentication_failure",
            FailureKind::NavigationTimeout => "navigation_timeout",
            FailureKind::ElementNotFound => "element_not_found",
            FailureKind::BrowserFailure => "browser_failure",
            FailureKind::StudentNotFound => "student_not_found",
            FailureKind::PersistenceFailure => "persistence_failure",
            FailureKind::TaskAborted => "task_aborted",
        }
    }
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("学生 {0} 不存在")]
    StudentNotFound(JobKey),

    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 提交抓取请求时被拒绝
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    /// 同一学号已有任务在运行
    #[error("学号 {0} 已有抓取任务在运行")]
    AlreadyRunning(JobKey),

    /// 排队任务达到上限
    #[error("排队任务已满 (上限: {limit})")]
    QueueFull { limit: usize },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 抓取结果类型
pub type ScrapeResult<T> = Result<T, ScrapeError>;
