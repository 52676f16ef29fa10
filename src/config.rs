//! 程序配置
//!
//! 加载顺序：默认值 → TOML 文件（可选）→ 环境变量。
//! 门户上的元素标识都放在这里，门户改版时只需改配置。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalConfig,
    pub browser: BrowserSettings,
    pub extractor: ExtractorConfig,
    pub jobs: JobsConfig,
    /// sqlx 连接串
    pub database_url: String,
    /// 调试快照目录，不设置则不写快照
    pub snapshot_dir: Option<PathBuf>,
    /// 批量模式的账号清单
    pub credentials_file: String,
    /// 批量模式导出的 CSV
    pub output_csv: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            browser: BrowserSettings::default(),
            extractor: ExtractorConfig::default(),
            jobs: JobsConfig::default(),
            database_url: "sqlite://student_erp.db".to_string(),
            snapshot_dir: None,
            credentials_file: "accounts.toml".to_string(),
            output_csv: "erp_scraped_data.csv".to_string(),
            verbose_logging: false,
        }
    }
}

/// 门户地址与页面元素标识
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub login_url: String,
    pub report_url: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// 登录成功后才会出现的元素
    pub dashboard_selector: String,
    /// 登录失败时门户显示的错误提示
    pub login_error_selector: String,
    /// 报表所在 frame 的 id 或 name
    pub frame_name: String,
    /// 展开结果所需点击的控件 id
    pub disclosure_id: String,
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// 指定 frame 未出现时，至少等待这么久才退回第一个 iframe
    pub frame_settle_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: "https://campus.srmcem.ac.in/psp/ps/?cmd=login".to_string(),
            report_url: "https://campus.srmcem.ac.in/psp/ps/EMPLOYEE/HRMS/c/MANAGE_ACADEMIC_RECORDS.STDNT_ATTEND_TERM.GBL".to_string(),
            username_selector: "#userid".to_string(),
            password_selector: "#pwd".to_string(),
            submit_selector: "[name=\"Submit\"]".to_string(),
            dashboard_selector: "#pthnavcontainer".to_string(),
            login_error_selector: "#login_error".to_string(),
            frame_name: "ptifrmtgtframe".to_string(),
            disclosure_id: "RESULT3$0".to_string(),
            wait_timeout_secs: 30,
            poll_interval_ms: 250,
            frame_settle_ms: 5000,
        }
    }
}

impl PortalConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn frame_settle(&self) -> Duration {
        Duration::from_millis(self.frame_settle_ms)
    }
}

/// 浏览器启动方式
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// 设置后连接到已开启调试端口的浏览器，否则每个任务启动一个无头浏览器
    pub debug_port: Option<u16>,
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            debug_port: None,
            executable: None,
            headless: true,
            window_width: 1920,
            window_height: 1080,
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
            ],
        }
    }
}

/// 报表页面上的元素 ID
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub name_id: String,
    pub institution_id: String,
    pub academic_career_id: String,
    pub term_id: String,
    pub total_attendance_id: String,
    pub medical_attendance_id: String,
    pub overall_attendance_id: String,
    /// 出勤表 id 中固定的部分，后缀随学期变化
    pub table_id_fragment: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            name_id: "PERSONAL_DTSAVW_NAME".to_string(),
            institution_id: "INSTITUTION_TBL_DESCR".to_string(),
            academic_career_id: "ACAD_CAR_TBL_DESCR".to_string(),
            term_id: "TERM_VAL_TBL_DESCR".to_string(),
            total_attendance_id: "SRM_LEAVE_WRK_AMOUNT_DUE".to_string(),
            medical_attendance_id: "SRM_LEAVE_WRK_AMOUNT_DIFF".to_string(),
            overall_attendance_id: "SRM_CLAS_PER_DR_TOTAL_PERCENT".to_string(),
            table_id_fragment: "STDNT_ENRL".to_string(),
        }
    }
}

/// 任务调度
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// 同时持有的浏览器会话数量
    pub max_concurrent_sessions: usize,
    /// 运行中加排队中的任务上限
    pub max_pending_jobs: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 2,
            max_pending_jobs: 32,
        }
    }
}

impl Config {
    /// 读取配置：可选的 TOML 文件，再叠加环境变量
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn from_toml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_string(),
            source,
        })
    }

    fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&content, &display)
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_string("PORTAL_LOGIN_URL") {
            self.portal.login_url = v;
        }
        if let Some(v) = env_string("PORTAL_REPORT_URL") {
            self.portal.report_url = v;
        }
        if let Some(v) = env_parse::<u16>("BROWSER_DEBUG_PORT")? {
            self.browser.debug_port = Some(v);
        }
        if let Some(v) = env_string("BROWSER_EXECUTABLE") {
            self.browser.executable = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse::<usize>("MAX_CONCURRENT_SESSIONS")? {
            self.jobs.max_concurrent_sessions = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_PENDING_JOBS")? {
            self.jobs.max_pending_jobs = v;
        }
        if let Some(v) = env_parse::<u64>("WAIT_TIMEOUT_SECS")? {
            self.portal.wait_timeout_secs = v;
        }
        if let Some(v) = env_string("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = env_string("SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse::<bool>("VERBOSE_LOGGING")? {
            self.verbose_logging = v;
        }
        if let Some(v) = env_string("CREDENTIALS_FILE") {
            self.credentials_file = v;
        }
        if let Some(v) = env_string("OUTPUT_CSV") {
            self.output_csv = v;
        }
        Ok(self)
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(var_name: &str) -> Result<Option<T>, ConfigError> {
    match env_string(var_name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let content = r#"
            database_url = "sqlite::memory:"

            [portal]
            frame_name = "TargetContent"
            wait_timeout_secs = 45

            [jobs]
            max_concurrent_sessions = 4
        "#;

        let config = Config::from_toml_str(content, "test.toml").unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.portal.frame_name, "TargetContent");
        assert_eq!(config.portal.wait_timeout(), Duration::from_secs(45));
        assert_eq!(config.portal.disclosure_id, "RESULT3$0");
        assert_eq!(config.jobs.max_concurrent_sessions, 4);
        assert_eq!(config.jobs.max_pending_jobs, 32);
        assert_eq!(config.extractor.table_id_fragment, "STDNT_ENRL");
        assert!(config.snapshot_dir.is_none());
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let err = Config::from_toml_str("[portal\n", "broken.toml").unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_poll_interval_has_floor() {
        let portal = PortalConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(portal.poll_interval(), Duration::from_millis(10));
    }
}
