//! 调试快照写入服务 - 业务能力层
//!
//! 只负责"把报表 HTML 落盘"能力，不关心流程。写入失败不影响任务。

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::models::{JobKey, RawDocument};

/// 调试快照写入服务
///
/// 未配置目录时什么都不做
#[derive(Debug, Clone, Default)]
pub struct SnapshotWriter {
    dir: Option<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// 写入 `debug_page_<学号>.html`，返回写入的路径
    pub async fn write(&self, document: &RawDocument) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(snapshot_file_name(&document.key));

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("[学号 {}] 创建快照目录失败: {}", document.key, e);
            return None;
        }

        match tokio::fs::write(&path, document.html.as_bytes()).await {
            Ok(()) => {
                debug!("[学号 {}] 快照已写入 {}", document.key, path.display());
                Some(path)
            }
            Err(e) => {
                warn!("[学号 {}] 写入快照失败: {}", document.key, e);
                None
            }
        }
    }
}

/// 学号只保留字母数字和 `-_`，避免拼出目录穿越的文件名
pub fn snapshot_file_name(key: &JobKey) -> String {
    let safe: String = key
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("debug_page_{}.html", safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrameChoice;

    #[test]
    fn test_file_name_is_sanitized() {
        assert_eq!(snapshot_file_name(&JobKey::new("BE23CS060")), "debug_page_BE23CS060.html");
        assert_eq!(snapshot_file_name(&JobKey::new("../etc/x")), "debug_page____etc_x.html");
    }

    #[tokio::test]
    async fn test_disabled_writer_writes_nothing() {
        let doc = RawDocument::new(JobKey::new("BE23CS060"), "<html></html>", FrameChoice::Named);
        assert!(SnapshotWriter::disabled().write(&doc).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_written_to_dir() {
        let dir = std::env::temp_dir().join(format!("attendance_snapshots_{}", std::process::id()));
        let writer = SnapshotWriter::new(Some(dir.clone()));
        let doc = RawDocument::new(JobKey::new("BE23CS060"), "<html>report</html>", FrameChoice::FirstAvailable);

        let path = writer.write(&doc).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let _ = tokio::fs::remove_dir_all(&dir).await;

        assert_eq!(content, "<html>report</html>");
        assert!(path.ends_with("debug_page_BE23CS060.html"));
    }
}
