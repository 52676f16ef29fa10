//! 批量结果导出

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{AttendanceRecord, JobKey};

pub const CSV_HEADER: [&str; 7] = [
    "class_number",
    "class_title",
    "subject_catalog",
    "academic_career",
    "institution",
    "attendance_percentage",
    "scraped_by_user",
];

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// 写一行 CSV
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, ",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

/// 把所有账号的记录渲染成 CSV 文本，每行附带抓取它的学号
pub fn render(batches: &[(JobKey, Vec<AttendanceRecord>)]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let header: Vec<String> = CSV_HEADER.iter().map(|s| s.to_string()).collect();
    write_row(&mut out, &header)?;

    for (key, records) in batches {
        for record in records {
            let row = vec![
                record.class_number.clone(),
                record.class_title.clone(),
                record.subject_catalog.clone(),
                record.academic_career.clone(),
                record.institution.clone(),
                record.attendance_percentage.to_string(),
                key.to_string(),
            ];
            write_row(&mut out, &row)?;
        }
    }

    Ok(out)
}

/// 导出到文件，返回写入的记录数
pub async fn export(path: &Path, batches: &[(JobKey, Vec<AttendanceRecord>)]) -> Result<usize> {
    let bytes = render(batches).context("渲染 CSV 失败")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("写入 {} 失败", path.display()))?;

    let count = batches.iter().map(|(_, records)| records.len()).sum();
    info!("💾 已导出 {} 条记录到 {}", count, path.display());
    Ok(count)
}
