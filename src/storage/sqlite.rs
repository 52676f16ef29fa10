use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::AttendanceStore;
use crate::error::PersistenceError;
use crate::models::{AttendanceRecord, JobKey, StudentProfile};

/// sqlite 存储
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 连接数据库（文件不存在时创建）并执行迁移
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // 内存库每个连接都是独立的数据库，只能保留一个常驻连接
        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None::<Duration>).max_lifetime(None::<Duration>);
        }

        let pool = pool_options.connect_with(options).await?;
        info!("数据库已连接: {}", url);
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, PersistenceError> {
        debug!("执行数据库迁移");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<StudentProfile, sqlx::Error> {
    Ok(StudentProfile {
        name: row.try_get("name")?,
        institution: row.try_get("institution")?,
        academic_career: row.try_get("academic_career")?,
        term: row.try_get("term")?,
        total_attendance_percent: row.try_get("total_attendance_percent")?,
        medical_attendance_percent: row.try_get("medical_attendance_percent")?,
        overall_attendance_percent: row.try_get("overall_attendance_percent")?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<AttendanceRecord, sqlx::Error> {
    Ok(AttendanceRecord {
        class_number: row.try_get("class_number")?,
        class_title: row.try_get("class_title")?,
        subject_catalog: row.try_get("subject_catalog")?,
        academic_career: row.try_get("academic_career")?,
        institution: row.try_get("institution")?,
        attendance_percentage: row.try_get("attendance_percentage")?,
    })
}

async fn student_exists(conn: &mut SqliteConnection, key: &JobKey) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM students WHERE student_id = ?")
        .bind(key.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// COALESCE 合并：`None` 字段保留原值；返回受影响行数
async fn merge_profile(conn: &mut SqliteConnection, key: &JobKey, update: &StudentProfile) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE students SET
            name = COALESCE(?, name),
            institution = COALESCE(?, institution),
            academic_career = COALESCE(?, academic_career),
            term = COALESCE(?, term),
            total_attendance_percent = COALESCE(?, total_attendance_percent),
            medical_attendance_percent = COALESCE(?, medical_attendance_percent),
            overall_attendance_percent = COALESCE(?, overall_attendance_percent),
            last_updated = ?
        WHERE student_id = ?
        ",
    )
    .bind(&update.name)
    .bind(&update.institution)
    .bind(&update.academic_career)
    .bind(&update.term)
    .bind(update.total_attendance_percent)
    .bind(update.medical_attendance_percent)
    .bind(update.overall_attendance_percent)
    .bind(Utc::now())
    .bind(key.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn replace_records(conn: &mut SqliteConnection, key: &JobKey, records: &[AttendanceRecord]) -> Result<(), sqlx::Error> {
    let scraped_at = Utc::now();

    sqlx::query("DELETE FROM attendance_records WHERE student_id = ?")
        .bind(key.as_str())
        .execute(&mut *conn)
        .await?;

    for (position, record) in records.iter().enumerate() {
        sqlx::query(
            r"
            INSERT INTO attendance_records
                (student_id, position, class_number, class_title, subject_catalog,
                 academic_career, institution, attendance_percentage, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(key.as_str())
        .bind(position as i64)
        .bind(&record.class_number)
        .bind(&record.class_title)
        .bind(&record.subject_catalog)
        .bind(&record.academic_career)
        .bind(&record.institution)
        .bind(record.attendance_percentage)
        .bind(scraped_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn register_student(&self, key: &JobKey) -> Result<bool, PersistenceError> {
        let result = sqlx::query("INSERT OR IGNORE INTO students (student_id, created_at) VALUES (?, ?)")
            .bind(key.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_profile(&self, key: &JobKey) -> Result<Option<StudentProfile>, PersistenceError> {
        let row = sqlx::query(
            r"
            SELECT name, institution, academic_career, term,
                   total_attendance_percent, medical_attendance_percent, overall_attendance_percent
            FROM students WHERE student_id = ?
            ",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(profile_from_row).transpose()?)
    }

    async fn update_profile(&self, key: &JobKey, update: &StudentProfile) -> Result<(), PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        if merge_profile(&mut conn, key, update).await? == 0 {
            return Err(PersistenceError::StudentNotFound(key.clone()));
        }
        Ok(())
    }

    async fn replace_attendance(&self, key: &JobKey, records: &[AttendanceRecord]) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        if !student_exists(&mut tx, key).await? {
            return Err(PersistenceError::StudentNotFound(key.clone()));
        }

        replace_records(&mut tx, key, records).await?;
        tx.commit().await?;
        debug!("[学号 {}] 已替换 {} 条出勤记录", key, records.len());
        Ok(())
    }

    async fn save_scrape(
        &self,
        key: &JobKey,
        profile: &StudentProfile,
        records: &[AttendanceRecord],
    ) -> Result<(), PersistenceError> {
        // 未提交的事务在 drop 时回滚
        let mut tx = self.pool.begin().await?;
        if merge_profile(&mut tx, key, profile).await? == 0 {
            return Err(PersistenceError::StudentNotFound(key.clone()));
        }

        replace_records(&mut tx, key, records).await?;
        tx.commit().await?;
        debug!("[学号 {}] 已保存档案和 {} 条出勤记录", key, records.len());
        Ok(())
    }

    async fn attendance(&self, key: &JobKey) -> Result<Vec<AttendanceRecord>, PersistenceError> {
        let rows = sqlx::query(
            r"
            SELECT class_number, class_title, subject_catalog, academic_career,
                   institution, attendance_percentage
            FROM attendance_records WHERE student_id = ?
            ORDER BY position
            ",
        )
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
