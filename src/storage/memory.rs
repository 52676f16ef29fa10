use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AttendanceStore;
use crate::error::PersistenceError;
use crate::models::{AttendanceRecord, JobKey, StudentProfile};

#[derive(Debug, Default)]
struct StudentEntry {
    profile: StudentProfile,
    records: Vec<AttendanceRecord>,
}

/// 内存存储，用于测试和不需要落盘的场景
#[derive(Debug, Default)]
pub struct MemoryStore {
    students: RwLock<HashMap<JobKey, StudentEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn register_student(&self, key: &JobKey) -> Result<bool, PersistenceError> {
        let mut students = self.students.write().await;
        if students.contains_key(key) {
            return Ok(false);
        }
        students.insert(key.clone(), StudentEntry::default());
        Ok(true)
    }

    async fn get_profile(&self, key: &JobKey) -> Result<Option<StudentProfile>, PersistenceError> {
        Ok(self
            .students
            .read()
            .await
            .get(key)
            .map(|entry| entry.profile.clone()))
    }

    async fn update_profile(&self, key: &JobKey, update: &StudentProfile) -> Result<(), PersistenceError> {
        let mut students = self.students.write().await;
        let entry = students
            .get_mut(key)
            .ok_or_else(|| PersistenceError::StudentNotFound(key.clone()))?;
        entry.profile.merge_from(update);
        Ok(())
    }

    async fn replace_attendance(&self, key: &JobKey, records: &[AttendanceRecord]) -> Result<(), PersistenceError> {
        let mut students = self.students.write().await;
        let entry = students
            .get_mut(key)
            .ok_or_else(|| PersistenceError::StudentNotFound(key.clone()))?;
        entry.records = records.to_vec();
        Ok(())
    }

    async fn save_scrape(
        &self,
        key: &JobKey,
        profile: &StudentProfile,
        records: &[AttendanceRecord],
    ) -> Result<(), PersistenceError> {
        let mut students = self.students.write().await;
        let entry = students
            .get_mut(key)
            .ok_or_else(|| PersistenceError::StudentNotFound(key.clone()))?;
        entry.profile.merge_from(profile);
        entry.records = records.to_vec();
        Ok(())
    }

    async fn attendance(&self, key: &JobKey) -> Result<Vec<AttendanceRecord>, PersistenceError> {
        Ok(self
            .students
            .read()
            .await
            .get(key)
            .map(|entry| entry.records.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(class_number: &str) -> AttendanceRecord {
        AttendanceRecord {
            class_number: class_number.to_string(),
            class_title: "Data Analytics".to_string(),
            subject_catalog: "CS BCS-052".to_string(),
            academic_career: "Undergraduate".to_string(),
            institution: "Inst X".to_string(),
            attendance_percentage: 80.0,
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = MemoryStore::new();
        let key = JobKey::new("BE23CS060");

        assert!(store.register_student(&key).await.unwrap());
        assert!(!store.register_student(&key).await.unwrap());
        assert_eq!(store.get_profile(&key).await.unwrap(), Some(StudentProfile::default()));
    }

    #[tokio::test]
    async fn test_unknown_student_rejected() {
        let store = MemoryStore::new();
        let key = JobKey::new("BE23CS999");

        assert_eq!(store.get_profile(&key).await.unwrap(), None);
        let err = tokio_test::assert_err!(store.replace_attendance(&key, &[record("CS101")]).await);
        assert!(matches!(err, PersistenceError::StudentNotFound(_)));
        tokio_test::assert_ok!(store.attendance(&key).await);
    }

    #[tokio::test]
    async fn test_replace_discards_previous_set() {
        let store = MemoryStore::new();
        let key = JobKey::new("BE23CS060");
        store.register_student(&key).await.unwrap();

        store
            .replace_attendance(&key, &[record("CS101"), record("CS102"), record("CS103")])
            .await
            .unwrap();
        store.replace_attendance(&key, &[record("CS104")]).await.unwrap();

        let records = store.attendance(&key).await.unwrap();
        assert_eq!(records, vec![record("CS104")]);
    }

    #[tokio::test]
    async fn test_save_scrape_writes_profile_and_records_together() {
        let store = MemoryStore::new();
        let key = JobKey::new("BE23CS060");
        store.register_student(&key).await.unwrap();
        store.replace_attendance(&key, &[record("CS101")]).await.unwrap();

        let profile = StudentProfile {
            name: Some("Asha Verma".to_string()),
            total_attendance_percent: Some(85.5),
            ..Default::default()
        };
        store
            .save_scrape(&key, &profile, &[record("CS102"), record("CS103")])
            .await
            .unwrap();

        assert_eq!(store.get_profile(&key).await.unwrap(), Some(profile));
        assert_eq!(store.attendance(&key).await.unwrap(), vec![record("CS102"), record("CS103")]);

        let unknown = JobKey::new("BE23CS999");
        let err = tokio_test::assert_err!(store.save_scrape(&unknown, &StudentProfile::default(), &[]).await);
        assert!(matches!(err, PersistenceError::StudentNotFound(_)));
        assert_eq!(store.get_profile(&unknown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_profile_merges() {
        let store = MemoryStore::new();
        let key = JobKey::new("BE23CS060");
        store.register_student(&key).await.unwrap();

        store
            .update_profile(
                &key,
                &StudentProfile {
                    name: Some("Asha Verma".to_string()),
                    term: Some("Semester 1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .update_profile(
                &key,
                &StudentProfile {
                    institution: Some("Inst X".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let profile = store.get_profile(&key).await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Asha Verma"));
        assert_eq!(profile.term.as_deref(), Some("Semester 1"));
        assert_eq!(profile.institution.as_deref(), Some("Inst X"));
    }
}
