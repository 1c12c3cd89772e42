use crate::audit::AuditEvent;
use crate::constants::backup::{BACKUP_EXTENSION, BACKUP_NAME_TIME_FORMAT, BACKUP_PREFIX};
use crate::db::{AuditEventRow, BackupRow, DuckDbManager, NewBackupRow};
use crate::error::{Result, SnapError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

/// 备份类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Partial,
}

/// 备份状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    InProgress,
    Completed,
    Failed,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Partial => "partial",
        }
    }
}

impl FromStr for BackupKind {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(BackupKind::Full),
            "partial" => Ok(BackupKind::Partial),
            other => Err(SnapError::ledger(format!("未知的备份类型: {other}"))),
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BackupStatus::InProgress)
    }
}

impl FromStr for BackupStatus {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(BackupStatus::InProgress),
            "completed" => Ok(BackupStatus::Completed),
            "failed" => Ok(BackupStatus::Failed),
            other => Err(SnapError::ledger(format!("未知的备份状态: {other}"))),
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 备份记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub kind: BackupKind,
    pub status: BackupStatus,
    /// 仅在 Completed 时存在
    pub archive_path: Option<String>,
    /// 仅在 Completed 时大于 0
    pub size_bytes: u64,
    /// 仅在 Failed 时存在
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub last_restored_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    pub fn archive_file(&self) -> Option<PathBuf> {
        self.archive_path.as_ref().map(PathBuf::from)
    }

    /// 下载时使用的文件名
    pub fn download_file_name(&self) -> String {
        format!("{}{}", self.name, BACKUP_EXTENSION)
    }

    pub fn display_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

impl TryFrom<BackupRow> for BackupRecord {
    type Error = SnapError;

    fn try_from(row: BackupRow) -> Result<Self> {
        let size_bytes = u64::try_from(row.size_bytes)
            .map_err(|_| SnapError::ledger(format!("非法的备份大小: {}", row.size_bytes)))?;
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            name: row.name,
            created_at: row.created_at,
            created_by: row.created_by,
            kind: row.backup_kind.parse()?,
            status: row.status.parse()?,
            archive_path: row.archive_path,
            size_bytes,
            error_message: row.error_message,
            notes: row.notes,
            last_restored_at: row.last_restored_at,
        })
    }
}

/// 以二进制单位显示字节数，保留一位小数（仅用于展示）
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// 备份台账
///
/// 唯一负责记录身份和生命周期的组件，其他组件只能通过这里请求状态迁移。
#[derive(Debug, Clone)]
pub struct BackupRecordStore {
    manager: DuckDbManager,
}

impl BackupRecordStore {
    /// 连接到台账数据库
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DuckDbManager::new(db_path).await?;
        Ok(Self { manager })
    }

    /// 连接到内存数据库 (主要用于测试)
    pub async fn connect_memory() -> Result<Self> {
        let manager = DuckDbManager::new_memory().await?;
        Ok(Self { manager })
    }

    /// 创建进行中的备份记录
    pub async fn create(
        &self,
        kind: BackupKind,
        created_by: Option<String>,
        notes: Option<String>,
    ) -> Result<BackupRecord> {
        let created_at = Utc::now();
        let row = NewBackupRow {
            id: Uuid::new_v4().to_string(),
            name: format!(
                "{}{}",
                BACKUP_PREFIX,
                created_at.format(BACKUP_NAME_TIME_FORMAT)
            ),
            created_at,
            created_by,
            backup_kind: kind.as_str().to_string(),
            notes,
        };

        let record = BackupRecord::try_from(self.manager.create_backup_record(row).await?)?;
        info!("📝 创建备份记录: {} ({})", record.id, record.name);
        Ok(record)
    }

    /// 进行中 -> 已完成，同时写入归档路径和大小
    pub async fn mark_completed(
        &self,
        id: Uuid,
        archive_path: &Path,
        size_bytes: u64,
    ) -> Result<BackupRecord> {
        let archive_path = archive_path.to_string_lossy().to_string();
        if archive_path.is_empty() || size_bytes == 0 {
            return Err(SnapError::ledger(format!(
                "完成状态需要非空归档路径和正数大小: path='{archive_path}', size={size_bytes}"
            )));
        }
        let size_bytes = i64::try_from(size_bytes)
            .map_err(|_| SnapError::ledger(format!("备份大小超出范围: {size_bytes}")))?;

        let row = self
            .manager
            .mark_backup_completed(id.to_string(), archive_path, size_bytes)
            .await?;
        info!("✅ 备份记录已完成: {}", id);
        BackupRecord::try_from(row)
    }

    /// 进行中 -> 失败，记录错误信息
    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<BackupRecord> {
        let message = if error_message.trim().is_empty() {
            "未知错误".to_string()
        } else {
            error_message.to_string()
        };

        let row = self
            .manager
            .mark_backup_failed(id.to_string(), message)
            .await?;
        warn!("❌ 备份记录已标记失败: {}", id);
        BackupRecord::try_from(row)
    }

    /// 记录成功恢复的时间（不属于生命周期字段）
    pub async fn mark_restored(&self, id: Uuid) -> Result<()> {
        self.manager
            .mark_backup_restored(id.to_string(), Utc::now())
            .await
    }

    /// 删除记录，并尽力删除归档文件
    ///
    /// 文件删除失败只记录日志，不影响台账删除。
    pub async fn delete(&self, id: Uuid) -> Result<BackupRecord> {
        let record = self.require(id).await?;

        if !self.manager.delete_backup_record(id.to_string()).await? {
            return Err(SnapError::RecordNotFound(id.to_string()));
        }
        info!("🗑️  已删除备份记录: {}", id);

        if let Some(path) = record.archive_file() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("删除备份文件: {}", path.display()),
                Err(e) => warn!("删除备份文件失败 {}: {}", path.display(), e),
            }
        }

        Ok(record)
    }

    /// 获取所有备份记录（按创建时间倒序）
    pub async fn list(&self) -> Result<Vec<BackupRecord>> {
        self.manager
            .get_all_backups()
            .await?
            .into_iter()
            .map(BackupRecord::try_from)
            .collect()
    }

    /// 根据 ID 获取备份记录
    pub async fn get(&self, id: Uuid) -> Result<Option<BackupRecord>> {
        self.manager
            .get_backup_by_id(id.to_string())
            .await?
            .map(BackupRecord::try_from)
            .transpose()
    }

    /// 获取备份记录，不存在时返回 RecordNotFound
    pub async fn require(&self, id: Uuid) -> Result<BackupRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| SnapError::RecordNotFound(id.to_string()))
    }

    /// 写入审计事件并等待落库
    pub async fn record_audit_event(&self, event: &AuditEvent) -> Result<i64> {
        self.manager.record_audit_event(audit_row(event)).await
    }

    /// 即发即弃地写入审计事件
    pub fn record_audit_event_nowait(&self, event: &AuditEvent) -> Result<()> {
        self.manager.record_audit_event_nowait(audit_row(event))
    }

    /// 查询审计事件（最新在前）
    pub async fn list_audit_events(
        &self,
        record_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        self.manager
            .list_audit_events(record_id.map(|id| id.to_string()), limit)
            .await?
            .into_iter()
            .map(|row| {
                Ok(AuditEvent {
                    phase: row.phase.parse()?,
                    record_id: row.record_id.as_deref().map(Uuid::parse_str).transpose()?,
                    status: row.status.parse()?,
                    actor: row.actor,
                    timestamp: row.occurred_at,
                    detail: row.detail,
                })
            })
            .collect()
    }
}

fn audit_row(event: &AuditEvent) -> AuditEventRow {
    AuditEventRow {
        id: 0,
        phase: event.phase.as_str().to_string(),
        record_id: event.record_id.map(|id| id.to_string()),
        status: event.status.as_str().to_string(),
        actor: event.actor.clone(),
        occurred_at: event.timestamp,
        detail: event.detail.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditPhase, AuditStatus};
    use tempfile::tempdir;

    fn assert_lifecycle_invariants(record: &BackupRecord) {
        let completed_fields = record
            .archive_path
            .as_deref()
            .is_some_and(|p| !p.is_empty())
            && record.size_bytes > 0;
        let failed_fields = record
            .error_message
            .as_deref()
            .is_some_and(|m| !m.is_empty());

        assert_eq!(record.status == BackupStatus::Completed, completed_fields);
        assert_eq!(record.status == BackupStatus::Failed, failed_fields);
        assert!(!(completed_fields && failed_fields));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_size(2 * 1024u64.pow(4)), "2.0 TB");
        assert_eq!(format_size(2048 * 1024u64.pow(4)), "2048.0 TB");
    }

    #[test]
    fn test_kind_and_status_parse_strictly() {
        assert_eq!("full".parse::<BackupKind>().unwrap(), BackupKind::Full);
        assert!("FULL".parse::<BackupKind>().is_err());
        assert_eq!(
            "in_progress".parse::<BackupStatus>().unwrap(),
            BackupStatus::InProgress
        );
        assert!("done".parse::<BackupStatus>().is_err());
    }

    #[tokio::test]
    async fn test_create_starts_in_progress() {
        let store = BackupRecordStore::connect_memory().await.unwrap();
        let record = store
            .create(BackupKind::Full, Some("admin".to_string()), None)
            .await
            .unwrap();

        assert_eq!(record.status, BackupStatus::InProgress);
        assert!(record.name.starts_with("backup_"));
        assert_eq!(record.created_by.as_deref(), Some("admin"));
        assert_lifecycle_invariants(&record);

        let fetched = store.require(record.id).await.unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_completed_and_failed_transitions() {
        let store = BackupRecordStore::connect_memory().await.unwrap();

        let ok = store.create(BackupKind::Full, None, None).await.unwrap();
        let ok = store
            .mark_completed(ok.id, Path::new("/var/backups/a.tar.gz"), 2048)
            .await
            .unwrap();
        assert_eq!(ok.status, BackupStatus::Completed);
        assert_eq!(ok.size_bytes, 2048);
        assert_lifecycle_invariants(&ok);

        let bad = store
            .create(BackupKind::Partial, None, Some("夜间".to_string()))
            .await
            .unwrap();
        let bad = store
            .mark_failed(bad.id, "CaptureError: 磁盘已满")
            .await
            .unwrap();
        assert_eq!(bad.status, BackupStatus::Failed);
        assert_lifecycle_invariants(&bad);

        for record in store.list().await.unwrap() {
            assert_lifecycle_invariants(&record);
        }
    }

    #[tokio::test]
    async fn test_terminal_records_are_immutable() {
        let store = BackupRecordStore::connect_memory().await.unwrap();
        let record = store.create(BackupKind::Full, None, None).await.unwrap();
        store.mark_failed(record.id, "boom").await.unwrap();

        let err = store
            .mark_completed(record.id, Path::new("/tmp/x.tar.gz"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::Ledger(_)));

        let err = store.mark_failed(record.id, "again").await.unwrap_err();
        assert!(matches!(err, SnapError::Ledger(_)));

        let unchanged = store.require(record.id).await.unwrap();
        assert_eq!(unchanged.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_completed_requires_positive_size() {
        let store = BackupRecordStore::connect_memory().await.unwrap();
        let record = store.create(BackupKind::Full, None, None).await.unwrap();

        assert!(store
            .mark_completed(record.id, Path::new("/tmp/x.tar.gz"), 0)
            .await
            .is_err());
        assert_eq!(
            store.require(record.id).await.unwrap().status,
            BackupStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let store = BackupRecordStore::connect_memory().await.unwrap();
        let err = store.mark_failed(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, SnapError::RecordNotFound(_)));
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_with_missing_archive_file() {
        let temp_dir = tempdir().unwrap();
        let store = BackupRecordStore::connect(temp_dir.path().join("ledger.db"))
            .await
            .unwrap();
        let record = store.create(BackupKind::Full, None, None).await.unwrap();
        let missing = temp_dir.path().join("gone.tar.gz");
        store.mark_completed(record.id, &missing, 100).await.unwrap();

        let deleted = store.delete(record.id).await.unwrap();
        assert_eq!(deleted.id, record.id);
        assert!(store.get(record.id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_archive_file() {
        let temp_dir = tempdir().unwrap();
        let store = BackupRecordStore::connect_memory().await.unwrap();
        let record = store.create(BackupKind::Full, None, None).await.unwrap();
        let archive = temp_dir.path().join("a.tar.gz");
        std::fs::write(&archive, b"data").unwrap();
        store.mark_completed(record.id, &archive, 4).await.unwrap();

        store.delete(record.id).await.unwrap();
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_audit_events_round_trip() {
        let store = BackupRecordStore::connect_memory().await.unwrap();
        let record_id = Uuid::new_v4();
        let event = AuditEvent {
            phase: AuditPhase::Archive,
            record_id: Some(record_id),
            status: AuditStatus::Succeeded,
            actor: Some("ops".to_string()),
            timestamp: Utc::now(),
            detail: Some("size=10".to_string()),
        };
        store.record_audit_event(&event).await.unwrap();
        store
            .record_audit_event(&AuditEvent {
                record_id: None,
                ..event.clone()
            })
            .await
            .unwrap();

        let for_record = store.list_audit_events(Some(record_id), 10).await.unwrap();
        assert_eq!(for_record.len(), 1);
        assert_eq!(for_record[0].phase, AuditPhase::Archive);
        assert_eq!(for_record[0].actor.as_deref(), Some("ops"));

        let all = store.list_audit_events(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].record_id.is_none());
    }
}
