use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 备份记录（数据库原始行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub backup_kind: String,
    pub status: String,
    pub archive_path: Option<String>,
    pub size_bytes: i64,
    pub error_message: Option<String>,
    pub notes: Option<String>,
    pub last_restored_at: Option<DateTime<Utc>>,
}

/// 新建备份记录所需字段
#[derive(Debug, Clone)]
pub struct NewBackupRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub backup_kind: String,
    pub notes: Option<String>,
}

/// 审计事件（数据库原始行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventRow {
    pub id: i64,
    pub phase: String,
    pub record_id: Option<String>,
    pub status: String,
    pub actor: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub detail: Option<String>,
}
