use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::models::{AuditEventRow, BackupRow, NewBackupRow};

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 备份台账 ==========
    /// 创建进行中的备份记录，返回写入后的行
    CreateBackupRecord {
        record: NewBackupRow,
        respond_to: oneshot::Sender<Result<BackupRow>>,
    },
    /// 进行中 -> 已完成
    MarkBackupCompleted {
        id: String,
        archive_path: String,
        size_bytes: i64,
        respond_to: oneshot::Sender<Result<BackupRow>>,
    },
    /// 进行中 -> 失败
    MarkBackupFailed {
        id: String,
        error_message: String,
        respond_to: oneshot::Sender<Result<BackupRow>>,
    },
    /// 记录最近一次成功恢复的时间
    MarkBackupRestored {
        id: String,
        restored_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 获取所有备份记录
    GetAllBackups {
        respond_to: oneshot::Sender<Result<Vec<BackupRow>>>,
    },
    /// 根据ID获取备份记录
    GetBackupById {
        id: String,
        respond_to: oneshot::Sender<Result<Option<BackupRow>>>,
    },
    /// 删除备份记录，返回是否删除了行
    DeleteBackupRecord {
        id: String,
        respond_to: oneshot::Sender<Result<bool>>,
    },

    // ========== 审计事件 ==========
    /// 写入审计事件，respond_to 为空时即发即弃
    RecordAuditEvent {
        event: AuditEventRow,
        respond_to: Option<oneshot::Sender<Result<i64>>>,
    },
    /// 查询审计事件（按写入顺序倒序）
    ListAuditEvents {
        record_id: Option<String>,
        limit: usize,
        respond_to: oneshot::Sender<Result<Vec<AuditEventRow>>>,
    },
}
