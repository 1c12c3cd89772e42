use crate::{Result, SnapError};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::DbMessage;
use super::models::{AuditEventRow, BackupRow, NewBackupRow};

/// DuckDB数据库管理器
#[derive(Debug, Clone)]
pub struct DuckDbManager {
    sender: mpsc::Sender<DbMessage>,
}

impl DuckDbManager {
    /// 创建新的DuckDB管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let (sender, receiver) = mpsc::channel(100);

        // 启动DuckDB Actor
        let actor = DuckDbActor::new(db_path)?;
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };

        // 初始化数据库表
        manager.init_tables().await?;

        Ok(manager)
    }

    /// 创建内存数据库管理器
    pub async fn new_memory() -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);

        // 启动DuckDB Actor（内存模式）
        let actor = DuckDbActor::new_memory()?;
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };

        // 初始化数据库表
        manager.init_tables().await?;

        Ok(manager)
    }

    /// 发送消息并等待Actor响应
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| SnapError::Custom("数据库Actor已关闭".to_string()))?;

        receiver
            .await
            .map_err(|_| SnapError::Custom("等待数据库响应超时".to_string()))?
    }

    /// 初始化数据库表
    async fn init_tables(&self) -> Result<()> {
        self.request(|respond_to| DbMessage::InitTables { respond_to })
            .await
    }

    /// 创建备份记录
    pub async fn create_backup_record(&self, record: NewBackupRow) -> Result<BackupRow> {
        self.request(|respond_to| DbMessage::CreateBackupRecord { record, respond_to })
            .await
    }

    /// 标记备份完成
    pub async fn mark_backup_completed(
        &self,
        id: String,
        archive_path: String,
        size_bytes: i64,
    ) -> Result<BackupRow> {
        self.request(|respond_to| DbMessage::MarkBackupCompleted {
            id,
            archive_path,
            size_bytes,
            respond_to,
        })
        .await
    }

    /// 标记备份失败
    pub async fn mark_backup_failed(&self, id: String, error_message: String) -> Result<BackupRow> {
        self.request(|respond_to| DbMessage::MarkBackupFailed {
            id,
            error_message,
            respond_to,
        })
        .await
    }

    /// 记录成功恢复时间
    pub async fn mark_backup_restored(&self, id: String, restored_at: DateTime<Utc>) -> Result<()> {
        self.request(|respond_to| DbMessage::MarkBackupRestored {
            id,
            restored_at,
            respond_to,
        })
        .await
    }

    /// 获取所有备份记录
    pub async fn get_all_backups(&self) -> Result<Vec<BackupRow>> {
        self.request(|respond_to| DbMessage::GetAllBackups { respond_to })
            .await
    }

    /// 根据ID获取备份记录
    pub async fn get_backup_by_id(&self, id: String) -> Result<Option<BackupRow>> {
        self.request(|respond_to| DbMessage::GetBackupById { id, respond_to })
            .await
    }

    /// 删除备份记录
    pub async fn delete_backup_record(&self, id: String) -> Result<bool> {
        self.request(|respond_to| DbMessage::DeleteBackupRecord { id, respond_to })
            .await
    }

    /// 写入审计事件并等待结果
    pub async fn record_audit_event(&self, event: AuditEventRow) -> Result<i64> {
        self.request(|respond_to| DbMessage::RecordAuditEvent {
            event,
            respond_to: Some(respond_to),
        })
        .await
    }

    /// 非阻塞写入审计事件，不等待结果
    ///
    /// 可在同步上下文（如阻塞线程池）中调用。队列已满或Actor已关闭时返回错误。
    pub fn record_audit_event_nowait(&self, event: AuditEventRow) -> Result<()> {
        self.sender
            .try_send(DbMessage::RecordAuditEvent {
                event,
                respond_to: None,
            })
            .map_err(|e| SnapError::Custom(format!("审计事件入队失败: {e}")))
    }

    /// 查询审计事件
    pub async fn list_audit_events(
        &self,
        record_id: Option<String>,
        limit: usize,
    ) -> Result<Vec<AuditEventRow>> {
        self.request(|respond_to| DbMessage::ListAuditEvents {
            record_id,
            limit,
            respond_to,
        })
        .await
    }
}
