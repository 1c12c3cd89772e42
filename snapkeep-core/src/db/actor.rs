use crate::{Result, SnapError};
use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::DbMessage;
use super::models::{AuditEventRow, BackupRow, NewBackupRow};

const BACKUP_COLUMNS: &str = "id, name, created_at, created_by, backup_kind, status, \
     archive_path, size_bytes, error_message, notes, last_restored_at";

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

fn backup_from_row(row: &Row<'_>) -> duckdb::Result<BackupRow> {
    Ok(BackupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        created_by: row.get(3)?,
        backup_kind: row.get(4)?,
        status: row.get(5)?,
        archive_path: row.get(6)?,
        size_bytes: row.get(7)?,
        error_message: row.get(8)?,
        notes: row.get(9)?,
        last_restored_at: row.get(10)?,
    })
}

fn audit_event_from_row(row: &Row<'_>) -> duckdb::Result<AuditEventRow> {
    Ok(AuditEventRow {
        id: row.get(0)?,
        phase: row.get(1)?,
        record_id: row.get(2)?,
        status: row.get(3)?,
        actor: row.get(4)?,
        occurred_at: row.get(5)?,
        detail: row.get(6)?,
    })
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let result = self.init_tables();
                let _ = respond_to.send(result);
            }
            DbMessage::CreateBackupRecord { record, respond_to } => {
                let result = self.create_backup_record(&record);
                let _ = respond_to.send(result);
            }
            DbMessage::MarkBackupCompleted {
                id,
                archive_path,
                size_bytes,
                respond_to,
            } => {
                let result = self.mark_backup_completed(&id, &archive_path, size_bytes);
                let _ = respond_to.send(result);
            }
            DbMessage::MarkBackupFailed {
                id,
                error_message,
                respond_to,
            } => {
                let result = self.mark_backup_failed(&id, &error_message);
                let _ = respond_to.send(result);
            }
            DbMessage::MarkBackupRestored {
                id,
                restored_at,
                respond_to,
            } => {
                let result = self.mark_backup_restored(&id, restored_at);
                let _ = respond_to.send(result);
            }
            DbMessage::GetAllBackups { respond_to } => {
                let result = self.get_all_backups();
                let _ = respond_to.send(result);
            }
            DbMessage::GetBackupById { id, respond_to } => {
                let result = self.get_backup_by_id(&id);
                let _ = respond_to.send(result);
            }
            DbMessage::DeleteBackupRecord { id, respond_to } => {
                let result = self.delete_backup_record(&id);
                let _ = respond_to.send(result);
            }
            DbMessage::RecordAuditEvent { event, respond_to } => {
                let result = self.record_audit_event(&event);
                match respond_to {
                    Some(respond_to) => {
                        let _ = respond_to.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("写入审计事件失败: {}", e);
                        }
                    }
                }
            }
            DbMessage::ListAuditEvents {
                record_id,
                limit,
                respond_to,
            } => {
                let result = self.list_audit_events(record_id.as_deref(), limit);
                let _ = respond_to.send(result);
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        // 读取并执行SQL初始化脚本
        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';') {
            let executable = statement
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            let trimmed = executable.trim();
            if !trimmed.is_empty() {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    /// 创建备份记录
    fn create_backup_record(&mut self, record: &NewBackupRow) -> Result<BackupRow> {
        self.connection.execute(
            "INSERT INTO backups (id, name, created_at, created_by, backup_kind, status, size_bytes, notes)
             VALUES (?, ?, ?, ?, ?, 'in_progress', 0, ?)",
            params![
                record.id,
                record.name,
                record.created_at,
                record.created_by,
                record.backup_kind,
                record.notes
            ],
        )?;

        self.get_backup_by_id(&record.id)?
            .ok_or_else(|| SnapError::ledger(format!("无法读取刚创建的备份记录: {}", record.id)))
    }

    /// 仅在进行中状态时迁移，否则说明记录不存在或已是终态
    fn ensure_transitioned(&mut self, id: &str, updated: usize) -> Result<BackupRow> {
        let row = self
            .get_backup_by_id(id)?
            .ok_or_else(|| SnapError::RecordNotFound(id.to_string()))?;
        if updated == 0 {
            return Err(SnapError::ledger(format!(
                "备份记录 {id} 已处于终态 {}，不允许再次变更",
                row.status
            )));
        }
        Ok(row)
    }

    fn mark_backup_completed(
        &mut self,
        id: &str,
        archive_path: &str,
        size_bytes: i64,
    ) -> Result<BackupRow> {
        let updated = self.connection.execute(
            "UPDATE backups SET status = 'completed', archive_path = ?, size_bytes = ?
             WHERE id = ? AND status = 'in_progress'",
            params![archive_path, size_bytes, id],
        )?;
        self.ensure_transitioned(id, updated)
    }

    fn mark_backup_failed(&mut self, id: &str, error_message: &str) -> Result<BackupRow> {
        let updated = self.connection.execute(
            "UPDATE backups SET status = 'failed', error_message = ?
             WHERE id = ? AND status = 'in_progress'",
            params![error_message, id],
        )?;
        self.ensure_transitioned(id, updated)
    }

    fn mark_backup_restored(&mut self, id: &str, restored_at: DateTime<Utc>) -> Result<()> {
        let updated = self.connection.execute(
            "UPDATE backups SET last_restored_at = ? WHERE id = ? AND status = 'completed'",
            params![restored_at, id],
        )?;
        if updated == 0 {
            return Err(SnapError::RecordNotFound(id.to_string()));
        }
        Ok(())
    }

    /// 获取所有备份记录
    fn get_all_backups(&mut self) -> Result<Vec<BackupRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups ORDER BY created_at DESC, id"
        ))?;

        let backup_iter = stmt.query_map([], backup_from_row)?;

        let mut backups = Vec::new();
        for backup in backup_iter {
            backups.push(backup?);
        }

        Ok(backups)
    }

    /// 根据ID获取备份记录
    fn get_backup_by_id(&mut self, id: &str) -> Result<Option<BackupRow>> {
        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {BACKUP_COLUMNS} FROM backups WHERE id = ?"))?;

        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(backup_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// 删除备份记录
    fn delete_backup_record(&mut self, id: &str) -> Result<bool> {
        let deleted = self
            .connection
            .execute("DELETE FROM backups WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// 写入审计事件
    fn record_audit_event(&mut self, event: &AuditEventRow) -> Result<i64> {
        let id: i64 = self.connection.query_row(
            "INSERT INTO audit_events (phase, record_id, status, actor, occurred_at, detail)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            params![
                event.phase,
                event.record_id,
                event.status,
                event.actor,
                event.occurred_at,
                event.detail
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// 查询审计事件
    fn list_audit_events(
        &mut self,
        record_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEventRow>> {
        let limit = limit as i64;
        let base = "SELECT id, phase, record_id, status, actor, occurred_at, detail FROM audit_events";
        let mut stmt;
        let event_iter = match record_id {
            Some(record_id) => {
                stmt = self.connection.prepare(&format!(
                    "{base} WHERE record_id = ? ORDER BY id DESC LIMIT ?"
                ))?;
                stmt.query_map(params![record_id, limit], audit_event_from_row)?
            }
            None => {
                stmt = self
                    .connection
                    .prepare(&format!("{base} ORDER BY id DESC LIMIT ?"))?;
                stmt.query_map(params![limit], audit_event_from_row)?
            }
        };

        let mut events = Vec::new();
        for event in event_iter {
            events.push(event?);
        }
        Ok(events)
    }
}
