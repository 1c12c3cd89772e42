use crate::error::{Result, SnapError};
use crate::ledger::BackupRecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 审计事件所属阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
    Validation,
    Capture,
    DataStoreDump,
    AssetCopy,
    ConfigSnapshot,
    Archive,
    Restore,
    RestoreExtract,
    RestoreDataStore,
    RestoreAssets,
    RestoreConfig,
    Delete,
}

/// 审计事件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Succeeded,
    Failed,
    Rejected,
}

impl AuditPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditPhase::Validation => "validation",
            AuditPhase::Capture => "capture",
            AuditPhase::DataStoreDump => "data_store_dump",
            AuditPhase::AssetCopy => "asset_copy",
            AuditPhase::ConfigSnapshot => "config_snapshot",
            AuditPhase::Archive => "archive",
            AuditPhase::Restore => "restore",
            AuditPhase::RestoreExtract => "restore_extract",
            AuditPhase::RestoreDataStore => "restore_data_store",
            AuditPhase::RestoreAssets => "restore_assets",
            AuditPhase::RestoreConfig => "restore_config",
            AuditPhase::Delete => "delete",
        }
    }
}

impl FromStr for AuditPhase {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        let phase = match s {
            "validation" => AuditPhase::Validation,
            "capture" => AuditPhase::Capture,
            "data_store_dump" => AuditPhase::DataStoreDump,
            "asset_copy" => AuditPhase::AssetCopy,
            "config_snapshot" => AuditPhase::ConfigSnapshot,
            "archive" => AuditPhase::Archive,
            "restore" => AuditPhase::Restore,
            "restore_extract" => AuditPhase::RestoreExtract,
            "restore_data_store" => AuditPhase::RestoreDataStore,
            "restore_assets" => AuditPhase::RestoreAssets,
            "restore_config" => AuditPhase::RestoreConfig,
            "delete" => AuditPhase::Delete,
            other => return Err(SnapError::ledger(format!("未知的审计阶段: {other}"))),
        };
        Ok(phase)
    }
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Started => "started",
            AuditStatus::Succeeded => "succeeded",
            AuditStatus::Failed => "failed",
            AuditStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "started" => Ok(AuditStatus::Started),
            "succeeded" => Ok(AuditStatus::Succeeded),
            "failed" => Ok(AuditStatus::Failed),
            "rejected" => Ok(AuditStatus::Rejected),
            other => Err(SnapError::ledger(format!("未知的审计状态: {other}"))),
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段迁移审计事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub phase: AuditPhase,
    pub record_id: Option<Uuid>,
    pub status: AuditStatus,
    pub actor: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub detail: Option<String>,
}

/// 审计事件接收方
///
/// 投递是即发即弃的：返回的错误只会被记录日志，不会影响备份或恢复流程。
pub trait AuditSink: Send + Sync {
    fn notify(&self, event: &AuditEvent) -> Result<()>;
}

/// 输出到 tracing 日志的审计接收方
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn notify(&self, event: &AuditEvent) -> Result<()> {
        let record = event
            .record_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let actor = event.actor.as_deref().unwrap_or("system");
        let detail = event.detail.as_deref().unwrap_or("");

        match event.status {
            AuditStatus::Failed | AuditStatus::Rejected => warn!(
                target: "snapkeep::audit",
                "[{}] {} record={} actor={} {}",
                event.phase, event.status, record, actor, detail
            ),
            _ => info!(
                target: "snapkeep::audit",
                "[{}] {} record={} actor={} {}",
                event.phase, event.status, record, actor, detail
            ),
        }
        Ok(())
    }
}

/// 写入台账数据库 audit_events 表的审计接收方
#[derive(Debug, Clone)]
pub struct LedgerAuditSink {
    store: BackupRecordStore,
}

impl LedgerAuditSink {
    pub fn new(store: BackupRecordStore) -> Self {
        Self { store }
    }
}

impl AuditSink for LedgerAuditSink {
    fn notify(&self, event: &AuditEvent) -> Result<()> {
        self.store.record_audit_event_nowait(event)
    }
}

/// 一次备份或恢复流程内的审计上下文
#[derive(Clone)]
pub(crate) struct AuditTrail {
    sinks: Vec<Arc<dyn AuditSink>>,
    actor: Option<String>,
    record_id: Option<Uuid>,
}

impl AuditTrail {
    pub(crate) fn new(sinks: Vec<Arc<dyn AuditSink>>, actor: Option<String>) -> Self {
        Self {
            sinks,
            actor,
            record_id: None,
        }
    }

    pub(crate) fn for_record(&self, record_id: Uuid) -> Self {
        Self {
            sinks: self.sinks.clone(),
            actor: self.actor.clone(),
            record_id: Some(record_id),
        }
    }

    pub(crate) fn emit(&self, phase: AuditPhase, status: AuditStatus, detail: Option<String>) {
        let event = AuditEvent {
            phase,
            record_id: self.record_id,
            status,
            actor: self.actor.clone(),
            timestamp: Utc::now(),
            detail,
        };

        for sink in &self.sinks {
            if let Err(e) = sink.notify(&event) {
                warn!("审计事件投递失败 ({} {}): {}", phase, status, e);
            }
        }
    }

    pub(crate) fn started(&self, phase: AuditPhase) {
        self.emit(phase, AuditStatus::Started, None);
    }

    pub(crate) fn succeeded(&self, phase: AuditPhase, detail: impl Into<Option<String>>) {
        self.emit(phase, AuditStatus::Succeeded, detail.into());
    }

    pub(crate) fn failed(&self, phase: AuditPhase, err: &SnapError) {
        self.emit(phase, AuditStatus::Failed, Some(err.diagnostic()));
    }

    pub(crate) fn rejected(&self, phase: AuditPhase, err: &SnapError) {
        self.emit(phase, AuditStatus::Rejected, Some(err.diagnostic()));
    }
}
