use crate::app::CliApp;
use snapkeep_core::{AuditStatus, error::Result};
use tracing::{info, warn};
use uuid::Uuid;

/// 查看审计事件（最新在前）
pub async fn run_audit(app: &CliApp, backup_id: Option<Uuid>, limit: usize) -> Result<()> {
    let events = app.ledger.list_audit_events(backup_id, limit).await?;

    if events.is_empty() {
        info!("📜 暂无审计事件");
        return Ok(());
    }

    info!("📜 审计事件");
    info!("============");
    for event in &events {
        let record = event
            .record_id
            .map(|id| id.simple().to_string()[..8].to_string())
            .unwrap_or_else(|| "-".to_string());
        let line = format!(
            "{} {:<20} {:<10} 备份={} 操作人={} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.phase,
            event.status,
            record,
            event.actor.as_deref().unwrap_or("system"),
            event.detail.as_deref().unwrap_or("")
        );
        match event.status {
            AuditStatus::Failed | AuditStatus::Rejected => warn!("{}", line),
            _ => info!("{}", line),
        }
    }
    info!("共 {} 条", events.len());
    Ok(())
}
