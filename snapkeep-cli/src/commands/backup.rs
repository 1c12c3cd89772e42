use crate::app::CliApp;
use crate::utils::confirm;
use anyhow::Context;
use snapkeep_core::{
    BackupKind, BackupRecord, BackupRequest, BackupStatus, error::Result, format_size,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

/// backup 子命令参数
#[derive(Debug, Clone, Default)]
pub struct BackupArgs {
    pub partial: bool,
    pub datastore: bool,
    pub assets: bool,
    pub include_config: bool,
    pub destination: Option<String>,
    pub notes: Option<String>,
}

impl BackupArgs {
    fn into_request(self, actor: Option<String>) -> BackupRequest {
        let mut request = if self.partial {
            BackupRequest::partial(self.datastore, self.assets, self.include_config)
        } else {
            BackupRequest::full()
        };
        request.destination = self.destination;
        request.notes = self.notes;
        request.created_by = actor;
        request
    }
}

fn kind_display(kind: BackupKind) -> &'static str {
    match kind {
        BackupKind::Full => "完整",
        BackupKind::Partial => "部分",
    }
}

fn status_display(status: BackupStatus) -> &'static str {
    match status {
        BackupStatus::InProgress => "⏳ 进行中",
        BackupStatus::Completed => "✅ 已完成",
        BackupStatus::Failed => "❌ 失败",
    }
}

/// 创建备份
pub async fn run_backup(app: &CliApp, args: BackupArgs) -> Result<()> {
    info!("💾 创建备份");
    info!("===========");

    let request = args.into_request(app.actor.clone());
    if request.kind == BackupKind::Partial {
        let selection = request.selection();
        info!("   备份类型: 部分备份");
        info!(
            "   包含内容: 数据存储[{}] 资源文件[{}] 系统设置[{}]",
            if selection.include_datastore { "✓" } else { " " },
            if selection.include_assets { "✓" } else { " " },
            if selection.include_config { "✓" } else { " " }
        );
    } else {
        info!("   备份类型: 完整备份");
    }
    info!(
        "   备份目录: {}",
        request
            .destination
            .clone()
            .unwrap_or_else(|| app.config.get_backup_dir().display().to_string())
    );

    match app
        .backup_manager
        .create_backup(request, &app.settings)
        .await
    {
        Ok(record) => {
            info!("🎉 备份创建成功！");
            print_record(&record);
            Ok(())
        }
        Err(e) => {
            error!("❌ 备份创建失败: {}", e);
            info!("💡 请检查:");
            info!("   - 备份目录是否为绝对路径且有写入权限");
            info!("   - 磁盘空间是否充足");
            info!("   - 数据存储和资源目录是否可读");
            info!("   失败的备份记录会保留，可通过 'snapkeep list-backups' 查看");
            Err(e)
        }
    }
}

fn print_record(record: &BackupRecord) {
    info!("   备份ID: {}", record.id);
    info!("   名称: {}", record.name);
    info!("   类型: {}", kind_display(record.kind));
    info!("   状态: {}", status_display(record.status));
    info!(
        "   创建时间: {}",
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(created_by) = &record.created_by {
        info!("   创建人: {}", created_by);
    }
    if let Some(path) = &record.archive_path {
        info!("   备份文件: {}", path);
        info!("   文件大小: {}", record.display_size());
    }
    if let Some(message) = &record.error_message {
        warn!("   失败原因: {}", message);
    }
    if let Some(notes) = &record.notes {
        info!("   备注: {}", notes);
    }
    if let Some(restored_at) = record.last_restored_at {
        info!(
            "   最近恢复时间: {}",
            restored_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

/// 列出备份
pub async fn run_list_backups(app: &CliApp) -> Result<()> {
    let backups = app.backup_manager.list_backups().await?;

    if backups.is_empty() {
        info!("📦 暂无备份记录");
        info!("💡 使用以下命令创建备份:");
        info!("   snapkeep backup");
        return Ok(());
    }

    info!("📦 备份列表");
    info!("============");
    info!(
        "{:<10} {:<24} {:<6} {:<10} {:<20} {:<12} {}",
        "ID", "名称", "类型", "状态", "创建时间", "大小", "创建人"
    );
    info!("{}", "-".repeat(100));

    let mut completed = 0;
    let mut failed = 0;
    let mut missing_files = 0;
    let mut total_size = 0u64;

    for backup in &backups {
        let id = backup.id.simple().to_string();
        let size = match backup.status {
            BackupStatus::Completed => {
                completed += 1;
                total_size += backup.size_bytes;
                backup.display_size()
            }
            BackupStatus::Failed => {
                failed += 1;
                "---".to_string()
            }
            BackupStatus::InProgress => "---".to_string(),
        };

        info!(
            "{:<10} {:<24} {:<6} {:<10} {:<20} {:<12} {}",
            &id[..8],
            backup.name,
            kind_display(backup.kind),
            status_display(backup.status),
            backup.created_at.format("%Y-%m-%d %H:%M:%S"),
            size,
            backup.created_by.as_deref().unwrap_or("-")
        );

        if backup.status == BackupStatus::Completed {
            let exists = backup.archive_file().is_some_and(|p| p.exists());
            if !exists {
                missing_files += 1;
                warn!("     ⚠️  备份文件不存在，无法用于恢复");
            }
        }
        if let Some(message) = &backup.error_message {
            warn!("     失败原因: {}", message);
        }
    }

    info!("{}", "-".repeat(100));
    info!("📊 备份统计:");
    info!("   总备份数: {}", backups.len());
    info!("   已完成: {} ✅", completed);
    if failed > 0 {
        warn!("   失败: {} ❌", failed);
    }
    if missing_files > 0 {
        warn!("   文件缺失: {}", missing_files);
    }
    info!("   总大小: {}", format_size(total_size));

    info!("💡 可用操作:");
    info!("   - 查看详情: snapkeep show <备份ID>");
    info!("   - 从备份恢复: snapkeep restore <备份ID>");
    Ok(())
}

/// 显示单个备份
pub async fn run_show(app: &CliApp, id: Uuid) -> Result<()> {
    let record = app.backup_manager.get_backup(id).await?;
    info!("📋 备份详情");
    info!("============");
    print_record(&record);
    Ok(())
}

/// 删除备份
pub async fn run_delete(app: &CliApp, id: Uuid, force: bool) -> Result<()> {
    let record = app.backup_manager.get_backup(id).await?;

    if !force {
        warn!("⚠️  将删除备份记录 {} 及其归档文件", record.name);
        if !confirm("确认删除")? {
            warn!("操作已取消");
            return Ok(());
        }
    }

    let deleted = app.backup_manager.delete_backup(id, app.actor.clone()).await?;
    info!("🗑️  备份已删除: {}", deleted.name);
    Ok(())
}

/// 导出备份归档
pub async fn run_download(app: &CliApp, id: Uuid, output: Option<PathBuf>) -> anyhow::Result<()> {
    let download = app.backup_manager.download_backup(id).await?;
    let output = output.unwrap_or_else(|| PathBuf::from(&download.filename));

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建输出目录失败: {}", parent.display()))?;
        }
    }
    tokio::fs::write(&output, &download.content)
        .await
        .with_context(|| format!("写入备份文件失败: {}", output.display()))?;

    info!(
        "📥 备份已导出: {} ({})",
        output.display(),
        format_size(download.content.len() as u64)
    );
    Ok(())
}

/// 校验备份归档
pub async fn run_verify(app: &CliApp, id: Uuid) -> Result<()> {
    let entries = app.backup_manager.verify_backup(id).await?;
    info!("✅ 归档完整，共 {} 个条目", entries);
    Ok(())
}

/// 清理过期备份
pub async fn run_prune(app: &CliApp, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(app.settings.backup.backup_retention_days);
    info!("🧹 清理 {} 天前的备份...", days);

    let pruned = app
        .backup_manager
        .prune_backups(days, app.actor.clone())
        .await?;

    if pruned.is_empty() {
        info!("没有需要清理的备份");
    } else {
        for record in &pruned {
            info!("   - {} ({})", record.name, status_display(record.status));
        }
        info!("✅ 共清理 {} 个备份", pruned.len());
    }
    Ok(())
}
