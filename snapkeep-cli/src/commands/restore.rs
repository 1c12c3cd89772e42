use crate::app::CliApp;
use crate::utils::confirm;
use snapkeep_core::error::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 从备份恢复
pub async fn run_restore(app: &mut CliApp, id: Uuid, force: bool) -> Result<()> {
    let record = app.backup_manager.get_backup(id).await?;

    if !force {
        warn!("⚠️  警告: 此操作将覆盖当前的数据存储、资源文件和系统设置!");
        warn!("   恢复失败时不会自动回滚");
        if !confirm(&format!("请确认您要从备份 {} 恢复", record.name))? {
            warn!("操作已取消");
            return Ok(());
        }
    }

    info!("♻️  开始恢复: {}", record.name);

    let report = match app
        .backup_manager
        .restore_backup(id, &mut app.settings, app.actor.clone())
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("❌ 恢复失败: {}", e);
            error!("   备份ID: {}", id);
            error!("   诊断信息: {}", e.diagnostic());
            return Err(e);
        }
    };

    if let (Some(tables), Some(rows)) = (report.tables_restored, report.rows_restored) {
        info!("   ✅ 数据存储: {} 张表, {} 行", tables, rows);
    }
    if let Some(stats) = &report.assets {
        info!(
            "   ✅ 资源文件: {} 个文件, {} 个目录",
            stats.files, stats.dirs
        );
    }
    if report.config_restored {
        let settings_path = app.config.get_settings_path();
        app.settings.save_to_file(&settings_path)?;
        info!("   ✅ 系统设置已写回: {}", settings_path.display());
    }

    info!("🎉 恢复完成");
    Ok(())
}
