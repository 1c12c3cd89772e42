use snapkeep_core::{AppConfig, BackupRecordStore, SystemSettings, error::Result};
use std::path::Path;
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(config_path: &Path, force: bool) -> Result<()> {
    info!("🗂️  Snapkeep 初始化");
    info!("==================");

    if !force && config_path.exists() {
        warn!("⚠️  检测到已存在的配置文件: {}", config_path.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: snapkeep init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件和目录结构");

    let config = AppConfig::default();
    config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    std::fs::create_dir_all(config.get_backup_dir())?;
    std::fs::create_dir_all(config.get_asset_root())?;
    info!("   ✅ 创建目录结构:");
    info!("      - {}  (备份存储目录)", config.backup.storage_dir);
    info!("      - {}  (资源文件目录)", config.assets.root_dir);

    info!("📋 步骤 2: 初始化备份台账");

    let ledger_path = config.get_ledger_db_path();
    BackupRecordStore::connect(&ledger_path).await?;
    info!("   ✅ 创建DuckDB台账数据库: {}", ledger_path.display());

    info!("📋 步骤 3: 写入默认系统设置");

    let settings_path = config.get_settings_path();
    if settings_path.exists() && !force {
        info!("   ↪ 保留已有系统设置: {}", settings_path.display());
    } else {
        SystemSettings::default().save_to_file(&settings_path)?;
        info!("   ✅ 创建系统设置文件: {}", settings_path.display());
    }

    info!("🎉 初始化完成！");
    info!("");
    info!("📝 接下来的步骤:");
    info!("   1️⃣  编辑 {} 确认数据存储和资源目录位置", config_path.display());
    info!("   2️⃣  运行 'snapkeep backup' 创建第一个完整备份");
    info!("   3️⃣  运行 'snapkeep list-backups' 查看备份记录");
    info!("");
    info!("💡 提示:");
    info!("   - 环境变量 BACKUP_ROOT 可以修改默认备份目录（仅在 init 时生效）");
    info!("   - 使用 'snapkeep --help' 查看所有可用命令");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_keeps_existing_config_without_force() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "# existing\n").unwrap();

        run_init(&config_path, false).await.unwrap();
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "# existing\n");
    }
}
