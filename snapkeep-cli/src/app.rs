use snapkeep_core::{
    AppConfig, BackupManager, BackupRecordStore, LedgerAuditSink, SnapError, SystemSettings,
    error::Result,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::cli::Commands;
use crate::commands;

pub struct CliApp {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub ledger: BackupRecordStore,
    pub backup_manager: BackupManager,
    /// 当前生效的系统设置，恢复后整体替换并写回文件
    pub settings: SystemSettings,
    pub actor: Option<String>,
}

impl CliApp {
    /// 加载配置并初始化各组件
    pub async fn new(config_path: &Path, actor: Option<String>) -> Result<Self> {
        let config = AppConfig::find_and_load_config(config_path)?;
        debug!("已加载配置: {}", config_path.display());

        let ledger = BackupRecordStore::connect(config.get_ledger_db_path()).await?;
        let backup_manager = BackupManager::from_config(&config, ledger.clone())
            .with_audit_sink(Arc::new(LedgerAuditSink::new(ledger.clone())));
        let settings = SystemSettings::load_from_file(config.get_settings_path())?;

        Ok(Self {
            config,
            config_path: config_path.to_path_buf(),
            ledger,
            backup_manager,
            settings,
            actor,
        })
    }

    /// 运行应用命令
    pub async fn run(&mut self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Init { .. } => {
                return Err(SnapError::custom("init 命令需要在加载配置之前执行").into());
            }
            Commands::Backup {
                partial,
                datastore,
                assets,
                include_config,
                destination,
                notes,
            } => {
                commands::run_backup(
                    self,
                    commands::BackupArgs {
                        partial,
                        datastore,
                        assets,
                        include_config,
                        destination,
                        notes,
                    },
                )
                .await?
            }
            Commands::ListBackups => commands::run_list_backups(self).await?,
            Commands::Show { id } => commands::run_show(self, parse_backup_id(&id)?).await?,
            Commands::Restore { id, force } => {
                commands::run_restore(self, parse_backup_id(&id)?, force).await?
            }
            Commands::Delete { id, force } => {
                commands::run_delete(self, parse_backup_id(&id)?, force).await?
            }
            Commands::Download { id, output } => {
                commands::run_download(self, parse_backup_id(&id)?, output).await?
            }
            Commands::Verify { id } => commands::run_verify(self, parse_backup_id(&id)?).await?,
            Commands::Prune { days } => commands::run_prune(self, days).await?,
            Commands::Audit { backup_id, limit } => {
                let backup_id = backup_id.as_deref().map(parse_backup_id).transpose()?;
                commands::run_audit(self, backup_id, limit).await?
            }
            Commands::Settings => commands::show_settings(self)?,
        }
        Ok(())
    }
}

/// 解析命令行中的备份ID
pub fn parse_backup_id(raw: &str) -> Result<Uuid> {
    Ok(Uuid::parse_str(raw.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_backup_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_backup_id(&format!(" {id} ")).unwrap(), id);
        assert!(matches!(
            parse_backup_id("42").unwrap_err(),
            SnapError::Uuid(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_config_reports_config_not_found() {
        let temp_dir = tempdir().unwrap();
        let err = CliApp::new(&temp_dir.path().join("config.toml"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SnapError::ConfigNotFound));
    }
}
