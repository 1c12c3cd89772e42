use crate::constants::{backup, config, datastore};
use crate::error::{Result, SnapError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub backup: BackupConfig,
    pub datastore: DataStoreConfig,
    pub assets: AssetsConfig,
    pub ledger: LedgerConfig,
    pub settings: SettingsConfig,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackupConfig {
    pub storage_dir: String,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

/// 数据存储相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DataStoreConfig {
    pub path: String,
    #[serde(default = "default_excluded_tables")]
    pub excluded_tables: Vec<String>,
}

/// 资源文件相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AssetsConfig {
    pub root_dir: String,
}

/// 备份台账相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LedgerConfig {
    pub db_path: String,
}

/// 系统设置文件配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SettingsConfig {
    pub path: String,
}

fn default_compression_level() -> u32 {
    backup::DEFAULT_COMPRESSION_LEVEL
}

fn default_excluded_tables() -> Vec<String> {
    datastore::DEFAULT_EXCLUDED_TABLES
        .iter()
        .map(|t| t.to_string())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup: BackupConfig {
                storage_dir: backup::get_default_storage_dir()
                    .to_string_lossy()
                    .to_string(),
                compression_level: default_compression_level(),
            },
            datastore: DataStoreConfig {
                path: config::get_datastore_path().to_string_lossy().to_string(),
                excluded_tables: default_excluded_tables(),
            },
            assets: AssetsConfig {
                root_dir: config::get_asset_root().to_string_lossy().to_string(),
            },
            ledger: LedgerConfig {
                db_path: config::get_ledger_db_path().to_string_lossy().to_string(),
            },
            settings: SettingsConfig {
                path: config::get_settings_path().to_string_lossy().to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 从指定文件加载配置，文件不存在时返回 ConfigNotFound
    pub fn find_and_load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SnapError::ConfigNotFound);
        }
        tracing::info!("找到配置文件: {}", path.display());
        Self::load_from_file(path)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        let excluded_tables = toml::Value::Array(
            self.datastore
                .excluded_tables
                .iter()
                .cloned()
                .map(toml::Value::String)
                .collect(),
        );

        TEMPLATE
            .replace("{backup_storage_dir}", &self.backup.storage_dir)
            .replace(
                "{compression_level}",
                &self.backup.compression_level.to_string(),
            )
            .replace("{datastore_path}", &self.datastore.path)
            .replace("{excluded_tables}", &excluded_tables.to_string())
            .replace("{asset_root_dir}", &self.assets.root_dir)
            .replace("{ledger_db_path}", &self.ledger.db_path)
            .replace("{settings_path}", &self.settings.path)
    }

    fn validate(&self) -> Result<()> {
        if self.backup.compression_level > 9 {
            return Err(SnapError::custom(format!(
                "压缩级别必须在 0-9 之间: {}",
                self.backup.compression_level
            )));
        }
        Ok(())
    }

    /// 获取默认备份目录
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.backup.storage_dir)
    }

    /// 获取业务数据存储路径
    pub fn get_datastore_path(&self) -> PathBuf {
        PathBuf::from(&self.datastore.path)
    }

    /// 获取资源文件根目录
    pub fn get_asset_root(&self) -> PathBuf {
        PathBuf::from(&self.assets.root_dir)
    }

    /// 获取台账数据库路径
    pub fn get_ledger_db_path(&self) -> PathBuf {
        PathBuf::from(&self.ledger.db_path)
    }

    /// 获取系统设置文件路径
    pub fn get_settings_path(&self) -> PathBuf {
        PathBuf::from(&self.settings.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_template_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.backup.storage_dir = r"C:\Backups\snapkeep".to_string();
        config.backup.compression_level = 9;
        config.datastore.excluded_tables = vec!["sessions".to_string(), "cache".to_string()];
        config.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Snapkeep 配置文件"));

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_reports_not_found() {
        let temp_dir = tempdir().unwrap();
        let result = AppConfig::find_and_load_config(temp_dir.path().join("missing.toml"));
        assert!(matches!(result, Err(SnapError::ConfigNotFound)));
    }

    #[test]
    fn test_invalid_compression_level_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.backup.compression_level = 12;
        config.save_to_file(&path).unwrap();

        assert!(AppConfig::load_from_file(&path).is_err());
    }
}
