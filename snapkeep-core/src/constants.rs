/// 备份归档相关常量
pub mod backup {
    use std::path::{Path, PathBuf};

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 覆盖默认备份根目录的环境变量
    pub const BACKUP_ROOT_ENV: &str = "BACKUP_ROOT";

    /// 备份名称前缀
    pub const BACKUP_PREFIX: &str = "backup_";

    /// 备份文件扩展名
    pub const BACKUP_EXTENSION: &str = ".tar.gz";

    /// 备份名称中的时间格式
    pub const BACKUP_NAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// 暂存目录前缀
    pub const STAGING_PREFIX: &str = ".staging_";

    /// 写入探测文件前缀
    pub const WRITE_PROBE_PREFIX: &str = ".write_test_";

    /// 默认 gzip 压缩级别
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

    /// 归档成员: 数据存储导出文件
    pub const DATASTORE_DUMP_NAME: &str = "datastore.dump";

    /// 归档成员: 资源文件目录
    pub const ASSETS_DIR_NAME: &str = "assets";

    /// 归档成员: 配置快照
    pub const CONFIG_SNAPSHOT_NAME: &str = "config.json";

    /// 归档成员: 清单文件
    pub const MANIFEST_NAME: &str = "manifest.json";

    /// 归档格式版本
    pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

    /// 获取默认备份存储目录（环境变量优先）
    pub fn get_default_storage_dir() -> PathBuf {
        match std::env::var(BACKUP_ROOT_ENV) {
            Ok(root) if !root.trim().is_empty() => PathBuf::from(root),
            _ => Path::new(".").join(BACKUP_DIR_NAME),
        }
    }
}

/// 数据存储导出相关常量
pub mod datastore {
    /// 内部或易变的记账表，不参与导出和清空
    pub const DEFAULT_EXCLUDED_TABLES: &[&str] = &["sessions", "schema_migrations"];

    /// 导出格式版本
    pub const DUMP_FORMAT_VERSION: u32 = 1;
}

/// 配置文件和本地数据路径常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 配置文件名
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// 备份台账数据库文件名
    pub const LEDGER_DB_FILE_NAME: &str = "snapkeep.db";

    /// 业务数据存储文件名
    pub const DATASTORE_FILE_NAME: &str = "app.duckdb";

    /// 系统设置文件名
    pub const SETTINGS_FILE_NAME: &str = "settings.json";

    /// 资源文件目录名
    pub const MEDIA_DIR_NAME: &str = "media";

    /// 获取默认台账数据库路径
    pub fn get_ledger_db_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(LEDGER_DB_FILE_NAME)
    }

    /// 获取默认业务数据存储路径
    pub fn get_datastore_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(DATASTORE_FILE_NAME)
    }

    /// 获取默认系统设置文件路径
    pub fn get_settings_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(SETTINGS_FILE_NAME)
    }

    /// 获取默认资源文件目录
    pub fn get_asset_root() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(MEDIA_DIR_NAME)
    }
}

/// 日志相关常量
pub mod logging {
    /// 日志文件路径环境变量，设置后日志输出到文件
    pub const LOG_FILE_ENV: &str = "SNAPKEEP_LOG_FILE";
}

/// 技术版本信息常量
pub mod version {
    pub mod version_info {
        /// 核心库版本（自动同步）
        pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
    }
}
