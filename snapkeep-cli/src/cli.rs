use crate::project_info::{metadata, version_info};
use clap::{Parser, Subcommand};
use snapkeep_core::constants::config::CONFIG_FILE_NAME;
use std::path::PathBuf;

/// Snapkeep CLI - 应用快照备份与恢复工具
#[derive(Parser, Debug)]
#[command(name = "snapkeep")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    /// 操作人，写入备份记录和审计事件
    #[arg(long, env = "SNAPKEEP_ACTOR")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 首次使用时初始化，创建配置文件、目录和台账数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 创建备份
    Backup {
        /// 部分备份，只包含下面选中的内容
        #[arg(long)]
        partial: bool,
        /// 部分备份时包含数据存储
        #[arg(long, requires = "partial")]
        datastore: bool,
        /// 部分备份时包含资源文件
        #[arg(long, requires = "partial")]
        assets: bool,
        /// 部分备份时包含系统设置
        #[arg(long = "config", requires = "partial")]
        include_config: bool,
        /// 备份目标目录（绝对路径），默认使用配置中的 storage_dir
        #[arg(long)]
        destination: Option<String>,
        /// 备注
        #[arg(long)]
        notes: Option<String>,
    },
    /// 列出所有备份
    ListBackups,
    /// 显示单个备份的详细信息和状态
    Show {
        /// 备份ID
        id: String,
    },
    /// 从备份恢复（覆盖当前数据存储、资源文件和系统设置）
    Restore {
        /// 备份ID
        id: String,
        /// 跳过确认提示
        #[arg(long)]
        force: bool,
    },
    /// 删除备份记录及归档文件
    Delete {
        /// 备份ID
        id: String,
        /// 跳过确认提示
        #[arg(long)]
        force: bool,
    },
    /// 导出备份归档到指定位置
    Download {
        /// 备份ID
        id: String,
        /// 输出文件路径，默认当前目录下的 <备份名>.tar.gz
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 校验备份归档完整性
    Verify {
        /// 备份ID
        id: String,
    },
    /// 删除超过保留天数的备份（不影响进行中的备份）
    Prune {
        /// 保留天数，默认使用系统设置中的 backup_retention_days
        #[arg(long)]
        days: Option<u32>,
    },
    /// 查看审计事件
    Audit {
        /// 只显示指定备份的事件
        #[arg(long)]
        backup_id: Option<String>,
        /// 最多显示的条数
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// 显示当前系统设置
    Settings,
}
