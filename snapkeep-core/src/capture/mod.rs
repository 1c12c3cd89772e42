// 备份采集模块
//
// 按固定顺序执行三个相互独立的采集阶段，把产物写入目标目录下的暂存目录：
// - datastore_dumper: 数据存储导出 -> datastore.dump
// - asset_copier: 资源文件镜像 -> assets/
// - config_snapshotter: 系统设置快照 -> config.json
//
// 任一阶段失败立即中止并清理暂存目录。

mod asset_copier;
mod config_snapshotter;
mod datastore_dumper;

pub use asset_copier::{AssetCopyStats, copy_assets, mirror_tree};
pub use config_snapshotter::snapshot_config;
pub use datastore_dumper::dump_datastore;

use crate::audit::{AuditPhase, AuditTrail};
use crate::constants::backup::STAGING_PREFIX;
use crate::datastore::DataStore;
use crate::error::{Result, SnapError};
use crate::settings::SystemSettings;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// 采集阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePhase {
    Staging,
    DataStore,
    Assets,
    Config,
    Manifest,
    Coordinator,
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapturePhase::Staging => "staging",
            CapturePhase::DataStore => "datastore",
            CapturePhase::Assets => "assets",
            CapturePhase::Config => "config",
            CapturePhase::Manifest => "manifest",
            CapturePhase::Coordinator => "coordinator",
        };
        f.write_str(name)
    }
}

/// 本次采集包含的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSelection {
    pub include_datastore: bool,
    pub include_assets: bool,
    pub include_config: bool,
}

impl CaptureSelection {
    pub fn full() -> Self {
        Self {
            include_datastore: true,
            include_assets: true,
            include_config: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.include_datastore || self.include_assets || self.include_config)
    }
}

/// 采集结果，暂存目录的所有权交给归档构建
#[derive(Debug)]
pub struct CaptureOutput {
    pub staging: TempDir,
    pub datastore_sha256: Option<String>,
    pub asset_stats: Option<AssetCopyStats>,
}

/// 采集协调器
#[derive(Debug, Clone)]
pub struct CaptureCoordinator {
    datastore: DataStore,
    asset_root: PathBuf,
}

impl CaptureCoordinator {
    pub fn new(datastore: DataStore, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            datastore,
            asset_root: asset_root.into(),
        }
    }

    /// 在目标目录下创建暂存目录并依次执行选中的阶段
    pub(crate) fn capture(
        &self,
        destination: &Path,
        selection: CaptureSelection,
        settings: &SystemSettings,
        audit: &AuditTrail,
    ) -> Result<CaptureOutput> {
        let staging = create_staging_dir(destination)?;
        info!("📂 创建暂存目录: {}", staging.path().display());

        match self.run_phases(staging.path(), selection, settings, audit) {
            Ok((datastore_sha256, asset_stats)) => Ok(CaptureOutput {
                staging,
                datastore_sha256,
                asset_stats,
            }),
            Err(e) => {
                let staging_path = staging.path().to_path_buf();
                if let Err(close_err) = staging.close() {
                    warn!(
                        "清理暂存目录失败 {}: {}",
                        staging_path.display(),
                        close_err
                    );
                } else {
                    debug!("已清理暂存目录: {}", staging_path.display());
                }
                Err(e)
            }
        }
    }

    fn run_phases(
        &self,
        staging: &Path,
        selection: CaptureSelection,
        settings: &SystemSettings,
        audit: &AuditTrail,
    ) -> Result<(Option<String>, Option<AssetCopyStats>)> {
        let mut datastore_sha256 = None;
        let mut asset_stats = None;

        if selection.include_datastore {
            let digest = run_phase(
                audit,
                CapturePhase::DataStore,
                || dump_datastore(&self.datastore, staging),
                |digest| Some(format!("sha256={digest}")),
            )?;
            datastore_sha256 = Some(digest);
        }

        if selection.include_assets {
            let stats = run_phase(
                audit,
                CapturePhase::Assets,
                || copy_assets(&self.asset_root, staging),
                |stats| Some(stats.to_string()),
            )?;
            asset_stats = Some(stats);
        }

        if selection.include_config {
            run_phase(
                audit,
                CapturePhase::Config,
                || snapshot_config(settings, staging),
                |_| None,
            )?;
        }

        Ok((datastore_sha256, asset_stats))
    }
}

fn audit_phase(phase: CapturePhase) -> AuditPhase {
    match phase {
        CapturePhase::DataStore => AuditPhase::DataStoreDump,
        CapturePhase::Assets => AuditPhase::AssetCopy,
        CapturePhase::Config => AuditPhase::ConfigSnapshot,
        _ => AuditPhase::Capture,
    }
}

fn run_phase<T>(
    audit: &AuditTrail,
    phase: CapturePhase,
    f: impl FnOnce() -> Result<T>,
    detail: impl FnOnce(&T) -> Option<String>,
) -> Result<T> {
    audit.started(audit_phase(phase));
    match f() {
        Ok(value) => {
            audit.succeeded(audit_phase(phase), detail(&value));
            Ok(value)
        }
        Err(e) => {
            let err = match e {
                SnapError::Capture { .. } => e,
                other => SnapError::capture(phase, other),
            };
            error!("❌ 采集阶段 {} 失败: {}", phase, err);
            audit.failed(audit_phase(phase), &err);
            Err(err)
        }
    }
}

fn create_staging_dir(destination: &Path) -> Result<TempDir> {
    let prefix = format!(
        "{}{}_",
        STAGING_PREFIX,
        Utc::now().format("%Y%m%d_%H%M%S_%9f")
    );
    tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(destination)
        .map_err(|e| SnapError::capture(CapturePhase::Staging, e))
}
