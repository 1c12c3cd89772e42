use crate::archive::extract_archive;
use crate::audit::{AuditPhase, AuditTrail};
use crate::capture::{AssetCopyStats, CaptureSelection, mirror_tree};
use crate::constants::backup::{ASSETS_DIR_NAME, CONFIG_SNAPSHOT_NAME, DATASTORE_DUMP_NAME};
use crate::datastore::{DataStore, DataStoreDump};
use crate::error::{Result, SnapError};
use crate::ledger::{BackupKind, BackupRecord, BackupStatus};
use crate::manifest::ArchiveManifest;
use crate::settings::SystemSettings;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 恢复步骤，按执行顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    Extract,
    DataStore,
    Assets,
    Config,
    Coordinator,
}

impl fmt::Display for RestoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestoreStep::Extract => "extract",
            RestoreStep::DataStore => "datastore",
            RestoreStep::Assets => "assets",
            RestoreStep::Config => "config",
            RestoreStep::Coordinator => "coordinator",
        };
        f.write_str(name)
    }
}

impl RestoreStep {
    fn audit_phase(self) -> AuditPhase {
        match self {
            RestoreStep::Extract => AuditPhase::RestoreExtract,
            RestoreStep::DataStore => AuditPhase::RestoreDataStore,
            RestoreStep::Assets => AuditPhase::RestoreAssets,
            RestoreStep::Config => AuditPhase::RestoreConfig,
            RestoreStep::Coordinator => AuditPhase::Restore,
        }
    }
}

/// 恢复结果摘要
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub record_id: Uuid,
    pub tables_restored: Option<usize>,
    pub rows_restored: Option<usize>,
    pub assets: Option<AssetCopyStats>,
    pub config_restored: bool,
}

/// 解压并校验完毕、尚未应用的归档内容
struct PreparedRestore {
    _workdir: TempDir,
    dump: Option<DataStoreDump>,
    assets_dir: Option<PathBuf>,
    settings: Option<SystemSettings>,
}

/// 恢复协调器
#[derive(Debug, Clone)]
pub struct RestoreCoordinator {
    datastore: DataStore,
    asset_root: PathBuf,
}

impl RestoreCoordinator {
    pub fn new(datastore: DataStore, asset_root: impl Into<PathBuf>) -> Self {
        Self {
            datastore,
            asset_root: asset_root.into(),
        }
    }

    /// 用已完成的备份覆盖当前状态
    ///
    /// 顺序固定：数据存储、资源文件、系统设置。所有成员在修改任何现有状态之前
    /// 完成校验；应用阶段失败不会回滚，需要人工核对。
    pub(crate) fn restore(
        &self,
        record: &BackupRecord,
        settings: &mut SystemSettings,
        audit: &AuditTrail,
    ) -> Result<RestoreReport> {
        if record.status != BackupStatus::Completed {
            let err = SnapError::RestoreNotAllowed {
                id: record.id.to_string(),
                status: record.status.to_string(),
            };
            warn!("🚫 拒绝恢复: {}", err);
            audit.rejected(AuditPhase::Restore, &err);
            return Err(err);
        }

        let archive = match record.archive_file() {
            Some(path) if path.is_file() => path,
            _ => {
                let err = SnapError::ArchiveMissing(
                    record.archive_path.clone().unwrap_or_else(|| record.id.to_string()),
                );
                audit.rejected(AuditPhase::Restore, &err);
                return Err(err);
            }
        };

        info!("♻️  开始从备份恢复: {} ({})", record.name, archive.display());
        audit.started(AuditPhase::Restore);

        match self.prepare_and_apply(record, &archive, settings, audit) {
            Ok(report) => {
                audit.succeeded(AuditPhase::Restore, None);
                info!("✅ 恢复完成: {}", record.name);
                Ok(report)
            }
            Err(e) => {
                audit.failed(AuditPhase::Restore, &e);
                Err(e)
            }
        }
    }

    fn prepare_and_apply(
        &self,
        record: &BackupRecord,
        archive: &Path,
        settings: &mut SystemSettings,
        audit: &AuditTrail,
    ) -> Result<RestoreReport> {
        let step = RestoreStep::Extract;
        audit.started(step.audit_phase());
        let prepared = match prepare(record, archive) {
            Ok(prepared) => {
                audit.succeeded(step.audit_phase(), None);
                prepared
            }
            Err(e) => {
                let err = e.into_restore_error(step);
                error!("❌ 恢复准备失败，现有状态未被修改: {}", err);
                audit.failed(step.audit_phase(), &err);
                return Err(err);
            }
        };

        let mut report = RestoreReport {
            record_id: record.id,
            tables_restored: None,
            rows_restored: None,
            assets: None,
            config_restored: false,
        };

        if let Some(dump) = &prepared.dump {
            self.apply_step(record, archive, RestoreStep::DataStore, audit, || {
                self.datastore.replace_with(dump)
            })?;
            report.tables_restored = Some(dump.tables.len());
            report.rows_restored = Some(dump.row_count());
        }

        if let Some(assets_dir) = &prepared.assets_dir {
            let stats = self.apply_step(record, archive, RestoreStep::Assets, audit, || {
                replace_asset_tree(assets_dir, &self.asset_root)
            })?;
            report.assets = Some(stats);
        }

        if let Some(restored) = prepared.settings {
            self.apply_step(record, archive, RestoreStep::Config, audit, || {
                *settings = restored;
                Ok(())
            })?;
            report.config_restored = true;
        }

        Ok(report)
    }

    fn apply_step<T>(
        &self,
        record: &BackupRecord,
        archive: &Path,
        step: RestoreStep,
        audit: &AuditTrail,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        info!("   ▶ 恢复步骤: {}", step);
        audit.started(step.audit_phase());
        match f() {
            Ok(value) => {
                audit.succeeded(step.audit_phase(), None);
                Ok(value)
            }
            Err(e) => {
                let err = match e {
                    SnapError::RestoreApply { .. } => e,
                    other => SnapError::restore_apply(step, other),
                };
                error!(
                    "❌ 恢复步骤失败: record={} step={} archive={} cause={}",
                    record.id,
                    step,
                    archive.display(),
                    err
                );
                error!("⚠️  现有状态可能已被部分覆盖，不会自动回滚，需要人工核对");
                audit.failed(step.audit_phase(), &err);
                Err(err)
            }
        }
    }
}

/// 解压到新的临时目录并校验所有成员
fn prepare(record: &BackupRecord, archive: &Path) -> Result<PreparedRestore> {
    let workdir = tempfile::Builder::new().prefix(".restore_").tempdir()?;
    extract_archive(archive, workdir.path())?;
    debug!("已解压到: {}", workdir.path().display());

    let root = workdir.path();
    let manifest = ArchiveManifest::read_from(root)?;
    let claims = claimed_members(record.kind, manifest.as_ref(), root);

    let dump = if claims.include_datastore {
        let path = require_member(root, DATASTORE_DUMP_NAME)?;
        let bytes = std::fs::read(&path)?;
        if let Some(expected) = manifest.as_ref().and_then(|m| m.datastore_sha256.as_deref()) {
            let actual = format!("{:x}", Sha256::digest(&bytes));
            if actual != expected {
                return Err(SnapError::RestoreMemberCorrupt(format!(
                    "{DATASTORE_DUMP_NAME}: 校验和不匹配 (期望 {expected}, 实际 {actual})"
                )));
            }
        }
        let dump = DataStoreDump::from_slice(&bytes)
            .map_err(|e| SnapError::RestoreMemberCorrupt(format!("{DATASTORE_DUMP_NAME}: {e}")))?;
        Some(dump)
    } else {
        None
    };

    let assets_dir = if claims.include_assets {
        let path = require_member(root, ASSETS_DIR_NAME)?;
        if !path.is_dir() {
            return Err(SnapError::RestoreMemberCorrupt(format!(
                "{ASSETS_DIR_NAME}: 不是目录"
            )));
        }
        Some(path)
    } else {
        None
    };

    let settings = if claims.include_config {
        let path = require_member(root, CONFIG_SNAPSHOT_NAME)?;
        let content = std::fs::read_to_string(&path)?;
        let settings: SystemSettings = serde_json::from_str(&content).map_err(|e| {
            SnapError::RestoreMemberCorrupt(format!("{CONFIG_SNAPSHOT_NAME}: {e}"))
        })?;
        settings.validate().map_err(|e| {
            SnapError::RestoreMemberCorrupt(format!("{CONFIG_SNAPSHOT_NAME}: {e}"))
        })?;
        Some(settings)
    } else {
        None
    };

    Ok(PreparedRestore {
        _workdir: workdir,
        dump,
        assets_dir,
        settings,
    })
}

/// 归档声明包含的成员
///
/// 有清单时以清单为准；没有清单时，完整备份视为三者都包含，
/// 部分备份按实际存在的成员处理。
fn claimed_members(
    kind: BackupKind,
    manifest: Option<&ArchiveManifest>,
    root: &Path,
) -> CaptureSelection {
    match (manifest, kind) {
        (Some(manifest), _) => manifest.includes,
        (None, BackupKind::Full) => CaptureSelection::full(),
        (None, BackupKind::Partial) => CaptureSelection {
            include_datastore: root.join(DATASTORE_DUMP_NAME).exists(),
            include_assets: root.join(ASSETS_DIR_NAME).exists(),
            include_config: root.join(CONFIG_SNAPSHOT_NAME).exists(),
        },
    }
}

fn require_member(root: &Path, name: &str) -> Result<PathBuf> {
    let path = root.join(name);
    if !path.exists() {
        return Err(SnapError::RestoreMemberMissing(name.to_string()));
    }
    Ok(path)
}

/// 清空资源目录后整体复制
fn replace_asset_tree(source: &Path, asset_root: &Path) -> Result<AssetCopyStats> {
    if asset_root.exists() {
        std::fs::remove_dir_all(asset_root)?;
    }
    let stats = mirror_tree(source, asset_root)?;
    info!("   ✅ 资源文件已恢复: {}", stats);
    Ok(stats)
}
