// 备份编排入口
//
// 把路径校验、台账、采集、归档、恢复和审计串成完整流程：
// 校验 -> 创建记录(in_progress) -> 采集到暂存目录 -> 压缩归档 -> 标记完成或失败。
// 耗时的文件操作在阻塞线程池中执行，台账访问通过 DuckDB Actor 串行化。

use crate::archive::{ArchiveBuilder, ArchiveOutcome, Compressor, TarGzCompressor, verify_archive};
use crate::audit::{AuditPhase, AuditSink, AuditTrail, TracingAuditSink};
use crate::capture::{CaptureCoordinator, CapturePhase, CaptureSelection};
use crate::config::AppConfig;
use crate::constants::backup::BACKUP_EXTENSION;
use crate::datastore::DataStore;
use crate::error::{Result, SnapError};
use crate::ledger::{BackupKind, BackupRecord, BackupRecordStore, BackupStatus};
use crate::manifest::ArchiveManifest;
use crate::path_validator::PathValidator;
use crate::restore::{RestoreCoordinator, RestoreReport, RestoreStep};
use crate::settings::SystemSettings;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;


/// 备份请求
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub kind: BackupKind,
    /// 目标目录，None 时使用默认备份根目录
    pub destination: Option<String>,
    pub include_datastore: bool,
    pub include_assets: bool,
    pub include_config: bool,
    pub created_by: Option<String>,
    pub notes: Option<String>,
}

impl BackupRequest {
    /// 完整备份请求
    pub fn full() -> Self {
        Self {
            kind: BackupKind::Full,
            destination: None,
            include_datastore: true,
            include_assets: true,
            include_config: true,
            created_by: None,
            notes: None,
        }
    }

    /// 部分备份请求，包含的阶段由调用方选择
    pub fn partial(include_datastore: bool, include_assets: bool, include_config: bool) -> Self {
        Self {
            kind: BackupKind::Partial,
            include_datastore,
            include_assets,
            include_config,
            ..Self::full()
        }
    }

    /// 完整备份忽略选择标志，总是包含全部阶段
    pub fn selection(&self) -> CaptureSelection {
        match self.kind {
            BackupKind::Full => CaptureSelection::full(),
            BackupKind::Partial => CaptureSelection {
                include_datastore: self.include_datastore,
                include_assets: self.include_assets,
                include_config: self.include_config,
            },
        }
    }
}

/// 下载内容
#[derive(Debug, Clone)]
pub struct BackupDownload {
    pub filename: String,
    pub content: Vec<u8>,
}

/// 备份管理器
#[derive(Clone)]
pub struct BackupManager {
    ledger: BackupRecordStore,
    validator: PathValidator,
    capture: CaptureCoordinator,
    restore: RestoreCoordinator,
    archive_builder: ArchiveBuilder,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("ledger", &self.ledger)
            .field("validator", &self.validator)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

impl BackupManager {
    /// 创建新的备份管理器，默认只把审计事件写入日志
    pub fn new(
        ledger: BackupRecordStore,
        validator: PathValidator,
        capture: CaptureCoordinator,
        restore: RestoreCoordinator,
        archive_builder: ArchiveBuilder,
    ) -> Self {
        Self {
            ledger,
            validator,
            capture,
            restore,
            archive_builder,
            sinks: vec![Arc::new(TracingAuditSink)],
        }
    }

    /// 按配置文件组装各组件
    pub fn from_config(config: &AppConfig, ledger: BackupRecordStore) -> Self {
        let datastore = DataStore::new(
            config.get_datastore_path(),
            config.datastore.excluded_tables.clone(),
        );
        let asset_root = config.get_asset_root();

        Self::new(
            ledger,
            PathValidator::new(config.get_backup_dir()),
            CaptureCoordinator::new(datastore.clone(), &asset_root),
            RestoreCoordinator::new(datastore, &asset_root),
            ArchiveBuilder::new(Arc::new(TarGzCompressor::new(
                config.backup.compression_level,
            ))),
        )
    }

    /// 追加审计接收方
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// 替换压缩实现
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.archive_builder = ArchiveBuilder::new(compressor);
        self
    }

    pub fn ledger(&self) -> &BackupRecordStore {
        &self.ledger
    }

    /// 创建备份
    ///
    /// 校验失败时不会产生任何台账记录；记录创建之后的任何失败都会把该记录
    /// 标记为失败并保留，暂存目录总是被清理。
    pub async fn create_backup(
        &self,
        request: BackupRequest,
        settings: &SystemSettings,
    ) -> Result<BackupRecord> {
        let audit = AuditTrail::new(self.sinks.clone(), request.created_by.clone());
        let selection = request.selection();

        if selection.is_empty() {
            let err = SnapError::EmptySelection;
            audit.rejected(AuditPhase::Validation, &err);
            return Err(err);
        }

        let validator = self.validator.clone();
        let destination = request.destination.clone();
        let validated = tokio::task::spawn_blocking(move || validator.validate(destination.as_deref()))
            .await
            .map_err(SnapError::from)
            .and_then(|result| result);
        let dest = match validated {
            Ok(dest) => dest,
            Err(e) => {
                warn!("🚫 备份目标校验失败: {}", e);
                audit.rejected(AuditPhase::Validation, &e);
                return Err(e);
            }
        };
        audit.succeeded(AuditPhase::Validation, dest.display().to_string());

        let record = self
            .ledger
            .create(request.kind, request.created_by.clone(), request.notes.clone())
            .await?;
        let audit = audit.for_record(record.id);
        info!(
            "💾 开始{}备份: {} -> {}",
            match record.kind {
                BackupKind::Full => "完整",
                BackupKind::Partial => "部分",
            },
            record.name,
            dest.display()
        );

        let capture = self.capture.clone();
        let archive_builder = self.archive_builder.clone();
        let settings = settings.clone();
        let job_record = record.clone();
        let job_audit = audit.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            capture_and_archive(
                &capture,
                &archive_builder,
                &job_record,
                &dest,
                selection,
                &settings,
                &job_audit,
            )
        })
        .await
        .map_err(|e| SnapError::capture(CapturePhase::Coordinator, e))
        .and_then(|result| result);

        match outcome {
            Ok(outcome) => self.finish_completed(&record, outcome).await,
            Err(e) => {
                let err = e.into_capture_error();
                self.finish_failed(&record, &err).await;
                Err(err)
            }
        }
    }

    async fn finish_completed(
        &self,
        record: &BackupRecord,
        outcome: ArchiveOutcome,
    ) -> Result<BackupRecord> {
        match self
            .ledger
            .mark_completed(record.id, &outcome.path, outcome.size_bytes)
            .await
        {
            Ok(completed) => {
                info!(
                    "✅ 备份完成: {} ({})",
                    completed.name,
                    completed.display_size()
                );
                Ok(completed)
            }
            Err(e) => {
                error!("❌ 更新备份记录失败，删除已生成的归档: {}", e);
                if let Err(remove_err) = std::fs::remove_file(&outcome.path) {
                    warn!(
                        "删除归档失败 {}: {}",
                        outcome.path.display(),
                        remove_err
                    );
                }
                self.finish_failed(record, &e).await;
                Err(e)
            }
        }
    }

    async fn finish_failed(&self, record: &BackupRecord, err: &SnapError) {
        error!("❌ 备份失败: {} - {}", record.name, err);
        if let Err(mark_err) = self.ledger.mark_failed(record.id, &err.diagnostic()).await {
            error!(
                "标记备份失败时出错，记录 {} 可能停留在进行中状态: {}",
                record.id, mark_err
            );
        }
    }

    /// 从备份恢复，成功后 `settings` 被归档中的设置整体替换
    pub async fn restore_backup(
        &self,
        id: Uuid,
        settings: &mut SystemSettings,
        actor: Option<String>,
    ) -> Result<RestoreReport> {
        let record = self.ledger.require(id).await?;
        let audit = AuditTrail::new(self.sinks.clone(), actor).for_record(id);

        let coordinator = self.restore.clone();
        let mut working = settings.clone();
        let (report, restored) = tokio::task::spawn_blocking(move || {
            let report = coordinator.restore(&record, &mut working, &audit)?;
            Ok::<_, SnapError>((report, working))
        })
        .await
        .map_err(|e| SnapError::restore_apply(RestoreStep::Coordinator, e))
        .and_then(|result| result)
        .map_err(|e| e.into_restore_error(RestoreStep::Coordinator))?;

        *settings = restored;

        if let Err(e) = self.ledger.mark_restored(id).await {
            warn!("记录恢复时间失败 {}: {}", id, e);
        }
        Ok(report)
    }

    /// 删除备份记录及其归档文件
    pub async fn delete_backup(&self, id: Uuid, actor: Option<String>) -> Result<BackupRecord> {
        let audit = AuditTrail::new(self.sinks.clone(), actor).for_record(id);
        audit.started(AuditPhase::Delete);

        match self.ledger.delete(id).await {
            Ok(record) => {
                audit.succeeded(AuditPhase::Delete, record.name.clone());
                Ok(record)
            }
            Err(e) => {
                audit.failed(AuditPhase::Delete, &e);
                Err(e)
            }
        }
    }

    /// 获取所有备份记录
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        self.ledger.list().await
    }

    /// 获取单个备份记录（用于查询状态）
    pub async fn get_backup(&self, id: Uuid) -> Result<BackupRecord> {
        self.ledger.require(id).await
    }

    /// 读取已完成备份的归档内容
    pub async fn download_backup(&self, id: Uuid) -> Result<BackupDownload> {
        let record = self.ledger.require(id).await?;
        let path = completed_archive(&record)?;
        let content = tokio::fs::read(&path).await?;

        Ok(BackupDownload {
            filename: record.download_file_name(),
            content,
        })
    }

    /// 完整读取归档的每个条目，返回条目数
    pub async fn verify_backup(&self, id: Uuid) -> Result<u64> {
        let record = self.ledger.require(id).await?;
        let path = completed_archive(&record)?;

        let entries = tokio::task::spawn_blocking(move || verify_archive(&path)).await??;
        info!("🔍 备份 {} 校验通过: {} 个条目", record.name, entries);
        Ok(entries)
    }

    /// 删除超过保留天数的终态备份，进行中的记录不受影响
    pub async fn prune_backups(
        &self,
        retention_days: u32,
        actor: Option<String>,
    ) -> Result<Vec<BackupRecord>> {
        if retention_days == 0 {
            return Err(SnapError::custom("保留天数必须大于 0"));
        }
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        self.prune_before(cutoff, actor).await
    }

    pub(crate) async fn prune_before(
        &self,
        cutoff: DateTime<Utc>,
        actor: Option<String>,
    ) -> Result<Vec<BackupRecord>> {
        let mut pruned = Vec::new();
        for record in self.ledger.list().await? {
            if record.status.is_terminal() && record.created_at < cutoff {
                pruned.push(self.delete_backup(record.id, actor.clone()).await?);
            }
        }

        if !pruned.is_empty() {
            info!("🧹 已清理 {} 个过期备份", pruned.len());
        }
        Ok(pruned)
    }
}

fn completed_archive(record: &BackupRecord) -> Result<PathBuf> {
    if record.status != BackupStatus::Completed {
        return Err(SnapError::BackupNotCompleted {
            id: record.id.to_string(),
            status: record.status.to_string(),
        });
    }
    match record.archive_file() {
        Some(path) if path.is_file() => Ok(path),
        _ => Err(SnapError::ArchiveMissing(
            record
                .archive_path
                .clone()
                .unwrap_or_else(|| record.id.to_string()),
        )),
    }
}

/// 归档文件名: `<记录名>_<id前8位>.tar.gz`
fn archive_file_name(record: &BackupRecord) -> String {
    let id = record.id.simple().to_string();
    format!("{}_{}{}", record.name, &id[..8], BACKUP_EXTENSION)
}

fn capture_and_archive(
    capture: &CaptureCoordinator,
    archive_builder: &ArchiveBuilder,
    record: &BackupRecord,
    dest: &Path,
    selection: CaptureSelection,
    settings: &SystemSettings,
    audit: &AuditTrail,
) -> Result<ArchiveOutcome> {
    audit.started(AuditPhase::Capture);
    let output = match capture.capture(dest, selection, settings, audit).and_then(|output| {
        ArchiveManifest::new(record, selection, output.datastore_sha256.clone())
            .write_to(output.staging.path())
            .map_err(|e| SnapError::capture(CapturePhase::Manifest, e))?;
        Ok(output)
    }) {
        Ok(output) => {
            audit.succeeded(AuditPhase::Capture, None);
            output
        }
        Err(e) => {
            audit.failed(AuditPhase::Capture, &e);
            return Err(e);
        }
    };

    audit.started(AuditPhase::Archive);
    match archive_builder.build(output.staging, &dest.join(archive_file_name(record))) {
        Ok(outcome) => {
            audit.succeeded(
                AuditPhase::Archive,
                format!("size={} entries={}", outcome.size_bytes, outcome.entries),
            );
            Ok(outcome)
        }
        Err(e) => {
            audit.failed(AuditPhase::Archive, &e);
            Err(e)
        }
    }
}
