use crate::capture::CapturePhase;
use crate::restore::RestoreStep;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapError>;

#[derive(Error, Debug)]
pub enum SnapError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("UUID 错误: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("路径错误: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("备份路径无效: {path} ({reason})")]
    PathInvalid { path: String, reason: String },

    #[error("备份路径不可写: {path} ({reason})")]
    PathNotWritable { path: String, reason: String },

    #[error("采集阶段 {phase} 失败: {cause}")]
    Capture { phase: CapturePhase, cause: String },

    #[error("归档文件为空或不存在: {0}")]
    ArchiveEmpty(String),

    #[error("创建归档失败: {0}")]
    ArchiveCreate(String),

    #[error("备份 {id} 当前状态为 {status}，不允许恢复")]
    RestoreNotAllowed { id: String, status: String },

    #[error("归档缺少必要成员: {0}")]
    RestoreMemberMissing(String),

    #[error("归档成员已损坏: {0}")]
    RestoreMemberCorrupt(String),

    #[error("恢复步骤 {step} 失败: {cause}")]
    RestoreApply { step: RestoreStep, cause: String },

    #[error("备份台账错误: {0}")]
    Ledger(String),

    #[error("备份记录不存在: {0}")]
    RecordNotFound(String),

    #[error("备份 {id} 当前状态为 {status}，尚未完成")]
    BackupNotCompleted { id: String, status: String },

    #[error("备份文件不存在: {0}")]
    ArchiveMissing(String),

    #[error("部分备份至少需要选择一个采集阶段")]
    EmptySelection,

    #[error("自定义错误: {0}")]
    Custom(String),

    #[error("配置文件未找到")]
    ConfigNotFound,
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for SnapError {
    fn from(err: duckdb::Error) -> Self {
        SnapError::DuckDb(err.to_string())
    }
}

impl SnapError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn capture(phase: CapturePhase, cause: impl ToString) -> Self {
        Self::Capture {
            phase,
            cause: cause.to_string(),
        }
    }

    pub fn restore_apply(step: RestoreStep, cause: impl ToString) -> Self {
        Self::RestoreApply {
            step,
            cause: cause.to_string(),
        }
    }

    /// 错误分类名称，写入失败记录的 error_message 前缀
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathInvalid { .. } => "PathInvalid",
            Self::PathNotWritable { .. } => "PathNotWritable",
            Self::Capture { .. } => "CaptureError",
            Self::ArchiveEmpty(_) => "ArchiveEmptyError",
            Self::ArchiveCreate(_) => "ArchiveCreateError",
            Self::RestoreNotAllowed { .. } => "RestoreNotAllowed",
            Self::RestoreMemberMissing(_) => "RestoreMemberMissing",
            Self::RestoreMemberCorrupt(_) => "RestoreMemberCorrupt",
            Self::RestoreApply { .. } => "RestoreApplyError",
            Self::Ledger(_) | Self::DuckDb(_) => "LedgerError",
            Self::RecordNotFound(_) => "RecordNotFound",
            Self::BackupNotCompleted { .. } => "BackupNotCompleted",
            Self::ArchiveMissing(_) => "ArchiveMissing",
            Self::EmptySelection => "EmptySelection",
            Self::ConfigNotFound | Self::Config(_) => "ConfigError",
            Self::Io(_)
            | Self::Uuid(_)
            | Self::Serde(_)
            | Self::Join(_)
            | Self::WalkDir(_)
            | Self::StripPrefix(_)
            | Self::Custom(_) => "InternalError",
        }
    }

    /// 带分类前缀的完整诊断信息
    pub fn diagnostic(&self) -> String {
        format!("{}: {}", self.code(), self)
    }

    /// 采集流程中的非预期错误统一归为协调阶段的采集错误
    pub fn into_capture_error(self) -> Self {
        match self {
            Self::Capture { .. } | Self::ArchiveEmpty(_) | Self::ArchiveCreate(_) => self,
            other => Self::capture(CapturePhase::Coordinator, other),
        }
    }

    /// 恢复流程中的非预期错误统一归为恢复应用错误
    pub fn into_restore_error(self, step: RestoreStep) -> Self {
        match self {
            Self::RestoreApply { .. }
            | Self::RestoreNotAllowed { .. }
            | Self::RestoreMemberMissing(_)
            | Self::RestoreMemberCorrupt(_)
            | Self::RecordNotFound(_)
            | Self::ArchiveMissing(_) => self,
            other => Self::restore_apply(step, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_names_taxonomy() {
        let err = SnapError::ArchiveEmpty("/tmp/a.tar.gz".to_string());
        assert!(err.diagnostic().starts_with("ArchiveEmptyError: "));
        assert!(err.diagnostic().contains("/tmp/a.tar.gz"));
    }

    #[test]
    fn test_unexpected_error_normalized_to_capture() {
        let io = std::io::Error::other("磁盘已满");
        let err = SnapError::from(io).into_capture_error();
        match &err {
            SnapError::Capture { phase, cause } => {
                assert_eq!(*phase, CapturePhase::Coordinator);
                assert!(cause.contains("磁盘已满"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.diagnostic().starts_with("CaptureError: "));
    }

    #[test]
    fn test_restore_errors_keep_their_class() {
        let err = SnapError::RestoreMemberMissing("datastore.dump".to_string())
            .into_restore_error(RestoreStep::Extract);
        assert!(matches!(err, SnapError::RestoreMemberMissing(_)));

        let err = SnapError::custom("boom").into_restore_error(RestoreStep::Assets);
        assert!(matches!(
            err,
            SnapError::RestoreApply {
                step: RestoreStep::Assets,
                ..
            }
        ));
    }
}
