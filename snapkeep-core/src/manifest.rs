use crate::capture::CaptureSelection;
use crate::constants::backup::{ARCHIVE_FORMAT_VERSION, MANIFEST_NAME};
use crate::constants::version::version_info::CORE_VERSION;
use crate::error::{Result, SnapError};
use crate::ledger::{BackupKind, BackupRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// 归档清单，声明归档包含哪些成员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub format_version: u32,
    pub record_id: Uuid,
    pub record_name: String,
    pub kind: BackupKind,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub includes: CaptureSelection,
    pub datastore_sha256: Option<String>,
    pub producer: String,
}

impl ArchiveManifest {
    pub fn new(
        record: &BackupRecord,
        includes: CaptureSelection,
        datastore_sha256: Option<String>,
    ) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            record_id: record.id,
            record_name: record.name.clone(),
            kind: record.kind,
            created_at: record.created_at,
            created_by: record.created_by.clone(),
            includes,
            datastore_sha256,
            producer: format!("snapkeep-core {CORE_VERSION}"),
        }
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(dir.join(MANIFEST_NAME), json)?;
        Ok(())
    }

    /// 读取清单，不存在时返回 None
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let manifest: ArchiveManifest = serde_json::from_str(&content).map_err(|e| {
            SnapError::RestoreMemberCorrupt(format!("{MANIFEST_NAME}: {e}"))
        })?;
        if manifest.format_version > ARCHIVE_FORMAT_VERSION {
            return Err(SnapError::RestoreMemberCorrupt(format!(
                "{MANIFEST_NAME}: 不支持的归档格式版本 {}",
                manifest.format_version
            )));
        }
        Ok(Some(manifest))
    }
}
