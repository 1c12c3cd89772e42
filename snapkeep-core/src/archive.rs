use crate::error::{Result, SnapError};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::{Archive, Builder};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 把暂存目录压缩成单个归档文件
pub trait Compressor: Send + Sync {
    fn compress(&self, source_dir: &Path, dest: &Path) -> Result<()>;
}

/// tar + gzip 压缩器
#[derive(Debug, Clone)]
pub struct TarGzCompressor {
    level: u32,
}

impl TarGzCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Compressor for TarGzCompressor {
    fn compress(&self, source_dir: &Path, dest: &Path) -> Result<()> {
        let file = File::create(dest)?;
        let encoder = GzEncoder::new(file, Compression::new(self.level));
        let mut archive = Builder::new(encoder);
        archive.follow_symlinks(false);

        for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            let relative = path.strip_prefix(source_dir)?;

            // tar归档内部统一使用Unix风格路径
            let archive_path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                archive
                    .append_dir(&archive_path, path)
                    .map_err(|e| SnapError::ArchiveCreate(format!("添加目录到归档失败: {e}")))?;
            } else {
                archive
                    .append_path_with_name(path, &archive_path)
                    .map_err(|e| SnapError::ArchiveCreate(format!("添加文件到归档失败: {e}")))?;
            }
        }

        let encoder = archive
            .into_inner()
            .map_err(|e| SnapError::ArchiveCreate(format!("完成归档失败: {e}")))?;
        let file = encoder
            .finish()
            .map_err(|e| SnapError::ArchiveCreate(format!("完成压缩失败: {e}")))?;
        file.sync_all()?;
        Ok(())
    }
}

/// 归档构建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub entries: u64,
}

/// 归档构建器
#[derive(Clone)]
pub struct ArchiveBuilder {
    compressor: Arc<dyn Compressor>,
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder").finish_non_exhaustive()
    }
}

impl ArchiveBuilder {
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self { compressor }
    }

    /// 压缩暂存目录并校验产物
    ///
    /// 成功时删除暂存目录，归档成为唯一产物；失败时删除残留的归档文件，
    /// 暂存目录随所有权一并释放。
    pub fn build(&self, staging: TempDir, dest: &Path) -> Result<ArchiveOutcome> {
        info!("📦 开始创建归档: {}", dest.display());

        match self.compress_and_verify(staging.path(), dest) {
            Ok(outcome) => {
                close_staging(staging);
                info!(
                    "   ✅ 归档创建成功: {} ({} 字节, {} 个条目)",
                    outcome.path.display(),
                    outcome.size_bytes,
                    outcome.entries
                );
                Ok(outcome)
            }
            Err(e) => {
                remove_partial_archive(dest);
                close_staging(staging);
                Err(e)
            }
        }
    }

    fn compress_and_verify(&self, staging: &Path, dest: &Path) -> Result<ArchiveOutcome> {
        self.compressor
            .compress(staging, dest)
            .map_err(|e| match e {
                SnapError::ArchiveCreate(_) | SnapError::ArchiveEmpty(_) => e,
                other => SnapError::ArchiveCreate(other.to_string()),
            })?;

        // 压缩调用可能吞掉磁盘写满等错误，这里以实际文件为准
        let size_bytes = match std::fs::metadata(dest) {
            Ok(metadata) if metadata.is_file() && metadata.len() > 0 => metadata.len(),
            Ok(_) => return Err(SnapError::ArchiveEmpty(dest.display().to_string())),
            Err(e) => {
                return Err(SnapError::ArchiveEmpty(format!(
                    "{} ({e})",
                    dest.display()
                )));
            }
        };

        let entries = verify_archive(dest)
            .map_err(|e| SnapError::ArchiveCreate(format!("归档校验失败: {e}")))?;

        Ok(ArchiveOutcome {
            path: dest.to_path_buf(),
            size_bytes,
            entries,
        })
    }
}

fn close_staging(staging: TempDir) {
    let path = staging.path().to_path_buf();
    match staging.close() {
        Ok(()) => debug!("已删除暂存目录: {}", path.display()),
        Err(e) => warn!("删除暂存目录失败 {}: {}", path.display(), e),
    }
}

fn remove_partial_archive(dest: &Path) {
    if dest.exists() {
        if let Err(e) = std::fs::remove_file(dest) {
            warn!("删除残留归档失败 {}: {}", dest.display(), e);
        }
    }
}

/// 完整读取归档的每个条目，返回条目数
pub fn verify_archive(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        std::io::copy(&mut entry, &mut std::io::sink())?;
        count += 1;
    }
    Ok(count)
}

/// 解压归档到指定目录
pub fn extract_archive(path: &Path, target_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(target_dir)?;
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);
    archive.unpack(target_dir)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// 模拟磁盘写满：只创建空文件且不报错
    pub(crate) struct ZeroByteCompressor;

    impl Compressor for ZeroByteCompressor {
        fn compress(&self, _source_dir: &Path, dest: &Path) -> Result<()> {
            File::create(dest)?;
            Ok(())
        }
    }

    struct BrokenCompressor;

    impl Compressor for BrokenCompressor {
        fn compress(&self, _source_dir: &Path, dest: &Path) -> Result<()> {
            std::fs::write(dest, b"not a gzip stream")?;
            Err(SnapError::custom("写入中断"))
        }
    }

    fn staging_with_content(parent: &Path) -> TempDir {
        let staging = tempfile::Builder::new()
            .prefix(".staging_")
            .tempdir_in(parent)
            .unwrap();
        std::fs::write(staging.path().join("config.json"), b"{}\n").unwrap();
        std::fs::create_dir_all(staging.path().join("assets").join("empty")).unwrap();
        staging
    }

    #[test]
    fn test_build_and_extract() {
        let temp_dir = tempdir().unwrap();
        let staging = staging_with_content(temp_dir.path());
        let staging_path = staging.path().to_path_buf();
        let dest = temp_dir.path().join("backup.tar.gz");

        let builder = ArchiveBuilder::new(Arc::new(TarGzCompressor::new(6)));
        let outcome = builder.build(staging, &dest).unwrap();

        assert!(outcome.size_bytes > 0);
        assert_eq!(outcome.entries, 3);
        assert!(!staging_path.exists());

        let extracted = temp_dir.path().join("extracted");
        extract_archive(&dest, &extracted).unwrap();
        assert_eq!(std::fs::read(extracted.join("config.json")).unwrap(), b"{}\n");
        assert!(extracted.join("assets").join("empty").is_dir());
    }

    #[test]
    fn test_zero_byte_archive_rejected() {
        let temp_dir = tempdir().unwrap();
        let staging = staging_with_content(temp_dir.path());
        let staging_path = staging.path().to_path_buf();
        let dest = temp_dir.path().join("backup.tar.gz");

        let builder = ArchiveBuilder::new(Arc::new(ZeroByteCompressor));
        let err = builder.build(staging, &dest).unwrap_err();

        assert!(matches!(err, SnapError::ArchiveEmpty(_)));
        assert!(!staging_path.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn test_compressor_failure_maps_to_archive_create() {
        let temp_dir = tempdir().unwrap();
        let staging = staging_with_content(temp_dir.path());
        let dest = temp_dir.path().join("backup.tar.gz");

        let builder = ArchiveBuilder::new(Arc::new(BrokenCompressor));
        let err = builder.build(staging, &dest).unwrap_err();

        assert!(matches!(err, SnapError::ArchiveCreate(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("garbage.tar.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();
        assert!(verify_archive(&path).is_err());
    }
}
