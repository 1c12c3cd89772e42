use crate::constants::backup::ASSETS_DIR_NAME;
use crate::error::Result;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 资源文件复制统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetCopyStats {
    pub files: u64,
    pub dirs: u64,
    pub bytes: u64,
    pub skipped_links: u64,
}

impl fmt::Display for AssetCopyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files={} dirs={} bytes={} skipped_links={}",
            self.files, self.dirs, self.bytes, self.skipped_links
        )
    }
}

/// 把资源文件树镜像到暂存目录的 `assets/`
///
/// 资源树为空或不存在时仍然创建空的 `assets/` 目录。
pub fn copy_assets(asset_root: &Path, staging: &Path) -> Result<AssetCopyStats> {
    let target = staging.join(ASSETS_DIR_NAME);
    fs::create_dir_all(&target)?;

    if !asset_root.exists() {
        warn!(
            "资源目录不存在，写入空的 assets/: {}",
            asset_root.display()
        );
        return Ok(AssetCopyStats::default());
    }

    info!("🖼️  复制资源文件: {}", asset_root.display());
    let stats = mirror_tree(asset_root, &target)?;
    info!(
        "   ✅ 复制完成: {} 个文件, {} 个目录",
        stats.files, stats.dirs
    );
    Ok(stats)
}

/// 递归镜像目录树，保留相对路径和空目录
///
/// 符号链接只跟随一跳：链接指向的文件或目录会被复制，
/// 但被链接目录内部的符号链接不再跟随。失效链接跳过并记录警告。
pub fn mirror_tree(source: &Path, target: &Path) -> Result<AssetCopyStats> {
    let mut stats = AssetCopyStats::default();
    fs::create_dir_all(target)?;

    for entry in WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source)?;
        let dest = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
            stats.dirs += 1;
        } else if file_type.is_file() {
            stats.bytes += fs::copy(entry.path(), &dest)?;
            stats.files += 1;
        } else if file_type.is_symlink() {
            follow_link_once(entry.path(), &dest, &mut stats)?;
        }
    }

    Ok(stats)
}

fn follow_link_once(link: &Path, dest: &Path, stats: &mut AssetCopyStats) -> Result<()> {
    let metadata = match fs::metadata(link) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("跳过失效的符号链接 {}: {}", link.display(), e);
            stats.skipped_links += 1;
            return Ok(());
        }
    };

    if metadata.is_file() {
        stats.bytes += fs::copy(link, dest)?;
        stats.files += 1;
    } else if metadata.is_dir() {
        debug!("跟随目录链接: {}", link.display());
        copy_linked_dir(link, dest, stats)?;
    }
    Ok(())
}

fn copy_linked_dir(link: &Path, dest: &Path, stats: &mut AssetCopyStats) -> Result<()> {
    fs::create_dir_all(dest)?;
    stats.dirs += 1;

    // 根是链接本身，需要跟随；内部条目不跟随
    for entry in WalkDir::new(link).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(link)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            stats.dirs += 1;
        } else if file_type.is_file() {
            stats.bytes += fs::copy(entry.path(), &target)?;
            stats.files += 1;
        } else if file_type.is_symlink() {
            warn!("跳过嵌套的符号链接: {}", entry.path().display());
            stats.skipped_links += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_structure_preserved() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("media");
        std::fs::create_dir_all(root.join("docs").join("2024")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("logo.svg"), b"<svg/>").unwrap();
        std::fs::write(root.join("docs").join("2024").join("report.pdf"), b"pdf").unwrap();
        let staging = temp_dir.path().join("staging");

        let stats = copy_assets(&root, &staging).unwrap();

        let assets = staging.join(ASSETS_DIR_NAME);
        assert_eq!(std::fs::read(assets.join("logo.svg")).unwrap(), b"<svg/>");
        assert!(assets.join("docs").join("2024").join("report.pdf").is_file());
        assert!(assets.join("empty").is_dir());
        assert_eq!(stats.files, 2);
        assert_eq!(stats.dirs, 3);
        assert_eq!(stats.bytes, 9);
    }

    #[test]
    fn test_empty_or_missing_tree_still_creates_marker() {
        let temp_dir = tempdir().unwrap();
        let empty_root = temp_dir.path().join("media");
        std::fs::create_dir_all(&empty_root).unwrap();

        let staging = temp_dir.path().join("staging-a");
        copy_assets(&empty_root, &staging).unwrap();
        let assets = staging.join(ASSETS_DIR_NAME);
        assert!(assets.is_dir());
        assert_eq!(std::fs::read_dir(&assets).unwrap().count(), 0);

        let staging = temp_dir.path().join("staging-b");
        copy_assets(&temp_dir.path().join("missing"), &staging).unwrap();
        assert!(staging.join(ASSETS_DIR_NAME).is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_followed_one_hop() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempdir().unwrap();
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("shared.txt"), b"shared").unwrap();

        let root = temp_dir.path().join("media");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("real.txt"), b"real").unwrap();
        symlink(root.join("real.txt"), root.join("alias.txt")).unwrap();
        symlink(&outside, root.join("linked")).unwrap();
        // 指回资源根目录的环
        symlink(&root, outside.join("loop")).unwrap();
        symlink(temp_dir.path().join("nowhere"), root.join("broken")).unwrap();

        let target = temp_dir.path().join("copy");
        let stats = mirror_tree(&root, &target).unwrap();

        assert_eq!(std::fs::read(target.join("alias.txt")).unwrap(), b"real");
        assert_eq!(
            std::fs::read(target.join("linked").join("shared.txt")).unwrap(),
            b"shared"
        );
        assert!(!target.join("linked").join("loop").exists());
        assert!(!target.join("broken").exists());
        assert_eq!(stats.skipped_links, 2);
        assert!(!std::fs::symlink_metadata(target.join("alias.txt"))
            .unwrap()
            .file_type()
            .is_symlink());
    }
}
