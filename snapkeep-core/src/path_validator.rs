use crate::constants::backup;
use crate::error::{Result, SnapError};
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

static WINDOWS_ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]:\\").unwrap_or_else(|e| panic!("invalid drive pattern: {e}"))
});

/// 路径语法风格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
    /// 以 `/` 开头
    Posix,
    /// 以 `<盘符>:\` 开头
    Windows,
}

impl PathStyle {
    /// 当前宿主系统的路径风格
    pub fn host() -> Self {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    fn separator(self) -> char {
        match self {
            PathStyle::Posix => '/',
            PathStyle::Windows => '\\',
        }
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> SnapError {
    SnapError::PathInvalid {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn not_writable(path: &Path, reason: impl ToString) -> SnapError {
    SnapError::PathNotWritable {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// 按指定风格规范化路径分隔符并校验绝对路径语法
///
/// 统一分隔符、合并重复分隔符、去掉 `.` 段和末尾分隔符；
/// 拒绝空串、NUL、相对路径和 `..` 段。
pub fn normalize(raw: &str, style: PathStyle) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "路径为空"));
    }
    if trimmed.contains('\0') {
        return Err(invalid(raw, "路径包含 NUL 字符"));
    }

    let sep = style.separator();
    let unified: String = trimmed
        .chars()
        .map(|c| if c == '/' || c == '\\' { sep } else { c })
        .collect();

    let (prefix, rest) = match style {
        PathStyle::Posix => {
            if !unified.starts_with('/') {
                return Err(invalid(raw, "不是以 / 开头的绝对路径"));
            }
            ("/".to_string(), &unified[1..])
        }
        PathStyle::Windows => {
            if !WINDOWS_ABSOLUTE.is_match(&unified) {
                return Err(invalid(raw, "不是以 <盘符>:\\ 开头的绝对路径"));
            }
            (unified[..3].to_ascii_uppercase(), &unified[3..])
        }
    };

    let mut segments = Vec::new();
    for segment in rest.split(sep) {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid(raw, "路径不允许包含 .. 段")),
            s => segments.push(s),
        }
    }

    Ok(format!("{prefix}{}", segments.join(&sep.to_string())))
}

/// 备份目标路径校验器
#[derive(Debug, Clone)]
pub struct PathValidator {
    default_root: PathBuf,
    style: PathStyle,
}

impl PathValidator {
    /// 使用宿主系统路径风格创建校验器
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self::with_style(default_root, PathStyle::host())
    }

    pub fn with_style(default_root: impl Into<PathBuf>, style: PathStyle) -> Self {
        Self {
            default_root: default_root.into(),
            style,
        }
    }

    /// 校验并准备备份目标目录
    ///
    /// 未指定路径时使用默认根目录。目录不存在则创建，随后写入并删除探测文件
    /// 以证明可写。所有失败都发生在台账记录创建之前。
    pub fn validate(&self, destination: Option<&str>) -> Result<PathBuf> {
        let dir = match destination {
            Some(raw) => PathBuf::from(normalize(raw, self.style)?),
            None => self.resolved_default_root()?,
        };

        debug!("校验备份目标目录: {}", dir.display());

        std::fs::create_dir_all(&dir).map_err(|e| not_writable(&dir, e))?;
        if !dir.is_dir() {
            return Err(not_writable(&dir, "目标不是目录"));
        }
        self.probe_writable(&dir)?;

        info!("备份目标目录可用: {}", dir.display());
        Ok(dir)
    }

    fn resolved_default_root(&self) -> Result<PathBuf> {
        if self.default_root.is_absolute() {
            return Ok(self.default_root.clone());
        }
        let cwd = std::env::current_dir().map_err(|e| not_writable(&self.default_root, e))?;
        let joined = cwd.join(&self.default_root);
        // 去掉 "./" 之类的当前目录段
        Ok(joined.components().collect())
    }

    fn probe_writable(&self, dir: &Path) -> Result<()> {
        let probe = dir.join(format!(
            "{}{}",
            backup::WRITE_PROBE_PREFIX,
            Uuid::new_v4().simple()
        ));

        let write_result = (|| -> std::io::Result<()> {
            let mut file = OpenOptions::new().write(true).create_new(true).open(&probe)?;
            file.write_all(b"ok")?;
            file.sync_all()
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&probe);
            return Err(not_writable(dir, format!("写入探测文件失败: {e}")));
        }

        std::fs::remove_file(&probe)
            .map_err(|e| not_writable(dir, format!("删除探测文件失败: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_relative_path_rejected() {
        for style in [PathStyle::Posix, PathStyle::Windows] {
            let err = normalize("backups/today", style).unwrap_err();
            assert!(matches!(err, SnapError::PathInvalid { .. }));
        }
    }

    #[test]
    fn test_posix_absolute_accepted() {
        assert_eq!(
            normalize("/var/backups", PathStyle::Posix).unwrap(),
            "/var/backups"
        );
        assert_eq!(
            normalize("//var//backups/./daily/", PathStyle::Posix).unwrap(),
            "/var/backups/daily"
        );
        assert_eq!(normalize("/", PathStyle::Posix).unwrap(), "/");
    }

    #[test]
    fn test_windows_absolute_accepted() {
        assert_eq!(
            normalize(r"C:\Backups", PathStyle::Windows).unwrap(),
            r"C:\Backups"
        );
        assert_eq!(
            normalize("d:/Backups/daily/", PathStyle::Windows).unwrap(),
            r"D:\Backups\daily"
        );
    }

    #[test]
    fn test_grammar_is_style_specific() {
        assert!(normalize(r"C:\Backups", PathStyle::Posix).is_err());
        assert!(normalize("/var/backups", PathStyle::Windows).is_err());
        assert!(normalize("C:Backups", PathStyle::Windows).is_err());
    }

    #[test]
    fn test_parent_segments_and_empty_rejected() {
        assert!(normalize("/var/../etc", PathStyle::Posix).is_err());
        assert!(normalize("", PathStyle::Posix).is_err());
        assert!(normalize("   ", PathStyle::Windows).is_err());
        assert!(normalize("/var/back\0ups", PathStyle::Posix).is_err());
    }

    #[test]
    fn test_validate_creates_directory_tree() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("a").join("b").join("c");
        let validator = PathValidator::new(temp_dir.path());

        let dir = validator
            .validate(Some(target.to_str().unwrap()))
            .unwrap();
        assert!(dir.is_dir());
        // 探测文件已删除
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        // 幂等
        validator.validate(Some(target.to_str().unwrap())).unwrap();
    }

    #[test]
    fn test_validate_uses_default_root() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("default-root");
        let validator = PathValidator::new(&root);

        let dir = validator.validate(None).unwrap();
        assert_eq!(dir, root);
        assert!(root.is_dir());
    }

    #[test]
    fn test_validate_under_regular_file_not_writable() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let target = blocker.join("backups");

        let validator = PathValidator::new(temp_dir.path());
        let err = validator
            .validate(Some(target.to_str().unwrap()))
            .unwrap_err();
        assert!(matches!(err, SnapError::PathNotWritable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_read_only_directory_not_writable() {
        use std::os::unix::fs::PermissionsExt;

        // root 忽略目录权限位
        if nix::unistd::Uid::effective().is_root() {
            return;
        }

        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("readonly");
        std::fs::create_dir(&target).unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o555)).unwrap();

        let validator = PathValidator::new(temp_dir.path());
        let err = validator
            .validate(Some(target.to_str().unwrap()))
            .unwrap_err();
        assert!(matches!(err, SnapError::PathNotWritable { .. }));

        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
