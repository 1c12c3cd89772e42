use crate::error::{Result, SnapError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// 系统设置
///
/// 由调用方持有并显式传入采集和恢复流程，备份时整体序列化为 `config.json`，
/// 恢复时整体替换。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SystemSettings {
    pub general: GeneralSettings,
    pub security: SecuritySettings,
    pub notifications: NotificationSettings,
    pub backup: BackupSettings,
    pub api: ApiSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub site_name: String,
    pub maintenance_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub two_factor_enabled: bool,
    /// 1-365
    pub password_expiry_days: u32,
    /// 1-10
    pub max_login_attempts: u32,
    /// 5-1440
    pub lockout_duration_minutes: u32,
    pub password_complexity_required: bool,
    /// 5-1440
    pub session_timeout_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email_notifications_enabled: bool,
    pub smtp_server: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_use_tls: bool,
}

/// 自动备份相关设置，本库只保存不调度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub auto_backup_enabled: bool,
    /// 1-168
    pub backup_frequency_hours: u32,
    /// 1-365
    pub backup_retention_days: u32,
    pub backup_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub api_enabled: bool,
    pub api_key: Option<String>,
    pub api_rate_limit: u32,
    pub api_allowed_ips: Option<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            site_name: "Snapkeep".to_string(),
            maintenance_mode: false,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            two_factor_enabled: false,
            password_expiry_days: 90,
            max_login_attempts: 5,
            lockout_duration_minutes: 30,
            password_complexity_required: true,
            session_timeout_minutes: 60,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_notifications_enabled: false,
            smtp_server: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_use_tls: true,
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            auto_backup_enabled: false,
            backup_frequency_hours: 24,
            backup_retention_days: 30,
            backup_location: None,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_enabled: false,
            api_key: None,
            api_rate_limit: 60,
            api_allowed_ips: None,
        }
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(SnapError::custom(format!(
            "设置项 {field} 超出范围 {min}-{max}: {value}"
        )));
    }
    Ok(())
}

impl SystemSettings {
    /// 校验各字段取值范围
    pub fn validate(&self) -> Result<()> {
        let s = &self.security;
        check_range("security.password_expiry_days", s.password_expiry_days, 1, 365)?;
        check_range("security.max_login_attempts", s.max_login_attempts, 1, 10)?;
        check_range(
            "security.lockout_duration_minutes",
            s.lockout_duration_minutes,
            5,
            1440,
        )?;
        check_range(
            "security.session_timeout_minutes",
            s.session_timeout_minutes,
            5,
            1440,
        )?;

        if self.notifications.smtp_port == 0 {
            return Err(SnapError::custom("设置项 notifications.smtp_port 不能为 0"));
        }

        let b = &self.backup;
        check_range("backup.backup_frequency_hours", b.backup_frequency_hours, 1, 168)?;
        check_range("backup.backup_retention_days", b.backup_retention_days, 1, 365)?;
        Ok(())
    }

    /// 从 JSON 文件加载设置，文件不存在时使用默认值
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("系统设置文件不存在，使用默认设置: {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings: SystemSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 原子写入设置文件（先写临时文件再重命名）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)?;
        temp.write_all(self.to_json_pretty()?.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| SnapError::Io(e.error))?;

        info!("系统设置已保存: {}", path.display());
        Ok(())
    }

    /// 稳定的 JSON 表示
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(SystemSettings::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut settings = SystemSettings::default();
        settings.backup.backup_retention_days = 0;
        assert!(settings.validate().is_err());

        let mut settings = SystemSettings::default();
        settings.security.max_login_attempts = 11;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let mut settings = SystemSettings::default();
        settings.general.site_name = "测试站点".to_string();
        settings.notifications.smtp_server = Some("smtp.example.com".to_string());
        settings.save_to_file(&path).unwrap();

        let loaded = SystemSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_uses_default() {
        let temp_dir = tempdir().unwrap();
        let loaded = SystemSettings::load_from_file(temp_dir.path().join("none.json")).unwrap();
        assert_eq!(loaded, SystemSettings::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"backup": {"auto_backup_enabled": true}}"#;
        let settings: SystemSettings = serde_json::from_str(json).unwrap();
        assert!(settings.backup.auto_backup_enabled);
        assert_eq!(settings.backup.backup_retention_days, 30);
        assert_eq!(settings.security, SecuritySettings::default());
    }
}
