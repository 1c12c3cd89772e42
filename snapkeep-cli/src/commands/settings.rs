use crate::app::CliApp;
use snapkeep_core::{SystemSettings, error::Result};
use tracing::info;

const MASK: &str = "******";

/// 显示前隐藏密码和密钥
fn masked(settings: &SystemSettings) -> SystemSettings {
    let mut settings = settings.clone();
    if settings.notifications.smtp_password.is_some() {
        settings.notifications.smtp_password = Some(MASK.to_string());
    }
    if settings.api.api_key.is_some() {
        settings.api.api_key = Some(MASK.to_string());
    }
    settings
}

/// 显示当前系统设置
pub fn show_settings(app: &CliApp) -> Result<()> {
    info!("⚙️  系统设置 ({})", app.config.get_settings_path().display());
    for line in masked(&app.settings).to_json_pretty()?.lines() {
        info!("{}", line);
    }
    info!("💡 配置文件: {}", app.config_path.display());
    Ok(())
}
