use crate::constants::backup::CONFIG_SNAPSHOT_NAME;
use crate::error::Result;
use crate::settings::SystemSettings;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// 把当前系统设置写入暂存目录的 `config.json`
pub fn snapshot_config(settings: &SystemSettings, staging: &Path) -> Result<()> {
    let target = staging.join(CONFIG_SNAPSHOT_NAME);
    let json = settings.to_json_pretty()?;

    let mut file = File::create(&target)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;

    info!("⚙️  配置快照已写入: {}", target.display());
    Ok(())
}
