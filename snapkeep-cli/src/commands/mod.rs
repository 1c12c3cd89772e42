mod audit;
mod backup;
mod restore;
mod settings;

// Backup commands
pub use backup::{
    BackupArgs, run_backup, run_delete, run_download, run_list_backups, run_prune, run_show,
    run_verify,
};

// Restore commands
pub use restore::run_restore;

// Audit commands
pub use audit::run_audit;

// Settings commands
pub use settings::show_settings;
