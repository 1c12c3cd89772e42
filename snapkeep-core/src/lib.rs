pub mod archive;
pub mod audit;
pub mod backup;
pub mod capture;
pub mod config;
pub mod constants;
pub mod datastore;
pub mod db;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod path_validator;
pub mod restore;
pub mod settings;

pub use audit::{AuditEvent, AuditPhase, AuditSink, AuditStatus, LedgerAuditSink, TracingAuditSink};
pub use backup::{BackupDownload, BackupManager, BackupRequest};
pub use config::AppConfig;
pub use error::{Result, SnapError};
pub use ledger::{BackupKind, BackupRecord, BackupRecordStore, BackupStatus, format_size};
pub use restore::RestoreReport;
pub use settings::SystemSettings;
