use crate::constants::backup::DATASTORE_DUMP_NAME;
use crate::datastore::DataStore;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// 导出数据存储到暂存目录的 `datastore.dump`，返回内容的 SHA-256
pub fn dump_datastore(store: &DataStore, staging: &Path) -> Result<String> {
    info!("🗄️  导出数据存储: {}", store.path().display());

    let dump = store.dump()?;
    let bytes = dump.to_bytes()?;

    let target = staging.join(DATASTORE_DUMP_NAME);
    let mut file = File::create(&target)?;
    file.write_all(&bytes)?;
    file.sync_all()?;

    let digest = format!("{:x}", Sha256::digest(&bytes));
    info!(
        "   ✅ 导出完成: {} 张表, {} 行, {} 字节",
        dump.tables.len(),
        dump.row_count(),
        bytes.len()
    );
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::tests::seed_datastore;
    use tempfile::tempdir;

    #[test]
    fn test_dump_file_written_with_checksum() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("app.duckdb");
        seed_datastore(&db_path);
        let staging = temp_dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();

        let store = DataStore::new(&db_path, vec![]);
        let digest = dump_datastore(&store, &staging).unwrap();

        let bytes = std::fs::read(staging.join(DATASTORE_DUMP_NAME)).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(digest, format!("{:x}", Sha256::digest(&bytes)));
        assert_eq!(digest.len(), 64);
    }
}
