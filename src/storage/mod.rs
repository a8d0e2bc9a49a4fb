pub mod file;
pub mod memory;
pub mod traits;
pub mod transactions;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;
pub use transactions::{TransactionLog, TransactionRecord, TransactionStatus};

use crate::config::StorageConfig;
use std::path::Path;
use std::sync::Arc;

/// Factory: create the configured store rooted at the workspace directory
pub fn create_store(config: &StorageConfig, workspace_dir: &Path) -> Arc<dyn KeyValueStore> {
    match config.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        "file" => Arc::new(FileStore::new(workspace_dir.join(&config.file_name))),
        other => {
            tracing::warn!("Unknown storage backend '{other}', falling back to file");
            Arc::new(FileStore::new(workspace_dir.join(&config.file_name)))
        }
    }
}
