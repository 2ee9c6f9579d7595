pub mod alarm;
pub mod deploy;
pub mod registry;

use std::path::Path;

use stepshift_state::StateStore;

/// File name of the local registry database inside the data directory.
pub const DATABASE_FILE: &str = "stepshift.redb";

/// Open the local registry under `data_dir`, creating the directory if needed.
pub fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(DATABASE_FILE);
    let store = StateStore::open(&db_path)?;
    tracing::debug!(path = ?db_path, "local registry opened");
    Ok(store)
}
