use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chatline::storage::StateStorage;
use chatline::store::{ChatStore, StoreState};
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_storage() -> (StateStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("state.db");
    let storage = StateStorage::open(db_path).expect("failed to open state storage");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Poll the store until `pred` holds, failing after five seconds
#[allow(dead_code)]
pub async fn wait_until(store: &ChatStore, pred: impl Fn(&StoreState) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&store.snapshot()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store never reached the expected state");
}
