//! Store tests


use std::path::PathBuf;
use std::sync::Once;

use bucketdb::Store;
use tempfile::TempDir;
use tracing_subscriber::{fmt, EnvFilter};

static TRACING: Once = Once::new();

/// Route store logs to the test output (enable with RUST_LOG=bucketdb=debug)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn setup_temp_store(flush_interval_ms: u64) -> (TempDir, PathBuf, Store) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("db").join("store.aof");
    let store = Store::open(&path, flush_interval_ms).unwrap();
    (temp_dir, path, store)
}
