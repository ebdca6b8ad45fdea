use std::rc::Rc;
use std::sync::Once;

use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::document::{DocumentKey, SinglePageRenderer};
use crate::simulation::{SimulatedPersistence, SimulatedTimeSource};
use crate::store::DocumentStore;

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
///
/// `RUST_LOG` overrides the default `docstore=debug` filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "docstore=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

pub fn key(s: &str) -> DocumentKey {
    DocumentKey::new(s).expect("valid test key")
}

/// A store backed by simulated persistence and a simulated clock.
pub fn simulated_store() -> (DocumentStore, SimulatedPersistence, Rc<SimulatedTimeSource>) {
    init_tracing();
    let persistence = SimulatedPersistence::new(0);
    let clock = Rc::new(SimulatedTimeSource::default_start());
    let store = DocumentStore::with_parts(
        Box::new(persistence.clone()),
        Box::new(SinglePageRenderer),
        Box::new(Rc::clone(&clock)),
    );
    (store, persistence, clock)
}

/// A store that parks documents in a fresh temporary directory.
///
/// The directory is removed when the returned guard is dropped.
pub fn disk_store() -> (DocumentStore, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = DocumentStore::new(dir.path());
    (store, dir)
}
