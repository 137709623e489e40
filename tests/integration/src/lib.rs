//! End-to-end scenario tests for the stratus translation core.
//!
//! Every test drives a full [`Store`] over an in-process [`MemService`],
//! so index layouts, record codecs, striping, and statistics all run for
//! real; only the network is missing.

use std::sync::{Arc, Once};
use std::time::Duration;

use stratus_core::config::StoreConfig;
use stratus_core::records::{Attrs, BucketInfo, BucketRecord, UserInfo, UserRecord};
use stratus_core::Store;
use stratus_store::MemService;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A store plus a handle on its backing service, for assertions on raw
/// object existence.
pub struct TestEnv {
    /// The store under test.
    pub store: Store,
    /// The in-process backing service.
    pub svc: Arc<MemService>,
}

/// Open a test environment with default configuration.
pub async fn env() -> TestEnv {
    env_with(StoreConfig::default()).await
}

/// Open a test environment with explicit configuration.
pub async fn env_with(cfg: StoreConfig) -> TestEnv {
    init_tracing();
    let svc = Arc::new(MemService::new());
    let store = Store::open(cfg, svc.clone(), svc.clone())
        .await
        .unwrap_or_else(|e| panic!("failed to open store: {e}"));
    TestEnv { store, svc }
}

/// Create a user named `owner-<bucket>` and a bucket owned by it.
pub async fn make_bucket(env: &TestEnv, name: &str) -> BucketRecord {
    let user = make_user(env, &format!("owner-{name}")).await;
    env.store
        .create_bucket(
            &user,
            BucketInfo {
                name: name.to_owned(),
                ..BucketInfo::default()
            },
            Attrs::new(),
        )
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"))
}

/// Create a user.
pub async fn make_user(env: &TestEnv, user_id: &str) -> UserRecord {
    env.store
        .create_user(UserInfo {
            user_id: user_id.to_owned(),
            display_name: user_id.to_owned(),
            email: String::new(),
            access_keys: Vec::new(),
        })
        .await
        .unwrap_or_else(|e| panic!("failed to create user {user_id}: {e}"))
}

/// Let the millisecond clock advance so version IDs and mtimes of
/// consecutive operations order deterministically.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(3)).await;
}

mod test_list;
mod test_multipart;
mod test_objects;
mod test_store;
mod test_versioning;
