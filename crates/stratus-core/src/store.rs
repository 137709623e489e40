//! The store context: everything the engines share.
//!
//! One `Store` is constructed at bootstrap and passed explicitly through
//! every call; there is no hidden global state. It owns the index and
//! object gateways, the three metadata caches, the monotonic ID generator,
//! the layout catalog, the GC enqueue front, and the quota delegate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stratus_store::{IdGenerator, IndexService, LayoutCatalog, ObjectService};
use tracing::{debug, info};

use crate::cache::MetaCache;
use crate::catalog::{self, NoQuota, QuotaCheck};
use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::gateway::ObjectGateway;
use crate::gc::GcQueue;
use crate::index::IndexGateway;

/// The bootstrap context of a store instance.
pub struct Store {
    cfg: StoreConfig,
    index: IndexGateway,
    gateway: ObjectGateway,
    layouts: Arc<LayoutCatalog>,
    obj_cache: MetaCache,
    user_cache: MetaCache,
    bucket_cache: MetaCache,
    gc: GcQueue,
    quota: Arc<dyn QuotaCheck>,
    finalized: AtomicBool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("cfg", &self.cfg)
            .field("finalized", &self.finalized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open a store over the given services with the standard layout
    /// catalog and no quota.
    pub async fn open(
        cfg: StoreConfig,
        indices: Arc<dyn IndexService>,
        objects: Arc<dyn ObjectService>,
    ) -> CoreResult<Self> {
        Self::open_with(
            cfg,
            indices,
            objects,
            Arc::new(LayoutCatalog::standard()),
            Arc::new(NoQuota),
        )
        .await
    }

    /// Open a store with explicit layout catalog and quota delegate.
    ///
    /// Creates the global indices (idempotently) and, when the collector
    /// is enabled, its queue indices.
    pub async fn open_with(
        cfg: StoreConfig,
        indices: Arc<dyn IndexService>,
        objects: Arc<dyn ObjectService>,
        layouts: Arc<LayoutCatalog>,
        quota: Arc<dyn QuotaCheck>,
    ) -> CoreResult<Self> {
        let index = IndexGateway::new(indices.clone(), cfg.next_batch);
        let ids = Arc::new(IdGenerator::new());
        let gateway = ObjectGateway::new(objects, indices, layouts.clone(), ids);
        let gc = GcQueue::new(index.clone(), cfg.gc_queues, cfg.gc_enabled);

        for name in catalog::global_indices() {
            match index.create(name).await {
                Ok(()) => debug!(index = name, "created global index"),
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
        }
        if cfg.gc_enabled {
            gc.create_queues().await?;
        }

        let cache_on = cfg.use_metadata_cache;
        let capacity = cfg.cache_capacity;
        info!(
            cache = cache_on,
            gc = cfg.gc_enabled,
            tiered = cfg.tiered_enabled,
            "store opened"
        );
        Ok(Self {
            index,
            gateway,
            layouts,
            obj_cache: MetaCache::new("objects", capacity, cache_on),
            user_cache: MetaCache::new("users", capacity, cache_on),
            bucket_cache: MetaCache::new("buckets", capacity, cache_on),
            gc,
            quota,
            cfg,
            finalized: AtomicBool::new(false),
        })
    }

    /// The configuration this store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    /// The index gateway.
    #[must_use]
    pub fn index(&self) -> &IndexGateway {
        &self.index
    }

    /// The object gateway.
    #[must_use]
    pub fn gateway(&self) -> &ObjectGateway {
        &self.gateway
    }

    /// The layout catalog.
    #[must_use]
    pub fn layouts(&self) -> &LayoutCatalog {
        &self.layouts
    }

    /// Cache of object records, keyed by version-qualified object key.
    #[must_use]
    pub fn obj_cache(&self) -> &MetaCache {
        &self.obj_cache
    }

    /// Cache of user records, keyed by user ID.
    #[must_use]
    pub fn user_cache(&self) -> &MetaCache {
        &self.user_cache
    }

    /// Cache of bucket records, keyed by tenant-qualified bucket name.
    #[must_use]
    pub fn bucket_cache(&self) -> &MetaCache {
        &self.bucket_cache
    }

    /// The garbage-collector enqueue front.
    #[must_use]
    pub fn gc(&self) -> &GcQueue {
        &self.gc
    }

    /// The quota delegate.
    #[must_use]
    pub fn quota(&self) -> &dyn QuotaCheck {
        self.quota.as_ref()
    }

    /// Stop background acceptance and drop cached state. The store must
    /// not be used afterwards.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        self.gc.stop();
        self.obj_cache.set_enabled(false);
        self.user_cache.set_enabled(false);
        self.bucket_cache.set_enabled(false);
        info!("store finalized");
    }

    /// Whether [`Store::finalize`] ran.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Relaxed)
    }
}
