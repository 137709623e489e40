//! Core configuration.
//!
//! All fields have defaults suitable for an embedded store; deployments
//! override through the builder or environment variables via
//! [`StoreConfig::from_env`].

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Configuration recognised by the translation core.
///
/// # Examples
///
/// ```
/// use stratus_core::config::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert!(config.use_metadata_cache);
/// assert!(!config.tiered_enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Whether the metadata caches front index reads. When false, every
    /// cache is pass-through.
    #[builder(default = true)]
    pub use_metadata_cache: bool,

    /// Whether deletes enqueue byte objects to the garbage collector
    /// instead of destroying them synchronously.
    #[builder(default = false)]
    pub gc_enabled: bool,

    /// Whether multipart uploads use one composite object per upload
    /// rather than one byte object per part.
    #[builder(default = false)]
    pub tiered_enabled: bool,

    /// Entries held per metadata cache.
    #[builder(default = 10_000)]
    pub cache_capacity: usize,

    /// Batch size for index NEXT queries.
    #[builder(default = 100)]
    pub next_batch: usize,

    /// Minimum size of a non-final multipart part, in bytes.
    #[builder(default = 5 * 1024 * 1024)]
    pub min_part_size: u64,

    /// Number of garbage-collector queue indices.
    #[builder(default = 64)]
    pub gc_queues: u32,

    /// The zonegroup this instance serves; copies across zonegroups are
    /// rejected.
    #[builder(default = String::from("default"))]
    pub zonegroup: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_metadata_cache: true,
            gc_enabled: false,
            tiered_enabled: false,
            cache_capacity: 10_000,
            next_batch: 100,
            min_part_size: 5 * 1024 * 1024,
            gc_queues: 64,
            zonegroup: String::from("default"),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults:
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `STRATUS_USE_METADATA_CACHE` | `true` |
    /// | `STRATUS_GC_ENABLED` | `false` |
    /// | `STRATUS_TIERED_ENABLED` | `false` |
    /// | `STRATUS_CACHE_CAPACITY` | `10000` |
    /// | `STRATUS_NEXT_BATCH` | `100` |
    /// | `STRATUS_MIN_PART_SIZE` | `5242880` |
    /// | `STRATUS_GC_QUEUES` | `64` |
    /// | `STRATUS_ZONEGROUP` | `default` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("STRATUS_USE_METADATA_CACHE") {
            config.use_metadata_cache = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("STRATUS_GC_ENABLED") {
            config.gc_enabled = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("STRATUS_TIERED_ENABLED") {
            config.tiered_enabled = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("STRATUS_CACHE_CAPACITY") {
            if let Ok(n) = v.parse::<usize>() {
                config.cache_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("STRATUS_NEXT_BATCH") {
            if let Ok(n) = v.parse::<usize>() {
                config.next_batch = n.max(1);
            }
        }
        if let Ok(v) = std::env::var("STRATUS_MIN_PART_SIZE") {
            if let Ok(n) = v.parse::<u64>() {
                config.min_part_size = n;
            }
        }
        if let Ok(v) = std::env::var("STRATUS_GC_QUEUES") {
            if let Ok(n) = v.parse::<u32>() {
                config.gc_queues = n.max(1);
            }
        }
        if let Ok(v) = std::env::var("STRATUS_ZONEGROUP") {
            config.zonegroup = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"`
/// (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
