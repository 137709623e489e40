//! Index gateway: named ordered maps over the raw index service.
//!
//! Index names are hashed to 128-bit IDs (MD5, masked into the store's
//! reserved distributed-index ID space) so every process addresses the
//! same index for the same name without coordination.
//!
//! `next` layers the iteration protocol over the service's flat batch
//! primitive: prefix-bounded scans, and delimiter collapsing where any key
//! containing the delimiter past the prefix is folded into a directory
//! pseudo-entry (returned with an empty value) and iteration skips to
//! `directory + 0xFF` in one step.

use std::sync::Arc;

use bytes::Bytes;
use digest::Digest;
use stratus_store::{Id128, IndexService};
use tracing::trace;

use crate::error::CoreResult;

/// High-byte tag marking distributed-index IDs, applied after masking the
/// container word of the hashed name.
const INDEX_ID_TAG: u64 = 0x7800_0000_0000_0000; // 'x'
const INDEX_CONTAINER_MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;

/// Gateway to named indices.
#[derive(Clone)]
pub struct IndexGateway {
    service: Arc<dyn IndexService>,
    batch: usize,
}

impl std::fmt::Debug for IndexGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexGateway")
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

impl IndexGateway {
    /// Wrap a raw index service. `batch` bounds the per-round-trip entry
    /// count of NEXT queries.
    #[must_use]
    pub fn new(service: Arc<dyn IndexService>, batch: usize) -> Self {
        Self {
            service,
            batch: batch.max(1),
        }
    }

    /// Deterministically derive the 128-bit ID of a named index: the MD5
    /// digest of the name with the container word masked and the index
    /// type tag applied.
    #[must_use]
    pub fn index_id(name: &str) -> Id128 {
        let digest = md5::Md5::digest(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest);
        let raw = Id128::from_bytes(bytes);
        Id128 {
            hi: (raw.hi & INDEX_CONTAINER_MASK) | INDEX_ID_TAG,
            lo: raw.lo,
        }
    }

    /// Access to the underlying service (for ID-addressed indices such as
    /// composite-layer extent maps).
    #[must_use]
    pub fn service(&self) -> &Arc<dyn IndexService> {
        &self.service
    }

    /// Create the named index.
    pub async fn create(&self, name: &str) -> CoreResult<()> {
        trace!(index = name, "create index");
        Ok(self.service.create_index(Self::index_id(name)).await?)
    }

    /// Create the named index if it does not exist yet.
    pub async fn ensure(&self, name: &str) -> CoreResult<()> {
        match self.create(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drop the named index.
    pub async fn delete(&self, name: &str) -> CoreResult<()> {
        trace!(index = name, "delete index");
        Ok(self.service.delete_index(Self::index_id(name)).await?)
    }

    /// Insert `key -> val` into the named index.
    pub async fn put(&self, name: &str, key: &[u8], val: Bytes, overwrite: bool) -> CoreResult<()> {
        Ok(self
            .service
            .put(Self::index_id(name), key, val, overwrite)
            .await?)
    }

    /// Fetch a value from the named index.
    pub async fn get(&self, name: &str, key: &[u8]) -> CoreResult<Bytes> {
        Ok(self.service.get(Self::index_id(name), key).await?)
    }

    /// Remove a key from the named index.
    pub async fn del(&self, name: &str, key: &[u8]) -> CoreResult<()> {
        Ok(self.service.del(Self::index_id(name), key).await?)
    }

    /// Return up to `max` entries with keys `>= start`, in key order,
    /// stopping at the first key that does not share `prefix`.
    ///
    /// With a delimiter, keys containing `delim` past the prefix collapse
    /// into directory pseudo-entries (empty value, key truncated after the
    /// delimiter); consecutive duplicates are suppressed and iteration
    /// resumes past the whole directory in one step.
    pub async fn next(
        &self,
        name: &str,
        start: &[u8],
        max: usize,
        prefix: &[u8],
        delim: &[u8],
    ) -> CoreResult<Vec<(Vec<u8>, Bytes)>> {
        let id = Self::index_id(name);
        let mut out: Vec<(Vec<u8>, Bytes)> = Vec::new();
        let mut start_key = start.to_vec();

        'outer: loop {
            let batch = self.service.next(id, &start_key, self.batch).await?;
            let got = batch.len();
            if got == 0 {
                break;
            }

            // Tracks how to resume after this batch: past the directory in
            // one step, or just past the last plain key.
            let mut last_dir: Option<Vec<u8>> = None;
            let mut last_key: Vec<u8> = Vec::new();

            for (key, val) in batch {
                last_key.clone_from(&key);
                if let Some(pos) = find_delim(&key, prefix.len(), delim) {
                    let dir = key[..pos + delim.len()].to_vec();
                    if !dir.starts_with(prefix) {
                        break 'outer;
                    }
                    let duplicate = out
                        .last()
                        .is_some_and(|(k, v)| v.is_empty() && *k == dir);
                    if !duplicate {
                        out.push((dir.clone(), Bytes::new()));
                    }
                    last_dir = Some(dir);
                } else {
                    if !key.starts_with(prefix) {
                        break 'outer;
                    }
                    last_dir = None;
                    out.push((key, val));
                }
                if out.len() >= max {
                    break 'outer;
                }
            }

            if got < self.batch {
                break; // the index is exhausted
            }

            start_key = match last_dir {
                Some(mut dir) => {
                    dir.push(0xFF);
                    dir
                }
                None => {
                    let mut next = last_key;
                    next.push(0x00);
                    next
                }
            };
        }

        trace!(index = name, entries = out.len(), "next query");
        Ok(out)
    }
}

/// Position of `delim` in `key` at or after `from`, if any.
fn find_delim(key: &[u8], from: usize, delim: &[u8]) -> Option<usize> {
    if delim.is_empty() || key.len() < from {
        return None;
    }
    key[from..]
        .windows(delim.len())
        .position(|w| w == delim)
        .map(|p| from + p)
}
