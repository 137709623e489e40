//! In-process implementation of the index and object services.
//!
//! Indices are ordered `BTreeMap`s of byte keys, so `next` pagination sees
//! keys in exactly the order the distributed store would return them.
//! Object buffers grow sparsely: writes beyond the current end zero-fill
//! the gap, reads beyond the end return zeroes, matching striped-store
//! semantics where unwritten units read as zero.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::id::Id128;
use crate::service::{CompositeLayer, CreateFlags, IndexService, IoFlags, ObjectService};

/// One stored object.
#[derive(Debug)]
struct MemObject {
    layout_id: u64,
    pver: Id128,
    own_meta: bool,
    composite: bool,
    layers: Vec<CompositeLayer>,
    data: Vec<u8>,
}

/// In-memory index + object service.
///
/// Thread-safe; cheap to construct per test. All operations complete
/// immediately, but the async signatures match the network-attached
/// implementations this stands in for.
#[derive(Debug, Default)]
pub struct MemService {
    indices: RwLock<HashMap<Id128, BTreeMap<Vec<u8>, Bytes>>>,
    objects: DashMap<Id128, MemObject>,
    pver_counter: AtomicU64,
}

impl MemService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects (tests).
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Whether an object with this ID exists (tests).
    #[must_use]
    pub fn object_exists(&self, id: Id128) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of entries in an index, if it exists (tests).
    #[must_use]
    pub fn index_len(&self, id: Id128) -> Option<usize> {
        self.indices.read().get(&id).map(BTreeMap::len)
    }
}

#[async_trait]
impl IndexService for MemService {
    async fn create_index(&self, id: Id128) -> StoreResult<()> {
        let mut indices = self.indices.write();
        if indices.contains_key(&id) {
            return Err(StoreError::AlreadyExists);
        }
        trace!(%id, "create index");
        indices.insert(id, BTreeMap::new());
        Ok(())
    }

    async fn delete_index(&self, id: Id128) -> StoreResult<()> {
        self.indices
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn put(&self, id: Id128, key: &[u8], val: Bytes, overwrite: bool) -> StoreResult<()> {
        let mut indices = self.indices.write();
        let index = indices.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !overwrite && index.contains_key(key) {
            return Err(StoreError::AlreadyExists);
        }
        index.insert(key.to_vec(), val);
        Ok(())
    }

    async fn get(&self, id: Id128, key: &[u8]) -> StoreResult<Bytes> {
        let indices = self.indices.read();
        let index = indices.get(&id).ok_or(StoreError::NotFound)?;
        index.get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn del(&self, id: Id128, key: &[u8]) -> StoreResult<()> {
        let mut indices = self.indices.write();
        let index = indices.get_mut(&id).ok_or(StoreError::NotFound)?;
        index.remove(key).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn next(
        &self,
        id: Id128,
        start: &[u8],
        count: usize,
    ) -> StoreResult<Vec<(Vec<u8>, Bytes)>> {
        let indices = self.indices.read();
        let index = indices.get(&id).ok_or(StoreError::NotFound)?;
        Ok(index
            .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
            .take(count)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[async_trait]
impl ObjectService for MemService {
    async fn create_object(
        &self,
        id: Id128,
        layout_id: u64,
        flags: CreateFlags,
    ) -> StoreResult<Id128> {
        if self.objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists);
        }
        let pver = Id128::new(0x7076_6572, self.pver_counter.fetch_add(1, Ordering::Relaxed));
        trace!(%id, layout_id, %pver, "create object");
        self.objects.insert(
            id,
            MemObject {
                layout_id,
                pver,
                own_meta: flags.own_meta,
                composite: false,
                layers: Vec::new(),
                data: Vec::new(),
            },
        );
        Ok(pver)
    }

    async fn open_object(&self, id: Id128, layout_id: u64, pver: Id128) -> StoreResult<()> {
        let obj = self.objects.get(&id).ok_or(StoreError::NotFound)?;
        if obj.layout_id != layout_id || obj.pver != pver {
            return Err(StoreError::InvalidArgument(format!(
                "object {id} opened with mismatched layout/pver"
            )));
        }
        Ok(())
    }

    async fn delete_object(&self, id: Id128) -> StoreResult<()> {
        self.objects
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn write(&self, id: Id128, offset: u64, data: Bytes, _flags: IoFlags) -> StoreResult<()> {
        let mut obj = self.objects.get_mut(&id).ok_or(StoreError::NotFound)?;
        let offset = usize::try_from(offset)
            .map_err(|_| StoreError::InvalidArgument("write offset overflow".into()))?;
        let end = offset + data.len();
        if obj.data.len() < end {
            obj.data.resize(end, 0);
        }
        obj.data[offset..end].copy_from_slice(&data);
        Ok(())
    }

    async fn read(&self, id: Id128, offset: u64, len: u64, _flags: IoFlags) -> StoreResult<Bytes> {
        let obj = self.objects.get(&id).ok_or(StoreError::NotFound)?;
        let offset = usize::try_from(offset)
            .map_err(|_| StoreError::InvalidArgument("read offset overflow".into()))?;
        let len = usize::try_from(len)
            .map_err(|_| StoreError::InvalidArgument("read length overflow".into()))?;
        let mut out = vec![0u8; len];
        if offset < obj.data.len() {
            let have = (obj.data.len() - offset).min(len);
            out[..have].copy_from_slice(&obj.data[offset..offset + have]);
        }
        Ok(Bytes::from(out))
    }

    async fn set_composite(&self, id: Id128) -> StoreResult<()> {
        let mut obj = self.objects.get_mut(&id).ok_or(StoreError::NotFound)?;
        obj.composite = true;
        Ok(())
    }

    async fn add_layer(&self, id: Id128, layer: CompositeLayer) -> StoreResult<()> {
        let mut obj = self.objects.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !obj.composite {
            return Err(StoreError::InvalidArgument(format!(
                "object {id} is not composite"
            )));
        }
        obj.layers.push(layer);
        obj.layers.sort_by_key(|l| l.priority);
        Ok(())
    }

    async fn del_layer(&self, id: Id128, layer: Id128) -> StoreResult<()> {
        let mut obj = self.objects.get_mut(&id).ok_or(StoreError::NotFound)?;
        let before = obj.layers.len();
        obj.layers.retain(|l| l.oid != layer);
        if obj.layers.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_layers(&self, id: Id128) -> StoreResult<Vec<CompositeLayer>> {
        let obj = self.objects.get(&id).ok_or(StoreError::NotFound)?;
        Ok(obj.layers.clone())
    }
}
