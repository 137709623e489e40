//! Object gateway: byte containers over the raw object service.
//!
//! Two physical shapes exist. A **plain** object is a single striped
//! container. A **composite** object is a root whose byte content resolves
//! through one or more prioritised **layers**; each layer is a sub-object
//! plus a pair of extent indices (write and read) describing which byte
//! ranges it covers.
//!
//! All I/O is block-aligned: the optimal block size comes from the
//! object's layout, the final block of an object carries the last flag and
//! is padded to the unit size by the writer pipeline.

use std::sync::Arc;

use bytes::Bytes;
use stratus_store::layout::{rounddown, roundup};
use stratus_store::service::{
    extent_index_id, extent_key_from_buf, extent_key_to_buf, extent_val_to_buf,
};
use stratus_store::{
    CompositeLayer, CreateFlags, Id128, IdGenerator, IndexService, IoFlags, Layout, LayoutCatalog,
    ObjectService,
};
use tracing::{debug, trace, warn};

use crate::error::CoreResult;
use crate::records::ObjectMeta;

/// Priority assigned to the top layer of a composite object:
/// `((0x00FF_FFFF - generation) << 8) | tier` with generation 0, tier 0.
/// Stored with the layer; nothing orders on it while a single layer
/// exists.
pub const TOP_LAYER_PRIORITY: u32 = 0x00FF_FFFF << 8;

/// Extent records deleted per round-trip during composite teardown.
const EXTENT_BATCH: usize = 128;

/// Gateway to byte containers.
#[derive(Clone)]
pub struct ObjectGateway {
    objects: Arc<dyn ObjectService>,
    indices: Arc<dyn IndexService>,
    layouts: Arc<LayoutCatalog>,
    ids: Arc<IdGenerator>,
}

impl std::fmt::Debug for ObjectGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectGateway").finish_non_exhaustive()
    }
}

impl ObjectGateway {
    /// Assemble a gateway from its collaborators.
    #[must_use]
    pub fn new(
        objects: Arc<dyn ObjectService>,
        indices: Arc<dyn IndexService>,
        layouts: Arc<LayoutCatalog>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            objects,
            indices,
            layouts,
            ids,
        }
    }

    /// The layout catalog backing this gateway.
    #[must_use]
    pub fn layouts(&self) -> &LayoutCatalog {
        &self.layouts
    }

    /// The layout recorded in `meta`.
    pub fn layout_of(&self, meta: &ObjectMeta) -> CoreResult<Layout> {
        Ok(self.layouts.by_id(meta.layout_id)?)
    }

    /// Create a plain object sized for `size` bytes.
    ///
    /// Reserves a fresh ID, picks the best-matching layout (failing when
    /// the catalog has none), and records identity, layout, and placement
    /// in the returned [`ObjectMeta`].
    pub async fn create(&self, size: u64) -> CoreResult<ObjectMeta> {
        self.create_with_flags(size, CreateFlags { gen_di: true, own_meta: false })
            .await
    }

    async fn create_with_flags(&self, size: u64, flags: CreateFlags) -> CoreResult<ObjectMeta> {
        let oid = self.ids.next_id();
        let layout = self.layouts.find_by_objsize(size)?;
        let pver = self.objects.create_object(oid, layout.id, flags).await?;
        debug!(%oid, layout_id = layout.id, size, "created object");
        Ok(ObjectMeta {
            oid,
            pver,
            layout_id: layout.id,
            is_composite: false,
            top_layer: None,
        })
    }

    /// Create a composite object sized for `size` bytes: a root with
    /// service-side metadata, one top layer, and a `(0, ∞)` extent in the
    /// layer's write and read extent indices.
    ///
    /// Any step failing unwinds the layer sub-object and the root.
    pub async fn create_composite(&self, size: u64) -> CoreResult<ObjectMeta> {
        let mut meta = self
            .create_with_flags(size, CreateFlags { gen_di: true, own_meta: true })
            .await?;

        match self.attach_top_layer(&meta, size).await {
            Ok(layer) => {
                meta.is_composite = true;
                meta.top_layer = Some(layer);
                Ok(meta)
            }
            Err(e) => {
                // Unwind: the root must not leak.
                if let Err(del) = self.objects.delete_object(meta.oid).await {
                    warn!(oid = %meta.oid, error = %del, "composite unwind failed");
                }
                Err(e)
            }
        }
    }

    async fn attach_top_layer(&self, meta: &ObjectMeta, size: u64) -> CoreResult<Id128> {
        let layer_oid = self.ids.next_id();
        let layout = self.layouts.find_by_objsize(size)?;
        self.objects
            .create_object(layer_oid, layout.id, CreateFlags { gen_di: true, own_meta: false })
            .await?;

        let result = self.layer_setup(meta.oid, layer_oid).await;
        if let Err(e) = result {
            if let Err(del) = self.objects.delete_object(layer_oid).await {
                warn!(oid = %layer_oid, error = %del, "layer unwind failed");
            }
            return Err(e);
        }
        debug!(root = %meta.oid, layer = %layer_oid, "created composite object");
        Ok(layer_oid)
    }

    async fn layer_setup(&self, root: Id128, layer: Id128) -> CoreResult<()> {
        self.objects.set_composite(root).await?;
        self.objects
            .add_layer(root, CompositeLayer { oid: layer, priority: TOP_LAYER_PRIORITY })
            .await?;
        for is_write in [true, false] {
            let idx = extent_index_id(layer, is_write);
            self.indices.create_index(idx).await?;
            self.indices
                .put(
                    idx,
                    &extent_key_to_buf(layer, 0),
                    extent_val_to_buf(u64::MAX),
                    true,
                )
                .await?;
        }
        Ok(())
    }

    /// Add one extent `(offset, len)` to a layer's write or read extent
    /// index.
    pub async fn add_layer_extent(
        &self,
        layer: Id128,
        offset: u64,
        len: u64,
        is_write: bool,
    ) -> CoreResult<()> {
        self.indices
            .put(
                extent_index_id(layer, is_write),
                &extent_key_to_buf(layer, offset),
                extent_val_to_buf(len),
                true,
            )
            .await?;
        Ok(())
    }

    /// Open an existing object described by `meta`.
    pub async fn open(&self, meta: &ObjectMeta) -> CoreResult<()> {
        Ok(self
            .objects
            .open_object(meta.oid, meta.layout_id, meta.pver)
            .await?)
    }

    /// Write one already-aligned block at `offset`. `last` marks the
    /// final parity group of the object.
    pub async fn write_block(
        &self,
        meta: &ObjectMeta,
        offset: u64,
        data: Bytes,
        last: bool,
    ) -> CoreResult<()> {
        trace!(oid = %meta.oid, offset, len = data.len(), last, "write block");
        Ok(self
            .objects
            .write(meta.oid, offset, data, IoFlags { last, full: true })
            .await?)
    }

    /// Read the inclusive byte range `[start, end]` of an object whose
    /// logical size is `size`, delivering trimmed regions to `sink` in
    /// order.
    ///
    /// Reads are issued in optimal-size blocks at block-aligned offsets
    /// starting from `rounddown(start, unit)`; the final parity group is
    /// read with the last flag and only up to the last unit of the object.
    pub async fn read(
        &self,
        meta: &ObjectMeta,
        size: u64,
        start: u64,
        end: u64,
        sink: &mut dyn FnMut(Bytes),
    ) -> CoreResult<()> {
        let layout = self.layout_of(meta)?;
        let unit = layout.unit_size;
        self.open(meta).await?;

        let mut left = end + 1;
        let mut bs = layout.optimal_block_size(left, false);
        let mut off: u64 = 0;
        let mut last = false;

        while left > 0 {
            if left < bs {
                bs = layout.optimal_block_size(left, false);
            }
            if start >= off + bs {
                // Entirely before the requested range.
                left -= bs;
                off += bs;
                continue;
            }

            if off + bs >= size {
                // The final parity group: read only to the last unit.
                bs = roundup(size - off, unit);
                last = true;
            } else if left < bs {
                // Mid-object tail of the range: align to units.
                bs = layout.optimal_block_size(left, true);
            }

            // Skip the leading units nothing asked for.
            if start > off {
                let skip = rounddown(start, unit) - off;
                off += skip;
                bs -= skip;
                left -= skip;
            }

            let block = self
                .objects
                .read(meta.oid, off, bs, IoFlags { last, full: false })
                .await?;

            let head = if start > off { (start - off) as usize } else { 0 };
            let tail = (left.min(bs)) as usize;
            sink(block.slice(head..tail));

            left -= bs.min(left);
            off += bs;
        }
        Ok(())
    }

    /// Destroy the byte container described by `meta`.
    ///
    /// Plain objects are a single delete. Composite objects enumerate
    /// their layers, drain each layer's extent indices in bounded batches,
    /// delete the layer sub-objects, then the root.
    pub async fn delete(&self, meta: &ObjectMeta) -> CoreResult<()> {
        if !meta.is_composite {
            return Ok(self.objects.delete_object(meta.oid).await?);
        }

        let layers = match self.objects.list_layers(meta.oid).await {
            Ok(layers) if !layers.is_empty() => layers,
            // The service lost the layer list; fall back to the copy the
            // catalog carries.
            _ => meta
                .top_layer
                .map(|oid| vec![CompositeLayer { oid, priority: TOP_LAYER_PRIORITY }])
                .unwrap_or_default(),
        };

        for layer in &layers {
            for is_write in [true, false] {
                self.drain_extent_index(layer.oid, is_write).await?;
            }
            if let Err(e) = self.objects.del_layer(meta.oid, layer.oid).await {
                if !e.is_not_found() {
                    return Err(e.into());
                }
            }
            self.objects.delete_object(layer.oid).await?;
            debug!(root = %meta.oid, layer = %layer.oid, "deleted composite layer");
        }
        Ok(self.objects.delete_object(meta.oid).await?)
    }

    async fn drain_extent_index(&self, layer: Id128, is_write: bool) -> CoreResult<()> {
        let idx = extent_index_id(layer, is_write);
        loop {
            let batch = match self.indices.next(idx, &[], EXTENT_BATCH).await {
                Ok(batch) => batch,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            if batch.is_empty() {
                break;
            }
            for (key, _) in &batch {
                // Validate the key shape before deleting; a foreign key in
                // this index means the derivation scheme broke.
                let (owner, _) = extent_key_from_buf(key)?;
                debug_assert_eq!(owner, layer);
                self.indices.del(idx, key).await?;
            }
            if batch.len() < EXTENT_BATCH {
                break;
            }
        }
        self.indices.delete_index(idx).await?;
        Ok(())
    }
}
