//! Multipart engine: initiate, upload-part, list, complete, abort.
//!
//! Two strategies exist, chosen at initiation by configuration and carried
//! as a flag on the persisted upload state:
//!
//! - **separate-part**: every part is its own byte container; a completed
//!   object reads by stitching part ranges in order;
//! - **tiered**: one composite container per upload; parts write at
//!   `(num - 1) * TIERED_PART_SIZE` and completion installs one read and
//!   write extent per part, so the composite reads transparently.
//!
//! The tiered placement assumes equal part sizes (the final part may be
//! shorter); heterogeneous tiered uploads are a known limitation of the
//! contract.
//!
//! An upload's identity lives in the in-progress record under the meta
//! key `_multipart_<name>.<upload-id>`; part records key by
//! `<name>.<upload-id>.<number, zero-padded>` so they list in part order.

use bytes::Bytes;
use chrono::Utc;
use stratus_store::layout::roundup;
use tracing::{debug, warn};

use crate::catalog::{self, update_bucket_stats_logged};
use crate::checksums::compute_multipart_etag;
use crate::error::{CoreError, CoreResult};
use crate::keys::{entry_key, generate_version_id_now, random_alphanumeric};
use crate::objects::obj_cache_key;
use crate::records::{
    Attrs, BucketRecord, DirEntry, ObjCategory, ObjectRecord, PartInfo, PartRecord, UploadInfo,
};
use crate::store::Store;
use crate::writer::{AtomicWriter, MAX_ACC_SIZE};

/// Prefix of generated upload IDs.
pub const UPLOAD_ID_PREFIX: &str = "2~";

/// Fixed part stride of the tiered strategy (15 MiB).
pub const TIERED_PART_SIZE: u64 = 15 * 1024 * 1024;

/// Parts fetched per round-trip when iterating an upload.
const PART_BATCH: usize = 1000;

/// The meta key of an upload's in-progress record.
#[must_use]
pub fn multipart_meta_key(name: &str, upload_id: &str) -> String {
    format!("_multipart_{name}.{upload_id}")
}

/// The parts-index key of one part.
#[must_use]
pub fn part_record_key(name: &str, upload_id: &str, num: u32) -> String {
    format!("{name}.{upload_id}.{num:08}")
}

/// Handle to an in-progress upload.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    /// The destination object name.
    pub name: String,
    /// The upload's opaque identifier.
    pub upload_id: String,
    /// Persisted upload state.
    pub info: UploadInfo,
    /// The initiating owner.
    pub owner: String,
}

/// One entry of a ListMultipartUploads page.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    /// The destination object name.
    pub name: String,
    /// The upload ID.
    pub upload_id: String,
    /// The initiating owner.
    pub owner: String,
    /// Initiation time, milliseconds since the epoch.
    pub initiated_ms: i64,
}

/// Streaming writer for one part.
#[derive(Debug)]
pub struct PartWriter<'a> {
    store: &'a Store,
    bucket: BucketRecord,
    upload: MultipartUpload,
    part_num: u32,
    base_off: u64,
    part_meta: crate::records::ObjectMeta,
    inner: AtomicWriter,
}

impl<'a> PartWriter<'a> {
    /// Feed part data arriving at `offset` within the part; empty signals
    /// end-of-stream.
    pub async fn process(&mut self, data: Bytes, offset: u64) -> CoreResult<()> {
        self.inner.process(data, self.base_off + offset).await
    }

    /// Finish the part: persist its record, replacing (and destroying) any
    /// previously uploaded part of the same number.
    pub async fn complete(self, attrs: Attrs) -> CoreResult<PartInfo> {
        let outcome = self.inner.complete().await?;
        let store = self.store;
        let tb = self.bucket.info.tenant_bucket();

        let size_rounded = if outcome.size == 0 {
            0
        } else {
            roundup(
                outcome.size,
                store.layouts().unit_size(self.part_meta.layout_id)?,
            )
        };
        let info = PartInfo {
            num: self.part_num,
            etag: outcome.etag,
            size: outcome.size,
            size_rounded,
            accounted_size: outcome.size,
            mtime_ms: Utc::now().timestamp_millis(),
            compression: "none".to_owned(),
        };

        let parts_idx = catalog::multipart_parts_index(&tb);
        let key = part_record_key(&self.upload.name, &self.upload.upload_id, self.part_num);

        // A client retry replaces the previous part; its container (when
        // it owned one) is destroyed and the statistics move by the size
        // delta.
        let mut old_size = 0i64;
        let mut old_rounded = 0i64;
        match store.index().get(&parts_idx, key.as_bytes()).await {
            Ok(raw) => {
                let old = PartRecord::from_bytes(&raw)?;
                if !old.meta.is_composite {
                    store.gateway().delete(&old.meta).await?;
                    debug!(part = self.part_num, "replaced part container");
                }
                old_size = old.info.accounted_size as i64;
                old_rounded = old.info.size_rounded as i64;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let record = PartRecord {
            info: info.clone(),
            attrs,
            meta: self.part_meta,
        };
        match store
            .index()
            .put(&parts_idx, key.as_bytes(), record.to_bytes(), true)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchUpload {
                    upload_id: self.upload.upload_id.clone(),
                })
            }
            Err(e) => return Err(e),
        }

        store
            .apply_stats_delta(
                &self.bucket.info.owner,
                &tb,
                info.accounted_size as i64 - old_size,
                info.size_rounded as i64 - old_rounded,
            )
            .await;

        debug!(
            name = %self.upload.name,
            upload = %self.upload.upload_id,
            part = self.part_num,
            size = info.size,
            "stored part"
        );
        Ok(info)
    }
}

impl Store {
    /// Initiate a multipart upload for `name`.
    ///
    /// Generates the upload ID, creates the composite container for tiered
    /// uploads, writes the in-progress record (retrying the ID on
    /// collision), and bumps the bucket's object count.
    pub async fn initiate_multipart(
        &self,
        bucket: &BucketRecord,
        name: &str,
        owner: &str,
        attrs: Attrs,
    ) -> CoreResult<MultipartUpload> {
        let tb = bucket.info.tenant_bucket();
        let in_progress = catalog::multipart_in_progress_index(&tb);
        let tiered = self.config().tiered_enabled;

        loop {
            let upload_id = format!("{UPLOAD_ID_PREFIX}{}", random_alphanumeric(32));
            let mut info = UploadInfo {
                placement: bucket.info.placement.clone(),
                upload_id: upload_id.clone(),
                tiered,
                meta: Default::default(),
            };
            if tiered {
                info.meta = self.gateway().create_composite(MAX_ACC_SIZE as u64).await?;
            }

            let meta_key = multipart_meta_key(name, &upload_id);
            let mut entry = DirEntry::new(&meta_key, "", owner);
            entry.category = ObjCategory::MultiMeta;
            entry.mtime_ms = Utc::now().timestamp_millis();
            entry.user_data = info.to_bytes();
            let record = ObjectRecord {
                entry,
                attrs: attrs.clone(),
                meta: info.meta,
            };

            match self
                .index()
                .put(&in_progress, meta_key.as_bytes(), record.to_bytes(), false)
                .await
            {
                Ok(()) => {
                    // Object count goes up at initiation; sizes follow the
                    // parts.
                    update_bucket_stats_logged(
                        self.index(),
                        &bucket.info.owner,
                        &tb,
                        ObjCategory::Main,
                        0,
                        0,
                        1,
                        true,
                    )
                    .await;
                    debug!(bucket = %tb, name, upload = %info.upload_id, tiered, "initiated upload");
                    return Ok(MultipartUpload {
                        name: name.to_owned(),
                        upload_id: info.upload_id.clone(),
                        info,
                        owner: owner.to_owned(),
                    });
                }
                Err(e) if e.is_already_exists() => {
                    // Improbable ID collision: unwind and redraw.
                    if tiered {
                        self.gateway().delete(&info.meta).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Load the handle of an in-progress upload.
    pub async fn load_multipart(
        &self,
        bucket: &BucketRecord,
        name: &str,
        upload_id: &str,
    ) -> CoreResult<MultipartUpload> {
        let record = self.in_progress_record(bucket, name, upload_id).await?;
        let info = UploadInfo::from_bytes(&record.entry.user_data)?;
        Ok(MultipartUpload {
            name: name.to_owned(),
            upload_id: upload_id.to_owned(),
            info,
            owner: record.entry.owner,
        })
    }

    async fn in_progress_record(
        &self,
        bucket: &BucketRecord,
        name: &str,
        upload_id: &str,
    ) -> CoreResult<ObjectRecord> {
        let tb = bucket.info.tenant_bucket();
        let meta_key = multipart_meta_key(name, upload_id);
        let raw = match self
            .index()
            .get(&catalog::multipart_in_progress_index(&tb), meta_key.as_bytes())
            .await
        {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchUpload {
                    upload_id: upload_id.to_owned(),
                })
            }
            Err(e) => return Err(e),
        };
        ObjectRecord::from_bytes(&raw)
    }

    /// Open a writer for part `part_num` of an upload.
    ///
    /// Separate-part uploads create a container sized to the expected part
    /// (re-opening the extant one when a racing retry already created it);
    /// tiered uploads write into the upload's composite container at the
    /// part's fixed stride offset.
    pub async fn part_writer<'a>(
        &'a self,
        bucket: &BucketRecord,
        upload: &MultipartUpload,
        part_num: u32,
        expected_size: u64,
    ) -> CoreResult<PartWriter<'a>> {
        if part_num == 0 {
            return Err(CoreError::invalid("part numbers are 1-based"));
        }
        let (part_meta, base_off) = if upload.info.tiered {
            self.gateway().open(&upload.info.meta).await?;
            (upload.info.meta, (u64::from(part_num) - 1) * TIERED_PART_SIZE)
        } else {
            let meta = match self.gateway().create(expected_size).await {
                Ok(meta) => meta,
                Err(e) if e.is_already_exists() => {
                    // The retried part exists: reuse its container.
                    let tb = bucket.info.tenant_bucket();
                    let key = part_record_key(&upload.name, &upload.upload_id, part_num);
                    let raw = self
                        .index()
                        .get(&catalog::multipart_parts_index(&tb), key.as_bytes())
                        .await?;
                    let old = PartRecord::from_bytes(&raw)?;
                    self.gateway().open(&old.meta).await?;
                    old.meta
                }
                Err(e) => return Err(e),
            };
            (meta, 0)
        };

        let inner = AtomicWriter::for_existing(self.gateway().clone(), part_meta);
        Ok(PartWriter {
            store: self,
            bucket: bucket.clone(),
            upload: upload.clone(),
            part_num,
            base_off,
            part_meta,
            inner,
        })
    }

    /// List the parts of an upload with numbers above `marker`, ascending.
    /// Returns the records, the next marker, and a truncation flag.
    pub async fn list_parts(
        &self,
        bucket: &BucketRecord,
        upload: &MultipartUpload,
        max_parts: usize,
        marker: u32,
    ) -> CoreResult<(Vec<PartRecord>, u32, bool)> {
        if max_parts == 0 {
            return Ok((Vec::new(), marker, false));
        }
        let tb = bucket.info.tenant_bucket();
        let prefix = format!("{}.{}.", upload.name, upload.upload_id);
        let start = format!("{prefix}{:08}", marker + 1);
        let entries = self
            .index()
            .next(
                &catalog::multipart_parts_index(&tb),
                start.as_bytes(),
                max_parts,
                prefix.as_bytes(),
                b"",
            )
            .await?;

        let mut parts = Vec::with_capacity(entries.len());
        let mut next_marker = marker;
        for (_, raw) in &entries {
            let record = PartRecord::from_bytes(raw)?;
            if record.info.num > marker {
                next_marker = record.info.num;
                parts.push(record);
            }
        }
        let truncated = entries.len() >= max_parts;
        Ok((parts, next_marker, truncated))
    }

    /// Complete an upload against the client's part list.
    ///
    /// Validates part numbers, ETags, minimum sizes, and compression
    /// consistency; computes the composite ETag; adds the tiered extents;
    /// and swaps the in-progress record for the final bucket-index entry.
    pub async fn complete_multipart(
        &self,
        bucket: &BucketRecord,
        upload: &MultipartUpload,
        part_etags: &[(u32, String)],
    ) -> CoreResult<DirEntry> {
        let tb = bucket.info.tenant_bucket();
        if part_etags.is_empty() {
            return Err(CoreError::invalid("completion requires at least one part"));
        }
        if part_etags.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(CoreError::invalid("part list is not in ascending order"));
        }

        // Collect and validate every stored part.
        let mut stored: Vec<PartRecord> = Vec::new();
        let mut marker = 0u32;
        loop {
            let (batch, next, truncated) =
                self.list_parts(bucket, upload, PART_BATCH, marker).await?;
            stored.extend(batch);
            if !truncated {
                break;
            }
            marker = next;
        }
        if stored.len() != part_etags.len() {
            return Err(CoreError::invalid(format!(
                "part count mismatch: stored {} requested {}",
                stored.len(),
                part_etags.len()
            )));
        }

        let min_part = self.config().min_part_size;
        let mut hex_etags = Vec::with_capacity(stored.len());
        let mut extents: Vec<(u64, u64)> = Vec::with_capacity(stored.len());
        let mut off = 0u64;
        let mut accounted = 0u64;
        let mut compression: Option<String> = None;
        for (i, ((req_num, req_etag), part)) in part_etags.iter().zip(&stored).enumerate() {
            if *req_num != part.info.num {
                return Err(CoreError::invalid(format!(
                    "part number mismatch: requested {req_num}, stored {}",
                    part.info.num
                )));
            }
            let req_etag = req_etag.trim_matches('"');
            if req_etag != part.info.etag {
                return Err(CoreError::invalid(format!(
                    "part {req_num} etag mismatch"
                )));
            }
            if i + 1 < part_etags.len() && part.info.accounted_size < min_part {
                return Err(CoreError::EntityTooSmall);
            }
            match &compression {
                None => compression = Some(part.info.compression.clone()),
                Some(c) if *c != part.info.compression => {
                    return Err(CoreError::invalid(
                        "compression changed between parts",
                    ))
                }
                Some(_) => {}
            }
            hex_etags.push(part.info.etag.clone());
            extents.push((off, part.info.size));
            off += part.info.size;
            accounted += part.info.accounted_size;
        }
        let etag = compute_multipart_etag(&hex_etags);

        // Tiered: cover every part with a write and a read extent on the
        // top layer at its cumulative offset.
        if upload.info.tiered {
            let layer = upload.info.meta.top_layer.ok_or_else(|| {
                CoreError::decode("tiered upload lacks a top layer")
            })?;
            for &(ext_off, ext_len) in &extents {
                self.gateway()
                    .add_layer_extent(layer, ext_off, ext_len, true)
                    .await?;
                self.gateway()
                    .add_layer_extent(layer, ext_off, ext_len, false)
                    .await?;
            }
        }

        let mut record = self
            .in_progress_record(bucket, &upload.name, &upload.upload_id)
            .await?;
        let versioning = bucket.info.versioning;
        let instance = if versioning.enabled() {
            generate_version_id_now()
        } else {
            String::new()
        };
        record.entry.name.clone_from(&upload.name);
        record.entry.instance.clone_from(&instance);
        record.entry.size = off;
        record.entry.accounted_size = accounted;
        record.entry.mtime_ms = Utc::now().timestamp_millis();
        record.entry.etag = etag;
        record.entry.category = ObjCategory::MultiMeta;
        record.entry.flags = if versioning.versioned() {
            DirEntry::FLAG_VER | DirEntry::FLAG_CURRENT
        } else {
            0
        };

        if versioning.versioned() {
            self.update_version_entries(bucket, &upload.name, false).await?;
        }
        if !versioning.enabled() {
            self.remove_null_object(bucket, &upload.name).await?;
        }

        let key = entry_key(&upload.name, &instance);
        let raw = record.to_bytes();
        self.index()
            .put(&catalog::bucket_index(&tb), &key, raw.clone(), true)
            .await?;
        self.obj_cache().put(&obj_cache_key(&tb, &key), raw);

        let meta_key = multipart_meta_key(&upload.name, &upload.upload_id);
        self.del_tolerant(
            &catalog::multipart_in_progress_index(&tb),
            meta_key.as_bytes(),
        )
        .await?;

        debug!(bucket = %tb, name = %upload.name, upload = %upload.upload_id,
               size = off, parts = stored.len(), "completed upload");
        Ok(record.entry)
    }

    /// Abort an upload: destroy part containers (or the composite), drop
    /// every part record and the in-progress record, and give the
    /// accumulated size back to the statistics.
    pub async fn abort_multipart(
        &self,
        bucket: &BucketRecord,
        upload: &MultipartUpload,
    ) -> CoreResult<()> {
        let tb = bucket.info.tenant_bucket();
        let record = self
            .in_progress_record(bucket, &upload.name, &upload.upload_id)
            .await?;
        let info = UploadInfo::from_bytes(&record.entry.user_data)?;

        let (total_size, total_rounded) =
            self.teardown_upload_parts(&tb, &upload.name, &info).await?;

        update_bucket_stats_logged(
            self.index(),
            &bucket.info.owner,
            &tb,
            ObjCategory::Main,
            total_size,
            total_rounded,
            1,
            false,
        )
        .await;

        let meta_key = multipart_meta_key(&upload.name, &upload.upload_id);
        self.del_tolerant(
            &catalog::multipart_in_progress_index(&tb),
            meta_key.as_bytes(),
        )
        .await?;
        debug!(bucket = %tb, name = %upload.name, upload = %upload.upload_id, "aborted upload");
        Ok(())
    }

    /// List in-progress uploads whose object names start with `prefix`.
    pub async fn list_multipart_uploads(
        &self,
        bucket: &BucketRecord,
        prefix: &str,
        marker: &str,
        max: usize,
    ) -> CoreResult<(Vec<UploadSummary>, bool)> {
        if max == 0 {
            return Ok((Vec::new(), false));
        }
        let tb = bucket.info.tenant_bucket();
        let key_prefix = format!("_multipart_{prefix}");
        let mut start = if marker.is_empty() {
            key_prefix.clone().into_bytes()
        } else {
            let mut s = format!("_multipart_{marker}").into_bytes();
            s.push(0x00);
            s
        };
        if start.is_empty() {
            start = key_prefix.clone().into_bytes();
        }

        let entries = self
            .index()
            .next(
                &catalog::multipart_in_progress_index(&tb),
                &start,
                max + 1,
                key_prefix.as_bytes(),
                b"",
            )
            .await?;
        let truncated = entries.len() > max;

        let mut out = Vec::with_capacity(entries.len().min(max));
        for (_, raw) in entries.into_iter().take(max) {
            let record = ObjectRecord::from_bytes(&raw)?;
            let info = UploadInfo::from_bytes(&record.entry.user_data)?;
            let meta_key = record.entry.name.clone();
            let name = meta_key
                .strip_prefix("_multipart_")
                .and_then(|rest| rest.strip_suffix(&format!(".{}", info.upload_id)))
                .unwrap_or(&meta_key)
                .to_owned();
            out.push(UploadSummary {
                name,
                upload_id: info.upload_id,
                owner: record.entry.owner,
                initiated_ms: record.entry.mtime_ms,
            });
        }
        Ok((out, truncated))
    }

    /// Abort every in-progress upload of a bucket (bucket removal).
    pub async fn abort_all_multiparts(&self, bucket: &BucketRecord) -> CoreResult<()> {
        loop {
            let (uploads, _) = self.list_multipart_uploads(bucket, "", "", PART_BATCH).await?;
            if uploads.is_empty() {
                return Ok(());
            }
            for summary in uploads {
                let upload = self
                    .load_multipart(bucket, &summary.name, &summary.upload_id)
                    .await?;
                self.abort_multipart(bucket, &upload).await?;
            }
        }
    }

    /// Destroy the data of an upload: each part's container (separate
    /// strategy) or the composite root (tiered), plus every part record.
    /// Returns the accumulated `(size, rounded)` the parts carried.
    pub(crate) async fn teardown_upload_parts(
        &self,
        tenant_bucket: &str,
        name: &str,
        upload: &UploadInfo,
    ) -> CoreResult<(u64, u64)> {
        let parts_idx = catalog::multipart_parts_index(tenant_bucket);
        let prefix = format!("{}.{}.", name, upload.upload_id);
        let mut total_size = 0u64;
        let mut total_rounded = 0u64;

        loop {
            let entries = self
                .index()
                .next(&parts_idx, prefix.as_bytes(), PART_BATCH, prefix.as_bytes(), b"")
                .await?;
            if entries.is_empty() {
                break;
            }
            let got = entries.len();
            for (key, raw) in entries {
                let part = PartRecord::from_bytes(&raw)?;
                total_size += part.info.accounted_size;
                total_rounded += part.info.size_rounded;
                if !part.meta.is_composite && !part.meta.is_nil() {
                    match self.gateway().delete(&part.meta).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {
                            warn!(part = part.info.num, "part container already gone");
                        }
                        Err(e) => return Err(e),
                    }
                }
                self.index().del(&parts_idx, &key).await?;
            }
            if got < PART_BATCH {
                break;
            }
        }

        if upload.tiered && !upload.meta.is_nil() {
            match self.gateway().delete(&upload.meta).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok((total_size, total_rounded))
    }

    /// Read `[start, end]` of a completed separate-part multipart object
    /// by stitching the intersecting parts in order.
    pub(crate) async fn read_multipart_object(
        &self,
        bucket: &BucketRecord,
        record: &ObjectRecord,
        start: u64,
        end: u64,
        sink: &mut dyn FnMut(Bytes),
    ) -> CoreResult<()> {
        let info = UploadInfo::from_bytes(&record.entry.user_data)?;
        let upload = MultipartUpload {
            name: record.entry.name.clone(),
            upload_id: info.upload_id.clone(),
            info,
            owner: record.entry.owner.clone(),
        };

        let mut parts = Vec::new();
        let mut marker = 0u32;
        loop {
            let (batch, next, truncated) =
                self.list_parts(bucket, &upload, PART_BATCH, marker).await?;
            parts.extend(batch);
            if !truncated {
                break;
            }
            marker = next;
        }

        let mut cursor = start;
        let mut part_off = 0u64;
        for part in &parts {
            let size = part.info.size;
            if size == 0 {
                continue;
            }
            let part_end = part_off + size - 1;
            if part_end < start {
                part_off += size;
                continue;
            }
            let local_off = cursor - part_off;
            let local_end = if part_end < end { size - 1 } else { end - part_off };
            self.gateway()
                .read(&part.meta, size, local_off, local_end, sink)
                .await?;
            cursor = part_end + 1;
            part_off += size;
            if cursor > end {
                break;
            }
        }
        Ok(())
    }

    /// Apply a signed stats delta for part replacement.
    pub(crate) async fn apply_stats_delta(
        &self,
        owner: &str,
        tenant_bucket: &str,
        dsize: i64,
        drounded: i64,
    ) {
        if dsize == 0 && drounded == 0 {
            return;
        }
        // Same-signed deltas go in one write; mixed signs split in two.
        if dsize >= 0 && drounded >= 0 {
            update_bucket_stats_logged(
                self.index(),
                owner,
                tenant_bucket,
                ObjCategory::Main,
                dsize as u64,
                drounded as u64,
                0,
                true,
            )
            .await;
        } else if dsize <= 0 && drounded <= 0 {
            update_bucket_stats_logged(
                self.index(),
                owner,
                tenant_bucket,
                ObjCategory::Main,
                dsize.unsigned_abs(),
                drounded.unsigned_abs(),
                0,
                false,
            )
            .await;
        } else {
            update_bucket_stats_logged(
                self.index(),
                owner,
                tenant_bucket,
                ObjCategory::Main,
                dsize.unsigned_abs(),
                0,
                0,
                dsize > 0,
            )
            .await;
            update_bucket_stats_logged(
                self.index(),
                owner,
                tenant_bucket,
                ObjCategory::Main,
                0,
                drounded.unsigned_abs(),
                0,
                drounded > 0,
            )
            .await;
        }
    }
}
