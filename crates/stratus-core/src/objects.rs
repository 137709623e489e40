//! Object engine: versioned PUT/GET/DELETE, listing, copy, attributes.
//!
//! The bucket index holds one record per `(name, instance)` under the
//! version-qualified key scheme of [`crate::keys`]. Version instances sort
//! newest-first and the null-version record (empty instance) sorts before
//! all of them, so resolving "the latest version" is a two-record NEXT
//! from the name's prefix plus an mtime comparison, since the null record may
//! be older than a versioned successor.
//!
//! Two concurrent PUTs on one versioned name can each miss the other's
//! current flag; readers therefore never trust the flag alone and pick the
//! newest record by mtime. The flag converges on the next reconciliation.

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use stratus_store::layout::roundup;
use tracing::{debug, warn};

use crate::catalog::{self, update_bucket_stats_logged};
use crate::error::{CoreError, CoreResult};
use crate::gc::{now_ms, GcItem};
use crate::keys::{entry_key, entry_key_prefix, generate_version_id_now, normalize_instance};
use crate::records::{attr, Attrs, BucketRecord, DirEntry, ObjCategory, ObjectRecord, UploadInfo};
use crate::store::Store;
use crate::writer::AtomicWriter;

// ---------------------------------------------------------------------------
// Request parameter types
// ---------------------------------------------------------------------------

/// Conditional checks applied to GET/HEAD (and copy sources).
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    /// Succeed only when the entity tag matches.
    pub if_match: Option<String>,
    /// Succeed only when the entity tag does not match.
    pub if_none_match: Option<String>,
    /// Succeed only when modified after this time (ms since epoch).
    pub if_modified_since_ms: Option<i64>,
    /// Succeed only when not modified after this time (ms since epoch).
    pub if_unmodified_since_ms: Option<i64>,
}

impl Conditions {
    /// Evaluate against an entry's etag and mtime.
    ///
    /// # Errors
    ///
    /// [`CoreError::PreconditionFailed`] when any supplied check fails.
    pub fn check(&self, entry: &DirEntry) -> CoreResult<()> {
        if let Some(expected) = &self.if_match {
            if expected != "*" && *expected != entry.etag {
                return Err(CoreError::PreconditionFailed);
            }
        }
        if let Some(absent) = &self.if_none_match {
            if absent == "*" || *absent == entry.etag {
                return Err(CoreError::PreconditionFailed);
            }
        }
        if let Some(since) = self.if_unmodified_since_ms {
            if entry.mtime_ms > since {
                return Err(CoreError::PreconditionFailed);
            }
        }
        if let Some(since) = self.if_modified_since_ms {
            if entry.mtime_ms <= since {
                return Err(CoreError::PreconditionFailed);
            }
        }
        Ok(())
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteResult {
    /// Whether the operation produced (or removed) a delete marker.
    pub delete_marker: bool,
    /// The version the operation acted on or created (`"null"` for the
    /// null version).
    pub version_id: String,
}

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Resume after this name (the key of the last entry of the previous
    /// page).
    pub marker_name: String,
    /// Resume after this version of `marker_name`; `"null"` addresses the
    /// null version.
    pub marker_instance: String,
    /// Collapse keys at this delimiter into common prefixes.
    pub delim: String,
    /// Maximum entries (plus common prefixes) to return.
    pub max: usize,
    /// Return every version and delete marker rather than only visible
    /// objects.
    pub list_versions: bool,
}

/// Listing result.
#[derive(Debug, Clone, Default)]
pub struct ListResults {
    /// Matching records in bucket-index order.
    pub entries: Vec<DirEntry>,
    /// Collapsed common prefixes.
    pub common_prefixes: Vec<String>,
    /// Whether more entries remain.
    pub is_truncated: bool,
    /// Where to resume: `(name, instance)`, instance `"null"` for the
    /// null version.
    pub next_marker: Option<(String, String)>,
}

/// What to do with tags on copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagDirective {
    /// Carry the source object's tags.
    #[default]
    Copy,
    /// Use the tags supplied with the request.
    Replace,
}

/// Copy parameters.
#[derive(Debug, Clone, Default)]
pub struct CopyParams {
    /// Tag handling.
    pub tag_directive: TagDirective,
    /// Replacement tag set for [`TagDirective::Replace`].
    pub tags: Option<Bytes>,
    /// Conditional checks against the source.
    pub cond: Conditions,
}

// ---------------------------------------------------------------------------
// Object writer
// ---------------------------------------------------------------------------

/// Streaming writer for one object PUT.
///
/// Obtained from [`Store::object_writer`]; feed data with `process`
/// (an empty buffer ends the stream) and finish with `complete`, which
/// installs the bucket-index record.
#[derive(Debug)]
pub struct ObjectWriter<'a> {
    store: &'a Store,
    bucket: BucketRecord,
    name: String,
    instance: String,
    owner: String,
    owner_display: String,
    inner: AtomicWriter,
    mtime_override_ms: Option<i64>,
}

impl<'a> ObjectWriter<'a> {
    /// The version instance this write will land on (empty for the null
    /// version).
    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Feed a buffer arriving at `offset`; empty signals end-of-stream.
    pub async fn process(&mut self, data: Bytes, offset: u64) -> CoreResult<()> {
        self.inner.process(data, offset).await
    }

    /// Pin the entry mtime instead of stamping completion time.
    pub fn set_mtime_ms(&mut self, mtime_ms: i64) {
        self.mtime_override_ms = Some(mtime_ms);
    }

    /// Finish the stream and install the object record.
    pub async fn complete(self, attrs: Attrs) -> CoreResult<DirEntry> {
        let outcome = self.inner.complete().await?;
        let store = self.store;
        let bucket = &self.bucket;
        let tb = bucket.info.tenant_bucket();

        store
            .quota()
            .check(&self.owner, &tb, outcome.size, 1)?;

        let size_rounded = if outcome.meta.is_nil() {
            0
        } else {
            roundup(outcome.size, store.layouts().unit_size(outcome.meta.layout_id)?)
        };

        let versioning = bucket.info.versioning;
        let mut entry = DirEntry::new(&self.name, &self.instance, &self.owner);
        entry.owner_display = self.owner_display.clone();
        entry.size = outcome.size;
        entry.accounted_size = outcome.size;
        entry.mtime_ms = self
            .mtime_override_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        entry.etag = outcome.etag;
        if versioning.versioned() {
            entry.flags = DirEntry::FLAG_VER | DirEntry::FLAG_CURRENT;
        }

        if versioning.versioned() {
            store
                .update_version_entries(bucket, &self.name, false)
                .await?;
        }
        if !versioning.enabled() {
            // Overwrite of the null version is remove-then-insert.
            store.remove_null_object(bucket, &self.name).await?;
        }

        let record = ObjectRecord {
            entry: entry.clone(),
            attrs,
            meta: outcome.meta,
        };
        let key = entry_key(&self.name, &self.instance);
        let raw = record.to_bytes();
        store
            .index()
            .put(&catalog::bucket_index(&tb), &key, raw.clone(), true)
            .await?;
        store.obj_cache().put(&obj_cache_key(&tb, &key), raw);

        update_bucket_stats_logged(
            store.index(),
            &entry.owner,
            &tb,
            ObjCategory::Main,
            entry.size,
            size_rounded,
            1,
            true,
        )
        .await;

        debug!(bucket = %tb, name = %self.name, instance = %self.instance,
               size = entry.size, "put object");
        Ok(entry)
    }
}

/// Cache key for an object record: the bucket qualifies the
/// version-qualified object key.
pub(crate) fn obj_cache_key(tenant_bucket: &str, key: &[u8]) -> String {
    format!("{tenant_bucket}/{}", String::from_utf8_lossy(key))
}

// ---------------------------------------------------------------------------
// Engine operations
// ---------------------------------------------------------------------------

impl Store {
    /// Open a streaming writer for `name` in `bucket`.
    ///
    /// With versioning enabled the writer targets a freshly generated
    /// version instance; otherwise it targets the null version.
    #[must_use]
    pub fn object_writer(
        &self,
        bucket: &BucketRecord,
        name: &str,
        owner: &str,
        owner_display: &str,
        expected_size: u64,
    ) -> ObjectWriter<'_> {
        let instance = if bucket.info.versioning.enabled() {
            generate_version_id_now()
        } else {
            String::new()
        };
        ObjectWriter {
            store: self,
            bucket: bucket.clone(),
            name: name.to_owned(),
            instance,
            owner: owner.to_owned(),
            owner_display: owner_display.to_owned(),
            inner: AtomicWriter::for_new(self.gateway().clone(), expected_size),
            mtime_override_ms: None,
        }
    }

    /// One-shot PUT of an in-memory payload.
    pub async fn put_object(
        &self,
        bucket: &BucketRecord,
        name: &str,
        owner: &str,
        data: Bytes,
        attrs: Attrs,
    ) -> CoreResult<DirEntry> {
        let mut writer = self.object_writer(bucket, name, owner, owner, data.len() as u64);
        if !data.is_empty() {
            writer.process(data, 0).await?;
        }
        writer.process(Bytes::new(), 0).await?;
        writer.complete(attrs).await
    }

    /// Resolve the record GET/HEAD addresses: a direct fetch when an
    /// instance is given, otherwise the newest-by-mtime record of the
    /// name.
    pub async fn get_object_record(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: Option<&str>,
    ) -> CoreResult<ObjectRecord> {
        let tb = bucket.info.tenant_bucket();
        let raw = match instance {
            Some(inst) => {
                let key = entry_key(name, normalize_instance(inst));
                let cache_key = obj_cache_key(&tb, &key);
                if let Some(cached) = self.obj_cache().get(&cache_key) {
                    cached
                } else {
                    let raw = match self
                        .index()
                        .get(&catalog::bucket_index(&tb), &key)
                        .await
                    {
                        Ok(raw) => raw,
                        Err(e) if e.is_not_found() => {
                            return Err(CoreError::NoSuchKey {
                                key: name.to_owned(),
                            })
                        }
                        Err(e) => return Err(e),
                    };
                    self.obj_cache().put(&cache_key, raw.clone());
                    raw
                }
            }
            None => {
                let raw = self.fetch_latest_raw(bucket, name).await?;
                let record = ObjectRecord::from_bytes(&raw)?;
                let key = entry_key(&record.entry.name, &record.entry.instance);
                self.obj_cache().put(&obj_cache_key(&tb, &key), raw.clone());
                raw
            }
        };
        ObjectRecord::from_bytes(&raw)
    }

    /// HEAD: resolve the addressed record and evaluate conditionals.
    ///
    /// A delete marker resolves to `NoSuchKey` without an instance and to
    /// `MethodNotAllowed` when addressed explicitly.
    pub async fn head_object(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: Option<&str>,
        cond: &Conditions,
    ) -> CoreResult<DirEntry> {
        let record = self.get_object_record(bucket, name, instance).await?;
        if record.entry.is_delete_marker() {
            return Err(match instance {
                None => CoreError::NoSuchKey {
                    key: name.to_owned(),
                },
                Some(_) => CoreError::MethodNotAllowed,
            });
        }
        cond.check(&record.entry)?;
        Ok(record.entry)
    }

    /// GET: resolve, evaluate conditionals, and read the requested range
    /// (the whole object by default).
    ///
    /// Multipart objects stored as separate parts are stitched from their
    /// part containers; composite (tiered) objects read transparently.
    pub async fn read_object(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: Option<&str>,
        range: Option<(u64, u64)>,
        cond: &Conditions,
    ) -> CoreResult<(DirEntry, Bytes)> {
        let record = self.get_object_record(bucket, name, instance).await?;
        if record.entry.is_delete_marker() {
            return Err(match instance {
                None => CoreError::NoSuchKey {
                    key: name.to_owned(),
                },
                Some(_) => CoreError::MethodNotAllowed,
            });
        }
        cond.check(&record.entry)?;

        let size = record.entry.size;
        if size == 0 {
            if range.is_some() {
                return Err(CoreError::invalid("range on empty object"));
            }
            return Ok((record.entry, Bytes::new()));
        }
        let (start, end) = range.unwrap_or((0, size - 1));
        if start > end || end >= size {
            return Err(CoreError::invalid(format!(
                "range {start}..={end} outside object of {size} bytes"
            )));
        }

        let mut out = BytesMut::with_capacity((end - start + 1) as usize);
        let mut sink = |chunk: Bytes| out.extend_from_slice(&chunk);
        if record.entry.category == ObjCategory::MultiMeta && !record.meta.is_composite {
            self.read_multipart_object(bucket, &record, start, end, &mut sink)
                .await?;
        } else {
            self.gateway()
                .read(&record.meta, size, start, end, &mut sink)
                .await?;
        }
        Ok((record.entry, out.freeze()))
    }

    /// DELETE, covering the four versioning cases: plain removal for
    /// unversioned buckets, permanent removal of an addressed version,
    /// delete-marker insertion for versioned buckets, and null-record
    /// replacement for suspended versioning.
    pub async fn delete_object(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: Option<&str>,
        owner: &str,
    ) -> CoreResult<DeleteResult> {
        let record = self.get_object_record(bucket, name, instance).await?;
        let versioning = bucket.info.versioning;
        let mut result = DeleteResult::default();

        if !versioning.versioned() {
            let key = entry_key(name, &record.entry.instance);
            self.remove_entry_and_object(bucket, &record, &key).await?;
            return Ok(result);
        }

        if instance.is_some() {
            // Permanent removal of the addressed version.
            result.version_id = if record.entry.instance.is_empty() {
                "null".to_owned()
            } else {
                record.entry.instance.clone()
            };
            result.delete_marker = record.entry.is_delete_marker();
            let was_current = record.entry.is_current();
            let key = entry_key(name, &record.entry.instance);
            self.remove_entry_and_object(bucket, &record, &key).await?;
            if was_current {
                // Promote the next-newest record back to current.
                self.update_version_entries(bucket, name, true).await?;
            }
            return Ok(result);
        }

        // No instance: write a delete marker, never touching existing
        // versions (except the null record under suspension).
        result.delete_marker = true;
        let mut marker_instance = generate_version_id_now();
        result.version_id.clone_from(&marker_instance);

        if !versioning.enabled() {
            // Suspended: the marker replaces the null record.
            result.version_id = "null".to_owned();
            if record.entry.is_delete_marker() && record.entry.instance.is_empty() {
                debug!(name, "null delete marker already present");
                return Ok(result);
            }
            if record.entry.instance.is_empty() {
                let key = entry_key(name, "");
                self.remove_entry_and_object(bucket, &record, &key).await?;
            }
            marker_instance = String::new();
        }

        self.update_version_entries(bucket, name, false).await?;
        self.create_delete_marker(bucket, name, &marker_instance, owner)
            .await?;
        Ok(result)
    }

    /// Fetch the newest record of `name` by mtime: a NEXT of two from the
    /// name's prefix, where the null record (if present) is first but may
    /// lose to a newer versioned successor.
    pub(crate) async fn fetch_latest_raw(
        &self,
        bucket: &BucketRecord,
        name: &str,
    ) -> CoreResult<Bytes> {
        let tb = bucket.info.tenant_bucket();
        let entries = self
            .index()
            .next(
                &catalog::bucket_index(&tb),
                &entry_key_prefix(name),
                2,
                b"",
                b"",
            )
            .await?;

        let mut chosen: Option<(DirEntry, Bytes)> = None;
        for (_, raw) in entries {
            let record = ObjectRecord::from_bytes(&raw)?;
            if record.entry.name != name {
                break;
            }
            let newer = match &chosen {
                None => true,
                Some((best, _)) => {
                    // Maximal mtime wins; on a tie (including the transient
                    // two-current race) the record holding the current flag
                    // does.
                    record.entry.mtime_ms > best.mtime_ms
                        || (record.entry.mtime_ms == best.mtime_ms
                            && record.entry.is_current()
                            && !best.is_current())
                }
            };
            if newer {
                chosen = Some((record.entry, raw));
            }
        }
        chosen.map(|(_, raw)| raw).ok_or_else(|| CoreError::NoSuchKey {
            key: name.to_owned(),
        })
    }

    /// Reconcile the current flag of `name`'s newest record: clear it on
    /// the predecessor during PUT (`set_is_latest = false`) or promote the
    /// survivor after a version delete (`set_is_latest = true`).
    pub(crate) async fn update_version_entries(
        &self,
        bucket: &BucketRecord,
        name: &str,
        set_is_latest: bool,
    ) -> CoreResult<()> {
        let raw = match self.fetch_latest_raw(bucket, name).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut record = ObjectRecord::from_bytes(&raw)?;

        if !record.entry.is_current() && !set_is_latest {
            return Ok(()); // nothing to clear
        }

        record.entry.flags = match (set_is_latest, record.entry.is_delete_marker()) {
            (true, true) => DirEntry::FLAG_DELETE_MARKER,
            (true, false) => DirEntry::FLAG_VER | DirEntry::FLAG_CURRENT,
            (false, true) => DirEntry::FLAG_DELETE_MARKER | DirEntry::FLAG_VER,
            (false, false) => DirEntry::FLAG_VER,
        };

        let tb = bucket.info.tenant_bucket();
        let key = entry_key(&record.entry.name, &record.entry.instance);
        self.obj_cache().invalidate_remove(&obj_cache_key(&tb, &key));
        self.index()
            .put(&catalog::bucket_index(&tb), &key, record.to_bytes(), true)
            .await
    }

    /// Remove the null-version record of `name`, destroying its byte
    /// object. Absence is not an error (first write of a name).
    pub(crate) async fn remove_null_object(
        &self,
        bucket: &BucketRecord,
        name: &str,
    ) -> CoreResult<()> {
        let tb = bucket.info.tenant_bucket();
        let key = entry_key(name, "");
        let raw = match self.index().get(&catalog::bucket_index(&tb), &key).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let record = ObjectRecord::from_bytes(&raw)?;
        self.remove_entry_and_object(bucket, &record, &key).await
    }

    /// Destroy an index record and the byte object behind it: GC-enqueue
    /// when the collector runs (falling back to synchronous deletion),
    /// drop the index entry, and subtract statistics (delete markers are
    /// never counted).
    pub(crate) async fn remove_entry_and_object(
        &self,
        bucket: &BucketRecord,
        record: &ObjectRecord,
        key: &[u8],
    ) -> CoreResult<()> {
        let tb = bucket.info.tenant_bucket();
        let entry = &record.entry;
        let mut size_rounded = 0u64;

        if entry.size != 0 {
            if entry.category == ObjCategory::MultiMeta {
                let upload = UploadInfo::from_bytes(&entry.user_data)?;
                let mut pushed = false;
                if self.gc().is_enabled() {
                    let item = GcItem {
                        tag: upload.upload_id.clone(),
                        name: format!("{}.{}", entry.name, upload.upload_id),
                        meta: upload.meta,
                        deletion_time_ms: now_ms(),
                        size: entry.size,
                        part_index: Some(catalog::multipart_parts_index(&tb)),
                    };
                    match self.gc().enqueue(&item).await {
                        Ok(()) => pushed = true,
                        Err(e) => warn!(name = %entry.name, error = %e, "gc enqueue failed"),
                    }
                }
                if !pushed {
                    let (_, rounded) =
                        self.teardown_upload_parts(&tb, &entry.name, &upload).await?;
                    size_rounded = rounded;
                }
            } else {
                size_rounded = roundup(
                    entry.size,
                    self.layouts().unit_size(record.meta.layout_id)?,
                );
                let mut pushed = false;
                if self.gc().is_enabled() {
                    let item = GcItem {
                        tag: record.meta.oid.to_string(),
                        name: format!("{tb}/{}", entry.name),
                        meta: record.meta,
                        deletion_time_ms: now_ms(),
                        size: entry.size,
                        part_index: None,
                    };
                    match self.gc().enqueue(&item).await {
                        Ok(()) => pushed = true,
                        Err(e) => warn!(name = %entry.name, error = %e, "gc enqueue failed"),
                    }
                }
                if !pushed {
                    // Composite containers tear down layers and extents;
                    // plain containers are a single delete.
                    self.gateway().delete(&record.meta).await?;
                }
            }
        }

        self.index()
            .del(&catalog::bucket_index(&tb), key)
            .await?;
        self.obj_cache().invalidate_remove(&obj_cache_key(&tb, key));

        if entry.is_delete_marker() {
            return Ok(());
        }
        update_bucket_stats_logged(
            self.index(),
            &entry.owner,
            &tb,
            ObjCategory::Main,
            entry.size,
            size_rounded,
            1,
            false,
        )
        .await;
        Ok(())
    }

    async fn create_delete_marker(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: &str,
        owner: &str,
    ) -> CoreResult<()> {
        let tb = bucket.info.tenant_bucket();
        let mut entry = DirEntry::new(name, instance, owner);
        entry.mtime_ms = Utc::now().timestamp_millis();
        entry.flags =
            DirEntry::FLAG_DELETE_MARKER | DirEntry::FLAG_VER | DirEntry::FLAG_CURRENT;
        let record = ObjectRecord {
            entry,
            attrs: Attrs::new(),
            meta: Default::default(),
        };
        let key = entry_key(name, instance);
        let raw = record.to_bytes();
        self.index()
            .put(&catalog::bucket_index(&tb), &key, raw.clone(), true)
            .await?;
        self.obj_cache().put(&obj_cache_key(&tb, &key), raw);
        debug!(bucket = %tb, name, instance, "created delete marker");
        Ok(())
    }

    /// Fetch an object's attributes alongside its entry.
    pub async fn get_object_attrs(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: Option<&str>,
    ) -> CoreResult<ObjectRecord> {
        self.get_object_record(bucket, name, instance).await
    }

    /// Merge `set` into and drop `del` from an object's attributes,
    /// re-writing its record in place.
    pub async fn set_object_attrs(
        &self,
        bucket: &BucketRecord,
        name: &str,
        instance: Option<&str>,
        set: Attrs,
        del: &[String],
    ) -> CoreResult<()> {
        let mut record = self.get_object_record(bucket, name, instance).await?;
        if record.entry.is_delete_marker() {
            return Err(CoreError::MethodNotAllowed);
        }
        for (name, value) in set {
            record.attrs.insert(name, value);
        }
        for name in del {
            record.attrs.remove(name);
        }

        let tb = bucket.info.tenant_bucket();
        let key = entry_key(&record.entry.name, &record.entry.instance);
        let raw = record.to_bytes();
        self.index()
            .put(&catalog::bucket_index(&tb), &key, raw.clone(), true)
            .await?;
        self.obj_cache().put(&obj_cache_key(&tb, &key), raw);
        Ok(())
    }

    /// Copy an object within one zonegroup.
    ///
    /// Rejects self-copies, cross-zonegroup sources, and encrypted
    /// sources; streams the source through a destination writer and
    /// applies the tag directive.
    pub async fn copy_object(
        &self,
        src_bucket: &BucketRecord,
        src_name: &str,
        src_instance: Option<&str>,
        dst_bucket: &BucketRecord,
        dst_name: &str,
        owner: &str,
        params: CopyParams,
    ) -> CoreResult<DirEntry> {
        if src_bucket.info.zonegroup != dst_bucket.info.zonegroup {
            return Err(CoreError::NotImplemented {
                feature: "cross-zonegroup copy".to_owned(),
            });
        }
        if src_bucket.info.tenant_bucket() == dst_bucket.info.tenant_bucket()
            && src_name == dst_name
        {
            return Err(CoreError::invalid(
                "copy source and destination are the same object",
            ));
        }

        let source = self.get_object_record(src_bucket, src_name, src_instance).await?;
        if source.entry.is_delete_marker() {
            return Err(CoreError::NoSuchKey {
                key: src_name.to_owned(),
            });
        }
        if source.attrs.contains_key(attr::CRYPT_MODE) {
            return Err(CoreError::NotImplemented {
                feature: "copy of encrypted source".to_owned(),
            });
        }
        params.cond.check(&source.entry)?;

        let (_, body) = self
            .read_object(src_bucket, src_name, src_instance, None, &Conditions::default())
            .await?;

        let mut attrs = source.attrs.clone();
        match params.tag_directive {
            TagDirective::Copy => {}
            TagDirective::Replace => {
                attrs.remove(attr::TAGS);
                if let Some(tags) = params.tags {
                    attrs.insert(attr::TAGS.to_owned(), tags);
                }
            }
        }

        let mut writer =
            self.object_writer(dst_bucket, dst_name, owner, owner, body.len() as u64);
        if !body.is_empty() {
            writer.process(body, 0).await?;
        }
        writer.process(Bytes::new(), 0).await?;
        writer.complete(attrs).await
    }

    /// LIST: iterate the bucket index with prefix/delimiter collapsing,
    /// placing the null-version record of each name by mtime among its
    /// versions.
    ///
    /// The null record sorts first for its name regardless of age, so it
    /// is held pending and emitted the first time a record of a different
    /// name (or an older record of the same name) comes up.
    pub async fn list_objects(
        &self,
        bucket: &BucketRecord,
        params: &ListParams,
    ) -> CoreResult<ListResults> {
        let mut results = ListResults::default();
        if params.max == 0 {
            return Ok(results);
        }
        let tb = bucket.info.tenant_bucket();
        let bidx = catalog::bucket_index(&tb);
        let batch = self.config().next_batch;

        // Seed the scan at the prefix or after the marker; a marker ending
        // in the delimiter skips the whole collapsed directory.
        let mut start: Vec<u8> = params.prefix.as_bytes().to_vec();
        if !params.marker_name.is_empty() {
            start = params.marker_name.as_bytes().to_vec();
            if !params.delim.is_empty()
                && params.marker_name.len() >= params.delim.len()
                && params.marker_name.ends_with(&params.delim)
            {
                start.push(0xFF);
            }
        }

        // An instance marker must address a real record. The marker names
        // the first entry the page should return (the null marker resumes
        // at the still-pending null record).
        let mut marker_mtime: Option<i64> = None;
        if !params.marker_instance.is_empty() {
            let marker_key = entry_key(
                &params.marker_name,
                normalize_instance(&params.marker_instance),
            );
            self.index()
                .get(&bidx, &marker_key)
                .await
                .map_err(|_| CoreError::invalid("invalid version-id marker"))?;
        }

        let mut null_pending: Option<DirEntry> = None;
        let mut resume: Option<Vec<u8>> = None;

        'outer: loop {
            let start_key = resume.take().unwrap_or_else(|| start.clone());
            let entries = self
                .index()
                .next(
                    &bidx,
                    &start_key,
                    batch,
                    params.prefix.as_bytes(),
                    params.delim.as_bytes(),
                )
                .await?;
            let got = entries.len();
            if got == 0 {
                break;
            }

            for (key, val) in entries {
                if val.is_empty() {
                    // Collapsed directory.
                    let dir = String::from_utf8_lossy(&key).into_owned();
                    if results.common_prefixes.last() != Some(&dir)
                        && !results.common_prefixes.contains(&dir)
                    {
                        results.common_prefixes.push(dir);
                    }
                    let mut next = key;
                    next.push(0xFF);
                    resume = Some(next);
                    continue;
                }
                {
                    let mut next = key;
                    next.push(0x00);
                    resume = Some(next);
                }

                let record = ObjectRecord::from_bytes(&val)?;
                let ent = record.entry;
                if !(params.list_versions || ent.is_visible()) {
                    continue;
                }

                // Marker-name tie-breaks. The marker is the first entry
                // this page must return, so versions that sorted before it
                // (newer ones, already listed) are filtered out.
                if !params.marker_name.is_empty()
                    && ent.name == params.marker_name
                    && !params.marker_instance.is_empty()
                {
                    if params.marker_instance == "null" {
                        // Resuming at the pending null: everything newer
                        // than it was listed before it.
                        if let Some(null) = &null_pending {
                            if null.mtime_ms < ent.mtime_ms {
                                continue;
                            }
                        }
                    } else if !ent.instance.is_empty()
                        && ent.instance.as_str() < params.marker_instance.as_str()
                    {
                        // Newer than the marker: prior page. A pending
                        // null newer than this entry was listed back then
                        // too; remember its mtime to suppress re-emission.
                        if let Some(null) = &null_pending {
                            if null.mtime_ms >= ent.mtime_ms {
                                marker_mtime = Some(null.mtime_ms);
                            }
                        }
                        continue;
                    }
                }

                // Emit the pending null first when it sorts before this
                // entry by mtime, re-checking the budget each time.
                loop {
                    let null_first = null_pending.as_ref().is_some_and(|null| {
                        null.name != ent.name || null.mtime_ms > ent.mtime_ms
                    });
                    if results.entries.len() >= params.max {
                        // The marker names the first entry the next page
                        // returns: the pending null or this candidate.
                        results.is_truncated = true;
                        results.next_marker = if null_first {
                            null_pending
                                .as_ref()
                                .map(|null| (null.name.clone(), "null".to_owned()))
                        } else if ent.instance.is_empty() {
                            Some((ent.name.clone(), "null".to_owned()))
                        } else {
                            Some((ent.name.clone(), ent.instance.clone()))
                        };
                        break 'outer;
                    }
                    if null_first {
                        let null = null_pending.take().unwrap_or_else(|| ent.clone());
                        if Some(null.mtime_ms) != marker_mtime {
                            results.entries.push(null);
                            continue; // budget changed, re-check
                        }
                        // Already listed on a prior page; drop it.
                    }
                    break;
                }

                if ent.instance.is_empty() {
                    null_pending = Some(ent);
                } else {
                    results.entries.push(ent);
                }
            }

            if got < batch {
                break;
            }
        }

        if let Some(null) = null_pending {
            if results.is_truncated {
                // Resumption will re-find the pending null.
            } else if results.entries.len() < params.max {
                if Some(null.mtime_ms) != marker_mtime {
                    results.entries.push(null);
                }
            } else {
                results.next_marker = Some((null.name, "null".to_owned()));
                results.is_truncated = true;
            }
        }

        Ok(results)
    }
}
