//! Bucket catalog operations.
//!
//! Creating a bucket installs its instance record, its object index, both
//! multipart indices, an empty statistics header, and the owner's bucket
//! list entry. Removal tears all of that down, refusing while the bucket
//! still holds objects.

use chrono::Utc;
use tracing::{debug, warn};

use crate::catalog::{self, BUCKET_INSTANCES_IDX};
use crate::error::{CoreError, CoreResult};
use crate::objects::ListParams;
use crate::records::{Attrs, BucketEntry, BucketHeader, BucketInfo, BucketRecord, UserRecord, VersioningState};
use crate::store::Store;

impl Store {
    /// Create a bucket owned by `owner`.
    pub async fn create_bucket(
        &self,
        owner: &UserRecord,
        mut info: BucketInfo,
        attrs: Attrs,
    ) -> CoreResult<BucketRecord> {
        if info.name.is_empty() {
            return Err(CoreError::invalid("bucket name must not be empty"));
        }
        if info.placement.is_empty() {
            info.placement = "default".to_owned();
        }
        if info.zonegroup.is_empty() {
            info.zonegroup.clone_from(&self.config().zonegroup);
        }
        info.owner.clone_from(&owner.info.user_id);
        let now = Utc::now().timestamp_millis();
        if info.creation_ms == 0 {
            info.creation_ms = now;
        }
        let tb = info.tenant_bucket();

        let record = BucketRecord {
            info,
            attrs,
            mtime_ms: now,
            version: 1,
        };
        match self
            .index()
            .put(BUCKET_INSTANCES_IDX, tb.as_bytes(), record.to_bytes(), false)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                return Err(CoreError::AlreadyExists {
                    entity: format!("bucket {tb}"),
                })
            }
            Err(e) => return Err(e),
        }

        self.index().ensure(&catalog::bucket_index(&tb)).await?;
        self.index()
            .ensure(&catalog::multipart_in_progress_index(&tb))
            .await?;
        self.index().ensure(&catalog::multipart_parts_index(&tb)).await?;

        // Link into the owner's bucket list and seed the stats header.
        let owner_id = &record.info.owner;
        self.index().ensure(&catalog::user_info_index(owner_id)).await?;
        self.index()
            .put(
                &catalog::user_info_index(owner_id),
                tb.as_bytes(),
                BucketEntry {
                    size: 0,
                    creation_ms: record.info.creation_ms,
                }
                .to_bytes(),
                true,
            )
            .await?;
        self.index().ensure(&catalog::user_stats_index(owner_id)).await?;
        self.index()
            .put(
                &catalog::user_stats_index(owner_id),
                tb.as_bytes(),
                BucketHeader::default().to_bytes(),
                true,
            )
            .await?;

        self.bucket_cache().put(&tb, record.to_bytes());
        debug!(bucket = %tb, owner = %owner_id, "created bucket");
        Ok(record)
    }

    /// Load a bucket record, through the bucket cache.
    pub async fn load_bucket(&self, tenant: &str, name: &str) -> CoreResult<BucketRecord> {
        let tb = catalog::tenant_bucket(tenant, name);
        if let Some(raw) = self.bucket_cache().get(&tb) {
            return BucketRecord::from_bytes(&raw);
        }
        let raw = match self.index().get(BUCKET_INSTANCES_IDX, tb.as_bytes()).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                return Err(CoreError::NoSuchBucket { bucket: tb })
            }
            Err(e) => return Err(e),
        };
        self.bucket_cache().put(&tb, raw.clone());
        BucketRecord::from_bytes(&raw)
    }

    /// Persist a mutated bucket record, bumping its version.
    pub async fn store_bucket_record(&self, record: &mut BucketRecord) -> CoreResult<()> {
        record.mtime_ms = Utc::now().timestamp_millis();
        record.version += 1;
        let tb = record.info.tenant_bucket();
        let raw = record.to_bytes();
        self.index()
            .put(BUCKET_INSTANCES_IDX, tb.as_bytes(), raw.clone(), true)
            .await?;
        self.bucket_cache().put(&tb, raw);
        Ok(())
    }

    /// Change a bucket's versioning state. Once versioned, a bucket can
    /// only move between enabled and suspended.
    pub async fn set_bucket_versioning(
        &self,
        record: &mut BucketRecord,
        state: VersioningState,
    ) -> CoreResult<()> {
        if record.info.versioning.versioned() && state == VersioningState::Unversioned {
            return Err(CoreError::invalid(
                "versioning cannot be removed once enabled",
            ));
        }
        record.info.versioning = state;
        self.store_bucket_record(record).await
    }

    /// Remove an empty bucket: abort its in-progress uploads, drop its
    /// indices and statistics, unlink it from the owner, and delete the
    /// instance record.
    pub async fn remove_bucket(&self, tenant: &str, name: &str) -> CoreResult<()> {
        let record = self.load_bucket(tenant, name).await?;
        let tb = record.info.tenant_bucket();

        let listing = self
            .list_objects(
                &record,
                &ListParams {
                    max: 1,
                    list_versions: true,
                    ..ListParams::default()
                },
            )
            .await?;
        if !listing.entries.is_empty() {
            return Err(CoreError::BucketNotEmpty { bucket: tb });
        }

        self.abort_all_multiparts(&record).await?;

        for index in [
            catalog::multipart_in_progress_index(&tb),
            catalog::multipart_parts_index(&tb),
            catalog::bucket_index(&tb),
        ] {
            match self.index().delete(&index).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(bucket = %tb, index, error = %e, "bucket index teardown failed");
                    return Err(e);
                }
            }
        }

        let owner = &record.info.owner;
        self.del_tolerant(&catalog::user_stats_index(owner), tb.as_bytes())
            .await?;
        self.del_tolerant(&catalog::user_info_index(owner), tb.as_bytes())
            .await?;
        self.del_tolerant(BUCKET_INSTANCES_IDX, tb.as_bytes()).await?;
        self.bucket_cache().invalidate_remove(&tb);
        debug!(bucket = %tb, "removed bucket");
        Ok(())
    }

    /// List the buckets owned by a user, in name order, starting after
    /// `marker`. Returns entries plus a truncation flag.
    pub async fn list_buckets(
        &self,
        user_id: &str,
        marker: &str,
        max: usize,
    ) -> CoreResult<(Vec<(String, BucketEntry)>, bool)> {
        if max == 0 {
            return Ok((Vec::new(), false));
        }
        let mut start = marker.as_bytes().to_vec();
        if !marker.is_empty() {
            start.push(0x00); // resume strictly after the marker
        }
        let entries = match self
            .index()
            .next(&catalog::user_info_index(user_id), &start, max + 1, b"", b"")
            .await
        {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok((Vec::new(), false)),
            Err(e) => return Err(e),
        };
        let truncated = entries.len() > max;
        let mut out = Vec::with_capacity(entries.len().min(max));
        for (key, val) in entries.into_iter().take(max) {
            let name = String::from_utf8(key)
                .map_err(|_| CoreError::decode("bucket name is not UTF-8"))?;
            out.push((name, BucketEntry::from_bytes(&val)?));
        }
        Ok((out, truncated))
    }

    /// Read a bucket's statistics header.
    pub async fn bucket_stats(&self, record: &BucketRecord) -> CoreResult<BucketHeader> {
        catalog::read_bucket_stats(
            self.index(),
            &record.info.owner,
            &record.info.tenant_bucket(),
        )
        .await
    }
}
