//! Index schema and bucket/user statistics.
//!
//! Five global indices exist from bootstrap; everything else is created on
//! demand per user or per bucket. All name construction lives here so the
//! layout of the catalog is visible in one place.
//!
//! The statistics protocol is a read-modify-write of the per-bucket
//! [`BucketHeader`] under `stratus.user.stats.<owner>[bucket]`, performed
//! after the index write that changed the bucket. Concurrent writers can
//! lose increments; the catalog treats stats as an approximation with an
//! offline reconciliation scan as the recovery path, so callers log
//! failures and carry on.

use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::index::IndexGateway;
use crate::records::{BucketHeader, ObjCategory};

/// Global users index.
pub const USERS_IDX: &str = "stratus.users";
/// Global bucket-instances index.
pub const BUCKET_INSTANCES_IDX: &str = "stratus.bucket.instances";
/// Global per-bucket header index (reserved).
pub const BUCKET_HEADERS_IDX: &str = "stratus.bucket.headers";
/// Global access-key index.
pub const ACCESS_KEYS_IDX: &str = "stratus.access.keys";
/// Global email index.
pub const EMAILS_IDX: &str = "stratus.emails";

/// The indices created at bootstrap.
#[must_use]
pub fn global_indices() -> [&'static str; 5] {
    [
        USERS_IDX,
        BUCKET_INSTANCES_IDX,
        BUCKET_HEADERS_IDX,
        ACCESS_KEYS_IDX,
        EMAILS_IDX,
    ]
}

/// `<tenant>$<bucket>`, or `<bucket>` when the tenant is empty.
#[must_use]
pub fn tenant_bucket(tenant: &str, bucket: &str) -> String {
    if tenant.is_empty() {
        bucket.to_owned()
    } else {
        format!("{tenant}${bucket}")
    }
}

/// Index of the buckets owned by a user.
#[must_use]
pub fn user_info_index(user_id: &str) -> String {
    format!("stratus.user.info.{user_id}")
}

/// Index of a user's per-bucket statistics headers.
#[must_use]
pub fn user_stats_index(user_id: &str) -> String {
    format!("stratus.user.stats.{user_id}")
}

/// A bucket's object index.
#[must_use]
pub fn bucket_index(tenant_bucket: &str) -> String {
    format!("stratus.bucket.index.{tenant_bucket}")
}

/// A bucket's in-progress multipart uploads.
#[must_use]
pub fn multipart_in_progress_index(tenant_bucket: &str) -> String {
    format!("stratus.bucket.{tenant_bucket}.multiparts.in-progress")
}

/// A bucket's uploaded multipart parts.
#[must_use]
pub fn multipart_parts_index(tenant_bucket: &str) -> String {
    format!("stratus.bucket.{tenant_bucket}.multiparts")
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Apply `±(size, actual_size, count)` to one category of a bucket's
/// statistics header.
///
/// # Errors
///
/// Propagates index failures; callers on mutation paths log and continue.
pub async fn update_bucket_stats(
    index: &IndexGateway,
    owner: &str,
    tenant_bucket: &str,
    category: ObjCategory,
    size: u64,
    actual_size: u64,
    count: u64,
    add: bool,
) -> CoreResult<()> {
    let stats_index = user_stats_index(owner);
    let raw = index.get(&stats_index, tenant_bucket.as_bytes()).await?;
    let mut header = BucketHeader::from_bytes(&raw)?;

    let stats = header.category_mut(category);
    if add {
        stats.num_entries += count;
        stats.total_size += size;
        stats.actual_size += actual_size;
    } else {
        stats.num_entries = stats.num_entries.saturating_sub(count);
        stats.total_size = stats.total_size.saturating_sub(size);
        stats.actual_size = stats.actual_size.saturating_sub(actual_size);
    }

    index
        .put(&stats_index, tenant_bucket.as_bytes(), header.to_bytes(), true)
        .await
}

/// Apply a stats delta, logging instead of failing: stats are advisory
/// and the mutation that triggered them has already succeeded.
#[allow(clippy::too_many_arguments)]
pub async fn update_bucket_stats_logged(
    index: &IndexGateway,
    owner: &str,
    tenant_bucket: &str,
    category: ObjCategory,
    size: u64,
    actual_size: u64,
    count: u64,
    add: bool,
) {
    if let Err(e) = update_bucket_stats(
        index,
        owner,
        tenant_bucket,
        category,
        size,
        actual_size,
        count,
        add,
    )
    .await
    {
        warn!(owner, bucket = tenant_bucket, error = %e, "bucket stats update failed");
    }
}

/// Read a bucket's statistics header.
///
/// # Errors
///
/// Propagates index failures; absent headers decode as
/// [`CoreError::Transport`] not-found.
pub async fn read_bucket_stats(
    index: &IndexGateway,
    owner: &str,
    tenant_bucket: &str,
) -> CoreResult<BucketHeader> {
    let raw = index
        .get(&user_stats_index(owner), tenant_bucket.as_bytes())
        .await?;
    BucketHeader::from_bytes(&raw)
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

/// Quota evaluation, delegated to the deployment.
pub trait QuotaCheck: Send + Sync {
    /// Decide whether `owner` may add `size` bytes / `count` objects to
    /// `bucket`.
    ///
    /// # Errors
    ///
    /// An error (conventionally [`CoreError::InvalidArgument`] or a
    /// deployment-specific wrapper) denies the write.
    fn check(&self, owner: &str, bucket: &str, size: u64, count: u64) -> CoreResult<()>;
}

/// The permissive default: everything fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQuota;

impl QuotaCheck for NoQuota {
    fn check(&self, _owner: &str, _bucket: &str, _size: u64, _count: u64) -> CoreResult<()> {
        Ok(())
    }
}

/// A fixed byte budget per bucket, for deployments without an external
/// quota service.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuota {
    /// Maximum bytes per bucket.
    pub max_size: u64,
}

impl QuotaCheck for FixedQuota {
    fn check(&self, _owner: &str, bucket: &str, size: u64, _count: u64) -> CoreResult<()> {
        if size > self.max_size {
            return Err(CoreError::invalid(format!(
                "quota exceeded for bucket {bucket}: {size} > {}",
                self.max_size
            )));
        }
        Ok(())
    }
}
