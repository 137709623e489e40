//! Persisted record types and their byte codecs.
//!
//! Index values fall into a few shapes:
//!
//! - bucket-index and multipart-in-progress values are the triple
//!   `DirEntry + attrs + ObjectMeta` ([`ObjectRecord`]);
//! - part-index values are `PartInfo + attrs + ObjectMeta`
//!   ([`PartRecord`]);
//! - the global catalogs store [`UserRecord`], [`AccessKeyRecord`],
//!   [`BucketRecord`], [`BucketEntry`], and [`BucketHeader`].
//!
//! Every record is framed by the schema-versioned codec in
//! [`crate::codec`].

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use stratus_store::Id128;

use crate::codec::{
    decode_versioned, encode_versioned, get_attrs, get_bool, get_bytes, get_i64, get_str, get_u32,
    get_u64, get_u8, put_attrs, put_bool, put_bytes, put_str,
};
use crate::error::{CoreError, CoreResult};

/// Attribute set attached to objects, users, and buckets.
pub type Attrs = BTreeMap<String, Bytes>;

/// Well-known attribute names.
pub mod attr {
    /// The object's entity tag (hex MD5).
    pub const ETAG: &str = "etag";
    /// Object tag set, `k=v&k2=v2` encoded.
    pub const TAGS: &str = "tags";
    /// Server-side encryption mode; objects carrying this cannot be
    /// copied.
    pub const CRYPT_MODE: &str = "crypt-mode";
    /// The object's content type.
    pub const CONTENT_TYPE: &str = "content-type";
}

// ---------------------------------------------------------------------------
// Categories, flags, versioning state
// ---------------------------------------------------------------------------

/// Record category inside a bucket index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjCategory {
    /// A plain object.
    Main,
    /// The head record of a multipart-uploaded object.
    MultiMeta,
}

impl ObjCategory {
    fn to_u8(self) -> u8 {
        match self {
            Self::Main => 1,
            Self::MultiMeta => 2,
        }
    }

    fn from_u8(v: u8) -> CoreResult<Self> {
        match v {
            1 => Ok(Self::Main),
            2 => Ok(Self::MultiMeta),
            other => Err(CoreError::decode(format!("unknown category {other}"))),
        }
    }
}

/// Bucket versioning state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersioningState {
    /// Versioning has never been enabled.
    #[default]
    Unversioned,
    /// Versioning is enabled.
    Enabled,
    /// Versioning was enabled and later suspended.
    Suspended,
}

impl VersioningState {
    /// Whether the bucket ever had versioning (enabled or suspended).
    #[must_use]
    pub fn versioned(&self) -> bool {
        !matches!(self, Self::Unversioned)
    }

    /// Whether versioning is currently enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Unversioned => 0,
            Self::Enabled => 1,
            Self::Suspended => 2,
        }
    }

    fn from_u8(v: u8) -> CoreResult<Self> {
        match v {
            0 => Ok(Self::Unversioned),
            1 => Ok(Self::Enabled),
            2 => Ok(Self::Suspended),
            other => Err(CoreError::decode(format!("unknown versioning state {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// DirEntry
// ---------------------------------------------------------------------------

/// One record in a bucket index: the primary metadata of a
/// `(name, instance)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    /// The object name.
    pub name: String,
    /// The version instance; empty for the null version.
    pub instance: String,
    /// Logical object size in bytes.
    pub size: u64,
    /// Size as accounted in bucket statistics.
    pub accounted_size: u64,
    /// Last-modified time, milliseconds since the epoch.
    pub mtime_ms: i64,
    /// Hex MD5 entity tag (with `-<n>` suffix for multipart objects).
    pub etag: String,
    /// Owning user ID.
    pub owner: String,
    /// Owner display name.
    pub owner_display: String,
    /// Record category.
    pub category: ObjCategory,
    /// `FLAG_*` bits.
    pub flags: u8,
    /// Opaque payload; multipart head records carry their encoded
    /// [`UploadInfo`] here.
    pub user_data: Bytes,
}

impl DirEntry {
    /// The record belongs to a versioned bucket.
    pub const FLAG_VER: u8 = 0x01;
    /// The record is the latest live version of its name.
    pub const FLAG_CURRENT: u8 = 0x02;
    /// The record is a delete marker.
    pub const FLAG_DELETE_MARKER: u8 = 0x04;

    const RECORD_VER: u8 = 1;

    /// Create an entry with the given identity and empty metadata.
    #[must_use]
    pub fn new(name: &str, instance: &str, owner: &str) -> Self {
        Self {
            name: name.to_owned(),
            instance: instance.to_owned(),
            size: 0,
            accounted_size: 0,
            mtime_ms: 0,
            etag: String::new(),
            owner: owner.to_owned(),
            owner_display: String::new(),
            category: ObjCategory::Main,
            flags: 0,
            user_data: Bytes::new(),
        }
    }

    /// Whether this record is the latest version of its name. Records
    /// without the versioned flag (unversioned buckets) always are.
    #[must_use]
    pub fn is_current(&self) -> bool {
        let test = Self::FLAG_VER | Self::FLAG_CURRENT;
        (self.flags & Self::FLAG_VER) == 0 || (self.flags & test) == test
    }

    /// Whether this record is a delete marker.
    #[must_use]
    pub fn is_delete_marker(&self) -> bool {
        self.flags & Self::FLAG_DELETE_MARKER != 0
    }

    /// Whether this record shows up in a non-version listing.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.is_current() && !self.is_delete_marker()
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_versioned(buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            put_str(b, &self.name);
            put_str(b, &self.instance);
            b.put_u64(self.size);
            b.put_u64(self.accounted_size);
            b.put_i64(self.mtime_ms);
            put_str(b, &self.etag);
            put_str(b, &self.owner);
            put_str(b, &self.owner_display);
            b.put_u8(self.category.to_u8());
            b.put_u8(self.flags);
            put_bytes(b, &self.user_data);
        });
    }

    /// Decode from `cur`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on truncated or newer-than-supported records.
    pub fn decode(cur: &mut &[u8]) -> CoreResult<Self> {
        decode_versioned(cur, Self::RECORD_VER, |b| {
            Ok(Self {
                name: get_str(b)?,
                instance: get_str(b)?,
                size: get_u64(b)?,
                accounted_size: get_u64(b)?,
                mtime_ms: get_i64(b)?,
                etag: get_str(b)?,
                owner: get_str(b)?,
                owner_display: get_str(b)?,
                category: ObjCategory::from_u8(get_u8(b)?)?,
                flags: get_u8(b)?,
                user_data: get_bytes(b)?,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// ObjectMeta
// ---------------------------------------------------------------------------

/// Identity and shape of the byte container backing an object.
///
/// Zero-byte objects have no container at all; their meta is
/// [`ObjectMeta::NIL`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    /// The container's object ID.
    pub oid: Id128,
    /// Pool version the container was placed against.
    pub pver: Id128,
    /// Striping layout ID.
    pub layout_id: u64,
    /// Whether the container is a composite object.
    pub is_composite: bool,
    /// The top layer's sub-object ID for composite containers.
    pub top_layer: Option<Id128>,
}

impl ObjectMeta {
    /// The "no byte container" meta.
    pub const NIL: ObjectMeta = ObjectMeta {
        oid: Id128::NIL,
        pver: Id128::NIL,
        layout_id: 0,
        is_composite: false,
        top_layer: None,
    };

    const RECORD_VER: u8 = 1;

    /// Whether no byte container exists (zero-byte objects).
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.oid.is_nil()
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_versioned(buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            b.put_u64(self.oid.hi);
            b.put_u64(self.oid.lo);
            b.put_u64(self.pver.hi);
            b.put_u64(self.pver.lo);
            b.put_u64(self.layout_id);
            put_bool(b, self.is_composite);
            match self.top_layer {
                Some(layer) => {
                    put_bool(b, true);
                    b.put_u64(layer.hi);
                    b.put_u64(layer.lo);
                }
                None => put_bool(b, false),
            }
        });
    }

    /// Decode from `cur`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on truncated or newer-than-supported records.
    pub fn decode(cur: &mut &[u8]) -> CoreResult<Self> {
        decode_versioned(cur, Self::RECORD_VER, |b| {
            let oid = Id128::new(get_u64(b)?, get_u64(b)?);
            let pver = Id128::new(get_u64(b)?, get_u64(b)?);
            let layout_id = get_u64(b)?;
            let is_composite = get_bool(b)?;
            let top_layer = if get_bool(b)? {
                Some(Id128::new(get_u64(b)?, get_u64(b)?))
            } else {
                None
            };
            Ok(Self {
                oid,
                pver,
                layout_id,
                is_composite,
                top_layer,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// ObjectRecord: the bucket-index value triple
// ---------------------------------------------------------------------------

/// The value stored under a version-qualified key in a bucket index (and
/// under a meta key in the multipart in-progress index).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    /// Primary metadata.
    pub entry: DirEntry,
    /// Attribute set.
    pub attrs: Attrs,
    /// Byte-container identity.
    pub meta: ObjectMeta,
}

impl ObjectRecord {
    const ATTRS_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.entry.encode(&mut buf);
        encode_versioned(&mut buf, Self::ATTRS_VER, Self::ATTRS_VER, |b| {
            put_attrs(b, &self.attrs);
        });
        self.meta.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a buffer written by [`ObjectRecord::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        let entry = DirEntry::decode(&mut cur)?;
        let attrs = decode_versioned(&mut cur, Self::ATTRS_VER, |b| get_attrs(b))?;
        let meta = ObjectMeta::decode(&mut cur)?;
        Ok(Self { entry, attrs, meta })
    }
}

// ---------------------------------------------------------------------------
// Multipart records
// ---------------------------------------------------------------------------

/// Metadata of one uploaded part.
#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    /// 1-based part number.
    pub num: u32,
    /// Hex MD5 of the part body.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
    /// Size rounded up to the part container's unit size.
    pub size_rounded: u64,
    /// Size as accounted in bucket statistics.
    pub accounted_size: u64,
    /// Upload time, milliseconds since the epoch.
    pub mtime_ms: i64,
    /// Compression applied to the part (`"none"` when uncompressed).
    pub compression: String,
}

impl PartInfo {
    const RECORD_VER: u8 = 1;

    fn encode(&self, buf: &mut BytesMut) {
        encode_versioned(buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            b.put_u32(self.num);
            put_str(b, &self.etag);
            b.put_u64(self.size);
            b.put_u64(self.size_rounded);
            b.put_u64(self.accounted_size);
            b.put_i64(self.mtime_ms);
            put_str(b, &self.compression);
        });
    }

    fn decode(cur: &mut &[u8]) -> CoreResult<Self> {
        decode_versioned(cur, Self::RECORD_VER, |b| {
            Ok(Self {
                num: get_u32(b)?,
                etag: get_str(b)?,
                size: get_u64(b)?,
                size_rounded: get_u64(b)?,
                accounted_size: get_u64(b)?,
                mtime_ms: get_i64(b)?,
                compression: get_str(b)?,
            })
        })
    }
}

/// The value stored under a part key in the multipart parts index.
#[derive(Debug, Clone, PartialEq)]
pub struct PartRecord {
    /// Part metadata.
    pub info: PartInfo,
    /// Attribute set captured at part upload.
    pub attrs: Attrs,
    /// The part's byte-container identity (the composite root for tiered
    /// uploads).
    pub meta: ObjectMeta,
}

impl PartRecord {
    const ATTRS_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.info.encode(&mut buf);
        encode_versioned(&mut buf, Self::ATTRS_VER, Self::ATTRS_VER, |b| {
            put_attrs(b, &self.attrs);
        });
        self.meta.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a buffer written by [`PartRecord::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        let info = PartInfo::decode(&mut cur)?;
        let attrs = decode_versioned(&mut cur, Self::ATTRS_VER, |b| get_attrs(b))?;
        let meta = ObjectMeta::decode(&mut cur)?;
        Ok(Self { info, attrs, meta })
    }
}

/// Upload state carried by a multipart head record, separate-part or
/// tiered.
///
/// A multipart upload spans several requests; between them the only
/// persistent carrier of the upload's identity is this record, embedded in
/// the head entry's `user_data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadInfo {
    /// Placement rule of the destination.
    pub placement: String,
    /// The upload's opaque identifier.
    pub upload_id: String,
    /// Whether the upload writes into one composite object (tiered) or
    /// one byte object per part.
    pub tiered: bool,
    /// The composite root's identity for tiered uploads.
    pub meta: ObjectMeta,
}

impl UploadInfo {
    const RECORD_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            put_str(b, &self.placement);
            put_str(b, &self.upload_id);
            put_bool(b, self.tiered);
        });
        self.meta.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a buffer written by [`UploadInfo::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        let (placement, upload_id, tiered) =
            decode_versioned(&mut cur, Self::RECORD_VER, |b| {
                Ok((get_str(b)?, get_str(b)?, get_bool(b)?))
            })?;
        let meta = ObjectMeta::decode(&mut cur)?;
        Ok(Self {
            placement,
            upload_id,
            tiered,
            meta,
        })
    }
}

// ---------------------------------------------------------------------------
// User records
// ---------------------------------------------------------------------------

/// An access key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKey {
    /// The access key ID.
    pub id: String,
    /// The secret key.
    pub secret: String,
}

/// Identity and credentials of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Unique user ID.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Contact email; indexed for lookup.
    pub email: String,
    /// The user's access keys.
    pub access_keys: Vec<AccessKey>,
}

/// The value stored in the global users index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRecord {
    /// User identity.
    pub info: UserInfo,
    /// Monotonic record version for optimistic concurrency.
    pub version: u64,
    /// Version tag, set when the record is first written.
    pub version_tag: String,
    /// Attribute set.
    pub attrs: Attrs,
}

impl UserRecord {
    const RECORD_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            put_str(b, &self.info.user_id);
            put_str(b, &self.info.display_name);
            put_str(b, &self.info.email);
            b.put_u32(self.info.access_keys.len() as u32);
            for key in &self.info.access_keys {
                put_str(b, &key.id);
                put_str(b, &key.secret);
            }
            b.put_u64(self.version);
            put_str(b, &self.version_tag);
            put_attrs(b, &self.attrs);
        });
        buf.freeze()
    }

    /// Decode a buffer written by [`UserRecord::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        decode_versioned(&mut cur, Self::RECORD_VER, |b| {
            let user_id = get_str(b)?;
            let display_name = get_str(b)?;
            let email = get_str(b)?;
            let key_count = get_u32(b)?;
            let mut access_keys = Vec::with_capacity(key_count as usize);
            for _ in 0..key_count {
                access_keys.push(AccessKey {
                    id: get_str(b)?,
                    secret: get_str(b)?,
                });
            }
            Ok(Self {
                info: UserInfo {
                    user_id,
                    display_name,
                    email,
                    access_keys,
                },
                version: get_u64(b)?,
                version_tag: get_str(b)?,
                attrs: get_attrs(b)?,
            })
        })
    }
}

/// The value stored in the global access-key index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyRecord {
    /// The owning user's ID.
    pub user_id: String,
    /// The secret for the key.
    pub secret: String,
}

impl AccessKeyRecord {
    const RECORD_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            put_str(b, &self.user_id);
            put_str(b, &self.secret);
        });
        buf.freeze()
    }

    /// Decode a buffer written by [`AccessKeyRecord::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        decode_versioned(&mut cur, Self::RECORD_VER, |b| {
            Ok(Self {
                user_id: get_str(b)?,
                secret: get_str(b)?,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Bucket records
// ---------------------------------------------------------------------------

/// Core identity of a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// Owning tenant; empty for the default tenant.
    pub tenant: String,
    /// Owning user ID.
    pub owner: String,
    /// Zonegroup the bucket lives in.
    pub zonegroup: String,
    /// Placement rule name.
    pub placement: String,
    /// Versioning state.
    pub versioning: VersioningState,
    /// Creation time, milliseconds since the epoch.
    pub creation_ms: i64,
}

impl BucketInfo {
    /// The `<tenant>$<bucket>` form used in index names and catalog keys.
    #[must_use]
    pub fn tenant_bucket(&self) -> String {
        if self.tenant.is_empty() {
            self.name.clone()
        } else {
            format!("{}${}", self.tenant, self.name)
        }
    }
}

/// The value stored in the global bucket-instances index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketRecord {
    /// Bucket identity.
    pub info: BucketInfo,
    /// Attribute set.
    pub attrs: Attrs,
    /// Last-modified time, milliseconds since the epoch.
    pub mtime_ms: i64,
    /// Monotonic record version.
    pub version: u64,
}

impl BucketRecord {
    const RECORD_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            put_str(b, &self.info.name);
            put_str(b, &self.info.tenant);
            put_str(b, &self.info.owner);
            put_str(b, &self.info.zonegroup);
            put_str(b, &self.info.placement);
            b.put_u8(self.info.versioning.to_u8());
            b.put_i64(self.info.creation_ms);
            put_attrs(b, &self.attrs);
            b.put_i64(self.mtime_ms);
            b.put_u64(self.version);
        });
        buf.freeze()
    }

    /// Decode a buffer written by [`BucketRecord::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        decode_versioned(&mut cur, Self::RECORD_VER, |b| {
            Ok(Self {
                info: BucketInfo {
                    name: get_str(b)?,
                    tenant: get_str(b)?,
                    owner: get_str(b)?,
                    zonegroup: get_str(b)?,
                    placement: get_str(b)?,
                    versioning: VersioningState::from_u8(get_u8(b)?)?,
                    creation_ms: get_i64(b)?,
                },
                attrs: get_attrs(b)?,
                mtime_ms: get_i64(b)?,
                version: get_u64(b)?,
            })
        })
    }
}

/// Per-bucket entry in a user's bucket list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketEntry {
    /// Total size attributed to the bucket at link time.
    pub size: u64,
    /// Creation time, milliseconds since the epoch.
    pub creation_ms: i64,
}

impl BucketEntry {
    const RECORD_VER: u8 = 1;

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            b.put_u64(self.size);
            b.put_i64(self.creation_ms);
        });
        buf.freeze()
    }

    /// Decode a buffer written by [`BucketEntry::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        decode_versioned(&mut cur, Self::RECORD_VER, |b| {
            Ok(Self {
                size: get_u64(b)?,
                creation_ms: get_i64(b)?,
            })
        })
    }
}

/// Accounting counters for one record category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// Number of live entries.
    pub num_entries: u64,
    /// Sum of logical sizes.
    pub total_size: u64,
    /// Sum of unit-rounded sizes.
    pub actual_size: u64,
}

/// Per-bucket statistics header, one counter set per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketHeader {
    /// Category byte → counters.
    pub stats: BTreeMap<u8, CategoryStats>,
}

impl BucketHeader {
    const RECORD_VER: u8 = 1;

    /// Mutable counters for a category, created on first touch.
    pub fn category_mut(&mut self, category: ObjCategory) -> &mut CategoryStats {
        self.stats.entry(category.to_u8()).or_default()
    }

    /// Counters for a category, zero when never touched.
    #[must_use]
    pub fn category(&self, category: ObjCategory) -> CategoryStats {
        self.stats.get(&category.to_u8()).copied().unwrap_or_default()
    }

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            b.put_u32(self.stats.len() as u32);
            for (category, stats) in &self.stats {
                b.put_u8(*category);
                b.put_u64(stats.num_entries);
                b.put_u64(stats.total_size);
                b.put_u64(stats.actual_size);
            }
        });
        buf.freeze()
    }

    /// Decode a buffer written by [`BucketHeader::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        decode_versioned(&mut cur, Self::RECORD_VER, |b| {
            let count = get_u32(b)?;
            let mut stats = BTreeMap::new();
            for _ in 0..count {
                let category = get_u8(b)?;
                stats.insert(
                    category,
                    CategoryStats {
                        num_entries: get_u64(b)?,
                        total_size: get_u64(b)?,
                        actual_size: get_u64(b)?,
                    },
                );
            }
            Ok(Self { stats })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> DirEntry {
        DirEntry {
            name: "photos/cat.jpg".to_owned(),
            instance: "Zk3abcdef0123456789012345678901".to_owned(),
            size: 1234,
            accounted_size: 1234,
            mtime_ms: 1_700_000_000_000,
            etag: "5d41402abc4b2a76b9719d911017c592".to_owned(),
            owner: "alice".to_owned(),
            owner_display: "Alice".to_owned(),
            category: ObjCategory::Main,
            flags: DirEntry::FLAG_VER | DirEntry::FLAG_CURRENT,
            user_data: Bytes::new(),
        }
    }

    #[test]
    fn test_should_roundtrip_dir_entry() {
        let entry = sample_entry();
        let mut buf = BytesMut::new();
        entry.encode(&mut buf);
        let mut cur = &buf[..];
        let decoded = DirEntry::decode(&mut cur).expect("decode");
        assert_eq!(decoded, entry);
        assert!(cur.is_empty());
    }

    #[test]
    fn test_should_evaluate_entry_flags() {
        let mut entry = sample_entry();
        assert!(entry.is_current());
        assert!(entry.is_visible());
        assert!(!entry.is_delete_marker());

        entry.flags = DirEntry::FLAG_VER;
        assert!(!entry.is_current());
        assert!(!entry.is_visible());

        // Unversioned records are always current.
        entry.flags = 0;
        assert!(entry.is_current());
        assert!(entry.is_visible());

        entry.flags = DirEntry::FLAG_VER | DirEntry::FLAG_CURRENT | DirEntry::FLAG_DELETE_MARKER;
        assert!(entry.is_delete_marker());
        assert!(!entry.is_visible());
    }

    #[test]
    fn test_should_roundtrip_object_meta() {
        let meta = ObjectMeta {
            oid: Id128::new(1, 2),
            pver: Id128::new(3, 4),
            layout_id: 9,
            is_composite: true,
            top_layer: Some(Id128::new(5, 6)),
        };
        let mut buf = BytesMut::new();
        meta.encode(&mut buf);
        let mut cur = &buf[..];
        assert_eq!(ObjectMeta::decode(&mut cur).expect("decode"), meta);

        assert!(ObjectMeta::NIL.is_nil());
        assert!(!meta.is_nil());
    }

    #[test]
    fn test_should_roundtrip_object_record() {
        let mut attrs = Attrs::new();
        attrs.insert(attr::ETAG.to_owned(), Bytes::from("abc"));
        let record = ObjectRecord {
            entry: sample_entry(),
            attrs,
            meta: ObjectMeta {
                oid: Id128::new(7, 8),
                pver: Id128::new(9, 10),
                layout_id: 2,
                is_composite: false,
                top_layer: None,
            },
        };
        let bytes = record.to_bytes();
        assert_eq!(ObjectRecord::from_bytes(&bytes).expect("decode"), record);
    }

    #[test]
    fn test_should_roundtrip_part_record() {
        let record = PartRecord {
            info: PartInfo {
                num: 3,
                etag: "00ff".to_owned(),
                size: 100,
                size_rounded: 4096,
                accounted_size: 100,
                mtime_ms: 42,
                compression: "none".to_owned(),
            },
            attrs: Attrs::new(),
            meta: ObjectMeta::NIL,
        };
        let bytes = record.to_bytes();
        assert_eq!(PartRecord::from_bytes(&bytes).expect("decode"), record);
    }

    #[test]
    fn test_should_roundtrip_upload_info() {
        let info = UploadInfo {
            placement: "default".to_owned(),
            upload_id: "2~abcdef".to_owned(),
            tiered: true,
            meta: ObjectMeta {
                oid: Id128::new(11, 12),
                pver: Id128::new(13, 14),
                layout_id: 3,
                is_composite: true,
                top_layer: Some(Id128::new(15, 16)),
            },
        };
        let bytes = info.to_bytes();
        assert_eq!(UploadInfo::from_bytes(&bytes).expect("decode"), info);
    }

    #[test]
    fn test_should_roundtrip_user_record() {
        let record = UserRecord {
            info: UserInfo {
                user_id: "alice".to_owned(),
                display_name: "Alice".to_owned(),
                email: "alice@example.com".to_owned(),
                access_keys: vec![AccessKey {
                    id: "AK1".to_owned(),
                    secret: "s3cr3t".to_owned(),
                }],
            },
            version: 4,
            version_tag: "user".to_owned(),
            attrs: Attrs::new(),
        };
        let bytes = record.to_bytes();
        assert_eq!(UserRecord::from_bytes(&bytes).expect("decode"), record);
    }

    #[test]
    fn test_should_roundtrip_bucket_record() {
        let record = BucketRecord {
            info: BucketInfo {
                name: "media".to_owned(),
                tenant: "acme".to_owned(),
                owner: "alice".to_owned(),
                zonegroup: "default".to_owned(),
                placement: "default".to_owned(),
                versioning: VersioningState::Enabled,
                creation_ms: 1_700_000_000_000,
            },
            attrs: Attrs::new(),
            mtime_ms: 1_700_000_000_001,
            version: 2,
        };
        let bytes = record.to_bytes();
        assert_eq!(BucketRecord::from_bytes(&bytes).expect("decode"), record);
    }

    #[test]
    fn test_should_build_tenant_bucket_name() {
        let mut info = BucketInfo {
            name: "media".to_owned(),
            ..BucketInfo::default()
        };
        assert_eq!(info.tenant_bucket(), "media");
        info.tenant = "acme".to_owned();
        assert_eq!(info.tenant_bucket(), "acme$media");
    }

    #[test]
    fn test_should_report_versioning_state() {
        assert!(!VersioningState::Unversioned.versioned());
        assert!(VersioningState::Enabled.versioned());
        assert!(VersioningState::Suspended.versioned());
        assert!(VersioningState::Enabled.enabled());
        assert!(!VersioningState::Suspended.enabled());
    }

    #[test]
    fn test_should_roundtrip_bucket_header() {
        let mut header = BucketHeader::default();
        {
            let stats = header.category_mut(ObjCategory::Main);
            stats.num_entries = 3;
            stats.total_size = 300;
            stats.actual_size = 12_288;
        }
        let bytes = header.to_bytes();
        let decoded = BucketHeader::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, header);
        assert_eq!(decoded.category(ObjCategory::Main).num_entries, 3);
        assert_eq!(decoded.category(ObjCategory::MultiMeta), CategoryStats::default());
    }

    #[test]
    fn test_should_roundtrip_bucket_entry_and_access_key() {
        let entry = BucketEntry {
            size: 10,
            creation_ms: 20,
        };
        assert_eq!(
            BucketEntry::from_bytes(&entry.to_bytes()).expect("decode"),
            entry
        );

        let key = AccessKeyRecord {
            user_id: "bob".to_owned(),
            secret: "hunter2".to_owned(),
        };
        assert_eq!(
            AccessKeyRecord::from_bytes(&key.to_bytes()).expect("decode"),
            key
        );
    }
}
