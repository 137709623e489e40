//! Garbage-collector enqueue interface.
//!
//! Delete paths prefer handing byte containers to the collector over
//! destroying them inline; only when the enqueue fails does the caller
//! fall back to a synchronous delete. The collector's scheduling loop is a
//! separate worker; this module covers the queue records and the enqueue
//! side it shares with the delete paths.
//!
//! Queue records spread round-robin across a fixed set of queue indices so
//! collector workers can lock and drain queues independently.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytes::{BufMut, BytesMut};
use chrono::Utc;
use tracing::debug;

use crate::codec::{decode_versioned, encode_versioned, get_bool, get_i64, get_str, get_u64, put_bool, put_str};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexGateway;
use crate::records::ObjectMeta;

/// Key prefix of queue records addressed by tag.
const TAG_PREFIX: &str = "0_";

/// One enqueued deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct GcItem {
    /// Unique identifier of the queued work (the object ID string, or the
    /// upload ID for multipart objects).
    pub tag: String,
    /// Fully qualified object name, for operators reading the queue.
    pub name: String,
    /// The byte container to destroy.
    pub meta: ObjectMeta,
    /// When the deletion was requested, milliseconds since the epoch.
    pub deletion_time_ms: i64,
    /// Logical size of the object.
    pub size: u64,
    /// The parts index holding per-part records, for multipart objects.
    pub part_index: Option<String>,
}

impl GcItem {
    const RECORD_VER: u8 = 1;

    /// Whether this item tears down a multipart object.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.part_index.is_some()
    }

    /// Encode to a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> bytes::Bytes {
        let mut buf = BytesMut::new();
        encode_versioned(&mut buf, Self::RECORD_VER, Self::RECORD_VER, |b| {
            put_str(b, &self.tag);
            put_str(b, &self.name);
            b.put_i64(self.deletion_time_ms);
            b.put_u64(self.size);
            match &self.part_index {
                Some(index) => {
                    put_bool(b, true);
                    put_str(b, index);
                }
                None => put_bool(b, false),
            }
        });
        self.meta.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a buffer written by [`GcItem::to_bytes`].
    ///
    /// # Errors
    ///
    /// [`CoreError::Decode`] on malformed buffers.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cur = bytes;
        let (tag, name, deletion_time_ms, size, part_index) =
            decode_versioned(&mut cur, Self::RECORD_VER, |b| {
                let tag = get_str(b)?;
                let name = get_str(b)?;
                let deletion_time_ms = get_i64(b)?;
                let size = get_u64(b)?;
                let part_index = if get_bool(b)? { Some(get_str(b)?) } else { None };
                Ok((tag, name, deletion_time_ms, size, part_index))
            })?;
        let meta = ObjectMeta::decode(&mut cur)?;
        Ok(Self {
            tag,
            name,
            meta,
            deletion_time_ms,
            size,
            part_index,
        })
    }
}

/// The queue-index name for slot `n`.
#[must_use]
pub fn queue_index_name(n: u32) -> String {
    format!("stratus.gc.queue.{n}")
}

/// Round-robin enqueue front of the garbage collector.
#[derive(Debug)]
pub struct GcQueue {
    index: IndexGateway,
    queues: u32,
    cursor: AtomicU32,
    enabled: AtomicBool,
}

impl GcQueue {
    /// Build the enqueue front over `queues` queue indices. A disabled
    /// queue refuses enqueues, pushing delete paths to their synchronous
    /// fallback.
    #[must_use]
    pub fn new(index: IndexGateway, queues: u32, enabled: bool) -> Self {
        Self {
            index,
            queues: queues.max(1),
            cursor: AtomicU32::new(0),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Whether deletes should route through the collector.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Create the queue indices (bootstrap).
    pub async fn create_queues(&self) -> CoreResult<()> {
        for n in 0..self.queues {
            match self.index.create(&queue_index_name(n)).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Enqueue one deletion, rotating across the queue indices.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidArgument`] when the collector is disabled;
    /// index failures propagate (and push the caller to synchronous
    /// deletion).
    pub async fn enqueue(&self, item: &GcItem) -> CoreResult<()> {
        if !self.is_enabled() {
            return Err(CoreError::invalid("garbage collector is disabled"));
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.queues;
        let key = format!("{TAG_PREFIX}{}", item.tag);
        self.index
            .put(&queue_index_name(slot), key.as_bytes(), item.to_bytes(), true)
            .await?;
        debug!(tag = %item.tag, name = %item.name, slot, "enqueued to gc");
        Ok(())
    }

    /// Stop accepting work (store shutdown).
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Snapshot every queued item, across all queues (tests, operators).
    pub async fn list(&self) -> CoreResult<Vec<GcItem>> {
        let mut out = Vec::new();
        for n in 0..self.queues {
            let entries = match self
                .index
                .next(&queue_index_name(n), b"", usize::MAX, b"", b"")
                .await
            {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for (_, val) in entries {
                out.push(GcItem::from_bytes(&val)?);
            }
        }
        Ok(out)
    }
}

/// A timestamp for queue records.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
