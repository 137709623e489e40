//! Writer pipeline: buffer accumulation and block-aligned dispatch.
//!
//! The atomic writer accumulates arriving buffers until it holds
//! [`MAX_ACC_SIZE`] or the stream ends, then slices the accumulation into
//! optimally-sized block writes. The final block is marked last and
//! zero-padded to the unit size. Processing an empty buffer is the
//! end-of-stream signal.
//!
//! The byte container is created lazily on the first flush, so a zero-byte
//! object never allocates one. The MD5 of everything processed streams
//! alongside and becomes the object's ETag.

use bytes::{Buf, Bytes, BytesMut};

use crate::checksums::Md5Stream;
use crate::error::CoreResult;
use crate::gateway::ObjectGateway;
use crate::records::ObjectMeta;

/// Accumulation threshold: enough data to fill wide parity groups before
/// deciding block sizes (32 MiB).
pub const MAX_ACC_SIZE: usize = 32 * 1024 * 1024;

/// Result of a completed write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// The byte container written, or [`ObjectMeta::NIL`] when the stream
    /// carried zero bytes.
    pub meta: ObjectMeta,
    /// Logical bytes written (padding excluded).
    pub size: u64,
    /// Hex MD5 of the stream.
    pub etag: String,
}

/// Accumulating block writer over the object gateway.
#[derive(Debug)]
pub struct AtomicWriter {
    gateway: ObjectGateway,
    expected_size: u64,
    meta: Option<ObjectMeta>,
    acc: BytesMut,
    acc_off: u64,
    total: u64,
    hasher: Md5Stream,
}

impl AtomicWriter {
    /// Writer for a new object of roughly `expected_size` bytes. The
    /// container is created on first flush with a layout sized to the
    /// larger of `expected_size` and the data actually seen.
    #[must_use]
    pub fn for_new(gateway: ObjectGateway, expected_size: u64) -> Self {
        Self {
            gateway,
            expected_size,
            meta: None,
            acc: BytesMut::new(),
            acc_off: 0,
            total: 0,
            hasher: Md5Stream::new(),
        }
    }

    /// Writer into an existing container (multipart parts, composite
    /// uploads).
    #[must_use]
    pub fn for_existing(gateway: ObjectGateway, meta: ObjectMeta) -> Self {
        Self {
            gateway,
            expected_size: 0,
            meta: Some(meta),
            acc: BytesMut::new(),
            acc_off: 0,
            total: 0,
            hasher: Md5Stream::new(),
        }
    }

    /// Feed a buffer arriving at `offset`. An empty buffer signals
    /// end-of-stream and flushes whatever remains as the final blocks.
    pub async fn process(&mut self, data: Bytes, offset: u64) -> CoreResult<()> {
        if data.is_empty() {
            return self.flush(true).await;
        }
        if self.acc.is_empty() {
            self.acc_off = offset;
        }
        self.hasher.update(&data);
        self.acc.extend_from_slice(&data);
        if self.acc.len() >= MAX_ACC_SIZE {
            return self.flush(false).await;
        }
        Ok(())
    }

    /// Finish the stream: flush the tail and report what was written.
    pub async fn complete(mut self) -> CoreResult<WriteOutcome> {
        self.flush(true).await?;
        Ok(WriteOutcome {
            meta: self.meta.unwrap_or(ObjectMeta::NIL),
            size: self.total,
            etag: self.hasher.finish_hex(),
        })
    }

    /// Bytes written so far (flushed blocks only).
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.total
    }

    /// The container being written, once it exists.
    #[must_use]
    pub fn meta(&self) -> Option<&ObjectMeta> {
        self.meta.as_ref()
    }

    async fn flush(&mut self, last: bool) -> CoreResult<()> {
        if self.acc.is_empty() {
            return Ok(());
        }
        if self.meta.is_none() {
            let size_hint = self.expected_size.max(self.acc.len() as u64);
            self.meta = Some(self.gateway.create(size_hint).await?);
        }
        let meta = self.meta.unwrap_or(ObjectMeta::NIL);
        let layout = self.gateway.layout_of(&meta)?;

        loop {
            let left = self.acc.len();
            if left == 0 {
                break;
            }
            let mut bs = layout.optimal_block_size(left as u64, false) as usize;
            if left < bs {
                if !last {
                    break; // accumulate more data
                }
                bs = layout.optimal_block_size(left as u64, true) as usize;
            }

            let consumed = left.min(bs);
            let chunk = if consumed < bs {
                // Final short block: pad to the unit-aligned block size.
                let mut padded = BytesMut::with_capacity(bs);
                padded.extend_from_slice(&self.acc[..consumed]);
                padded.resize(bs, 0);
                padded.freeze()
            } else {
                Bytes::copy_from_slice(&self.acc[..consumed])
            };

            let is_final = last && consumed == left;
            self.gateway
                .write_block(&meta, self.acc_off, chunk, is_final)
                .await?;

            self.acc.advance(consumed);
            self.acc_off += consumed as u64;
            self.total += consumed as u64;
        }
        Ok(())
    }
}
