//! ETag computation.
//!
//! Object ETags are hex MD5 digests; multipart objects get the
//! MD5-of-binary-MD5s form with a `-<part count>` suffix. The streaming
//! hasher feeds the writer pipeline so ETags never require buffering a
//! whole object.

use digest::Digest;

/// Hex MD5 digest of `data`.
///
/// # Examples
///
/// ```
/// use stratus_core::checksums::compute_md5;
///
/// assert_eq!(compute_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
#[must_use]
pub fn compute_md5(data: &[u8]) -> String {
    hex::encode(md5::Md5::digest(data))
}

/// The multipart composite ETag: each part's hex ETag is decoded back to
/// its 16 binary digest bytes, the concatenation is MD5'd, and the part
/// count is appended after a dash.
#[must_use]
pub fn compute_multipart_etag(part_etags: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for part in part_etags {
        if let Ok(bytes) = hex::decode(part.as_ref()) {
            combined.extend_from_slice(&bytes);
        }
    }
    let digest = hex::encode(md5::Md5::digest(&combined));
    format!("{digest}-{}", part_etags.len())
}

/// Incremental MD5 over a stream of chunks.
#[derive(Debug, Default)]
pub struct Md5Stream {
    inner: md5::Md5,
}

impl Md5Stream {
    /// Create a fresh hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more data.
    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.inner, data);
    }

    /// Finalize into the hex digest, consuming the hasher.
    #[must_use]
    pub fn finish_hex(self) -> String {
        hex::encode(Digest::finalize(self.inner))
    }
}
