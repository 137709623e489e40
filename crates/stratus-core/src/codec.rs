//! Schema-versioned binary record framing.
//!
//! Every persisted record is wrapped as
//! `<struct-version u8, compat-version u8, body-length u32, body...>`.
//! A decoder accepts records whose compat version is at or below its own
//! reader version and rejects anything newer; the explicit body length
//! lets old readers skip fields appended by newer writers.
//!
//! Field helpers keep the byte layout in one place: big-endian integers,
//! `u16`-prefixed UTF-8 strings, `u32`-prefixed byte blobs, and
//! count-prefixed string→bytes maps for attribute sets.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, CoreResult};

/// Write a versioned record body produced by `f` into `buf`.
pub fn encode_versioned(
    buf: &mut BytesMut,
    struct_ver: u8,
    compat_ver: u8,
    f: impl FnOnce(&mut BytesMut),
) {
    buf.put_u8(struct_ver);
    buf.put_u8(compat_ver);
    let len_at = buf.len();
    buf.put_u32(0);
    let body_start = buf.len();
    f(buf);
    let body_len = (buf.len() - body_start) as u32;
    buf[len_at..len_at + 4].copy_from_slice(&body_len.to_be_bytes());
}

/// Decode a versioned record: checks the compat version against
/// `reader_ver`, hands `f` exactly the record body, and advances the outer
/// cursor past it regardless of how much `f` consumed.
///
/// # Errors
///
/// [`CoreError::Decode`] on truncated buffers or a compat version newer
/// than `reader_ver`.
pub fn decode_versioned<T>(
    cur: &mut &[u8],
    reader_ver: u8,
    f: impl FnOnce(&mut &[u8]) -> CoreResult<T>,
) -> CoreResult<T> {
    need(cur, 6)?;
    let _struct_ver = cur.get_u8();
    let compat_ver = cur.get_u8();
    let len = cur.get_u32() as usize;
    if compat_ver > reader_ver {
        return Err(CoreError::decode(format!(
            "record compat version {compat_ver} newer than reader {reader_ver}"
        )));
    }
    need(cur, len)?;
    let mut body = &cur[..len];
    cur.advance(len);
    f(&mut body)
}

/// Fail with a decode error unless `cur` has at least `n` bytes left.
fn need(cur: &[u8], n: usize) -> CoreResult<()> {
    if cur.remaining() < n {
        return Err(CoreError::decode(format!(
            "buffer truncated: need {n}, have {}",
            cur.remaining()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Write a `u16`-length-prefixed UTF-8 string.
pub fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

/// Read a string written by [`put_str`].
pub fn get_str(cur: &mut &[u8]) -> CoreResult<String> {
    need(cur, 2)?;
    let len = cur.get_u16() as usize;
    need(cur, len)?;
    let out = std::str::from_utf8(&cur[..len])
        .map_err(|_| CoreError::decode("string field is not UTF-8"))?
        .to_owned();
    cur.advance(len);
    Ok(out)
}

/// Write a `u32`-length-prefixed byte blob.
pub fn put_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u32(b.len() as u32);
    buf.put_slice(b);
}

/// Read a blob written by [`put_bytes`].
pub fn get_bytes(cur: &mut &[u8]) -> CoreResult<Bytes> {
    need(cur, 4)?;
    let len = cur.get_u32() as usize;
    need(cur, len)?;
    let out = Bytes::copy_from_slice(&cur[..len]);
    cur.advance(len);
    Ok(out)
}

/// Write a boolean as one byte.
pub fn put_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(u8::from(v));
}

/// Read a boolean.
pub fn get_bool(cur: &mut &[u8]) -> CoreResult<bool> {
    need(cur, 1)?;
    Ok(cur.get_u8() != 0)
}

/// Read a `u8`.
pub fn get_u8(cur: &mut &[u8]) -> CoreResult<u8> {
    need(cur, 1)?;
    Ok(cur.get_u8())
}

/// Read a big-endian `u32`.
pub fn get_u32(cur: &mut &[u8]) -> CoreResult<u32> {
    need(cur, 4)?;
    Ok(cur.get_u32())
}

/// Read a big-endian `u64`.
pub fn get_u64(cur: &mut &[u8]) -> CoreResult<u64> {
    need(cur, 8)?;
    Ok(cur.get_u64())
}

/// Read a big-endian `i64`.
pub fn get_i64(cur: &mut &[u8]) -> CoreResult<i64> {
    need(cur, 8)?;
    Ok(cur.get_i64())
}

/// Write a string→bytes attribute map, count-prefixed.
pub fn put_attrs(buf: &mut BytesMut, attrs: &BTreeMap<String, Bytes>) {
    buf.put_u32(attrs.len() as u32);
    for (name, value) in attrs {
        put_str(buf, name);
        put_bytes(buf, value);
    }
}

/// Read an attribute map written by [`put_attrs`].
pub fn get_attrs(cur: &mut &[u8]) -> CoreResult<BTreeMap<String, Bytes>> {
    let count = get_u32(cur)?;
    let mut out = BTreeMap::new();
    for _ in 0..count {
        let name = get_str(cur)?;
        let value = get_bytes(cur)?;
        out.insert(name, value);
    }
    Ok(out)
}
