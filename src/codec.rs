//! Fixed-layout little-endian encoding with a SHA-256 trailer.
//!
//! Persisted blobs are a payload followed by the SHA-256 digest of that
//! payload. [`seal`] appends the digest, [`unseal`] checks it and hands the
//! payload back. The field-level helpers keep every integer and float in
//! explicit little-endian form so blobs move between hosts unchanged.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of the SHA-256 trailer.
pub const DIGEST_LEN: usize = 32;

/// Integrity failures shared by every sealed blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SealError {
    #[error("blob truncated: {len} bytes, need at least {min}")]
    Truncated { len: usize, min: usize },
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// SHA-256 of a payload.
pub fn checksum(payload: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// Append the payload checksum.
pub fn seal(mut payload: Vec<u8>) -> Vec<u8> {
    let digest = checksum(&payload);
    payload.extend_from_slice(&digest);
    payload
}

/// Verify the trailer and return the payload it covers.
pub fn unseal(blob: &[u8], payload_len: usize) -> Result<&[u8], SealError> {
    let min = payload_len + DIGEST_LEN;
    if blob.len() < min {
        return Err(SealError::Truncated {
            len: blob.len(),
            min,
        });
    }
    let (payload, digest) = blob[..min].split_at(payload_len);
    if checksum(payload).as_slice() != digest {
        return Err(SealError::ChecksumMismatch);
    }
    Ok(payload)
}

/// Appends fields to a payload.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields back from a payload whose length was already checked.
///
/// Every accessor returns `None` once the payload is exhausted.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.buf.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    pub fn i64(&mut self) -> Option<i64> {
        self.take().map(i64::from_le_bytes)
    }

    pub fn f64(&mut self) -> Option<f64> {
        self.take().map(f64::from_le_bytes)
    }

    /// Any non-zero byte reads as `true`.
    pub fn bool(&mut self) -> Option<bool> {
        self.u8().map(|b| b != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_little_endian() {
        let mut w = Writer::default();
        w.u16(0x0102).i64(-2).bool(true);
        let bytes = w.into_inner();
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert_eq!(&bytes[2..10], &[0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(bytes[10], 1);

        let mut r = Reader::new(&bytes);
        assert_eq!(r.u16(), Some(0x0102));
        assert_eq!(r.i64(), Some(-2));
        assert_eq!(r.bool(), Some(true));
        assert_eq!(r.u8(), None);
    }

    #[test]
    fn sealed_blob_detects_any_flipped_byte() {
        let blob = seal(vec![1, 2, 3, 4]);
        assert_eq!(unseal(&blob, 4), Ok(&[1u8, 2, 3, 4][..]));

        for i in 0..blob.len() {
            let mut bad = blob.clone();
            bad[i] ^= 0x40;
            assert_eq!(unseal(&bad, 4), Err(SealError::ChecksumMismatch));
        }
    }

    #[test]
    fn short_blob_is_truncated() {
        let blob = seal(vec![9; 8]);
        assert!(matches!(
            unseal(&blob[..20], 8),
            Err(SealError::Truncated { len: 20, min: 40 })
        ));
    }
}
