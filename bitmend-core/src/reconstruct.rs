//! Reassembly of a complete JPEG from its pieces
//!
//! Inverse of segmentation plus chunk encoding. The segmentation policy
//! decides whether the SOS marker has to be re-inserted between header and
//! body.

use crate::atomic::write_atomic_parts;
use crate::chunk::{decode, ChunkSet};
use crate::error::Result;
use crate::segment::{Segment, SegmentPolicy};
use bytes::Bytes;
use std::path::Path;

/// `header ++ [SOS] ++ body ++ trailer`, per policy
pub fn reconstruct(header: &[u8], body: &[u8], trailer: &[u8], policy: SegmentPolicy) -> Bytes {
    let sep = policy.header_body_separator();
    let mut out = Vec::with_capacity(header.len() + sep.len() + body.len() + trailer.len());
    out.extend_from_slice(header);
    out.extend_from_slice(sep);
    out.extend_from_slice(body);
    out.extend_from_slice(trailer);
    Bytes::from(out)
}

/// Reassemble a segment as produced by [`crate::segment::segment`]
pub fn reconstruct_segment(seg: &Segment) -> Bytes {
    reconstruct(&seg.header, &seg.body, &seg.trailer, seg.policy)
}

/// Decode a chunk set and reassemble the file
pub fn reconstruct_from_chunks(
    header: &[u8],
    trailer: &[u8],
    chunks: &ChunkSet,
    policy: SegmentPolicy,
) -> Result<Bytes> {
    let body = decode(chunks)?;
    Ok(reconstruct(header, &body, trailer, policy))
}

/// Decode and write the file atomically.
///
/// Either the complete file appears at `out` or nothing is written.
pub fn write_reconstructed(
    out: &Path,
    header: &[u8],
    trailer: &[u8],
    chunks: &ChunkSet,
    policy: SegmentPolicy,
) -> Result<u64> {
    let body = decode(chunks)?;
    write_raw_reconstructed(out, header, &body, trailer, policy)
}

/// Write `header ++ [SOS] ++ body ++ trailer` atomically from an unchunked body
pub fn write_raw_reconstructed(
    out: &Path,
    header: &[u8],
    body: &[u8],
    trailer: &[u8],
    policy: SegmentPolicy,
) -> Result<u64> {
    let sep = policy.header_body_separator();
    write_atomic_parts(out, &[header, sep, body, trailer])?;
    Ok((header.len() + sep.len() + body.len() + trailer.len()) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::encode;
    use crate::error::BitmendError;
    use crate::segment::segment;
    use tempfile::TempDir;

    fn sample_jpeg() -> Vec<u8> {
        let mut v = vec![0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x03, 0x7F];
        v.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x03, 0x01]);
        v.extend((0..9000u32).map(|i| (i % 200) as u8));
        v.extend_from_slice(&[0xFF, 0xD9]);
        v
    }

    #[test]
    fn test_roundtrip_both_policies() {
        let data = sample_jpeg();
        for policy in [SegmentPolicy::Simple, SegmentPolicy::ScanHeader] {
            let seg = segment(&data, policy).unwrap();
            assert_eq!(reconstruct_segment(&seg).as_ref(), data.as_slice());

            let set = encode(&seg.body, 4096).unwrap();
            let rebuilt = reconstruct_from_chunks(&seg.header, &seg.trailer, &set, policy).unwrap();
            assert_eq!(rebuilt.as_ref(), data.as_slice());
        }
    }

    #[test]
    fn test_mixed_policies_do_not_roundtrip() {
        let data = sample_jpeg();
        let seg = segment(&data, SegmentPolicy::ScanHeader).unwrap();
        let wrong = reconstruct(&seg.header, &seg.body, &seg.trailer, SegmentPolicy::Simple);
        assert_ne!(wrong.as_ref(), data.as_slice());
    }

    #[test]
    fn test_write_reconstructed() {
        let dir = TempDir::new().unwrap();
        let data = sample_jpeg();
        let seg = segment(&data, SegmentPolicy::Simple).unwrap();
        let set = encode(&seg.body, 1024).unwrap();

        let out = dir.path().join("out/rebuilt.jpg");
        let written =
            write_reconstructed(&out, &seg.header, &seg.trailer, &set, seg.policy).unwrap();
        assert_eq!(written, data.len() as u64);
        assert_eq!(std::fs::read(&out).unwrap(), data);
    }

    #[test]
    fn test_failed_decode_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let seg = segment(&sample_jpeg(), SegmentPolicy::Simple).unwrap();
        let mut set = encode(&seg.body, 1024).unwrap();
        set.chunks.truncate(2);

        let out = dir.path().join("rebuilt.jpg");
        let err = write_reconstructed(&out, &seg.header, &seg.trailer, &set, seg.policy)
            .unwrap_err();
        assert!(matches!(err, BitmendError::ChunkCountMismatch { .. }));
        assert!(!out.exists());
    }
}
