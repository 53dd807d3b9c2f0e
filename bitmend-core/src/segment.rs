//! Header / body / trailer segmentation
//!
//! Two marker placement policies exist and they are not interchangeable:
//!
//! - [`SegmentPolicy::Simple`]: the header stops before `FF DA`, the body
//!   starts right after it, the trailer is the `FF D9` marker. Reassembly
//!   re-inserts the SOS marker between header and body.
//! - [`SegmentPolicy::ScanHeader`]: the header also absorbs the SOS marker and
//!   the scan header it declares (2-byte big-endian length). Reassembly is a
//!   plain concatenation.
//!
//! The policy travels with the [`Segment`] and is persisted in the dataset
//! metadata so that reconstruction always uses the one that produced it.

use crate::error::{BitmendError, Result};
use crate::marker::{scan_markers, SOS};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker placement policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentPolicy {
    /// SOS marker dropped from both header and body
    #[default]
    Simple,
    /// SOS marker and scan header folded into the header
    ScanHeader,
}

impl SegmentPolicy {
    /// Bytes the reconstructor must insert between header and body
    pub fn header_body_separator(&self) -> &'static [u8] {
        match self {
            SegmentPolicy::Simple => &SOS,
            SegmentPolicy::ScanHeader => &[],
        }
    }
}

impl fmt::Display for SegmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentPolicy::Simple => write!(f, "simple"),
            SegmentPolicy::ScanHeader => write!(f, "scan-header"),
        }
    }
}

impl FromStr for SegmentPolicy {
    type Err = BitmendError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" | "a" | "A" => Ok(SegmentPolicy::Simple),
            "scan-header" | "b" | "B" => Ok(SegmentPolicy::ScanHeader),
            other => Err(BitmendError::Configuration(format!(
                "unknown segment policy: {other} (expected simple or scan-header)"
            ))),
        }
    }
}

/// The three structural pieces of one JPEG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Bytes,
    pub body: Bytes,
    pub trailer: Bytes,
    pub policy: SegmentPolicy,
}

impl Segment {
    /// Total length once reassembled
    pub fn reassembled_len(&self) -> usize {
        self.header.len()
            + self.policy.header_body_separator().len()
            + self.body.len()
            + self.trailer.len()
    }
}

/// Split a raw JPEG into header, body and trailer.
pub fn segment(data: &[u8], policy: SegmentPolicy) -> Result<Segment> {
    let pos = scan_markers(data)?;

    let (header_end, body_start) = match policy {
        SegmentPolicy::Simple => (pos.sos_start, pos.sos_end),
        SegmentPolicy::ScanHeader => {
            let len_bytes = data.get(pos.sos_end..pos.sos_end + 2).ok_or_else(|| {
                BitmendError::malformed("SOS marker is not followed by a length field")
            })?;
            let declared = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
            if declared < 2 {
                return Err(BitmendError::malformed(format!(
                    "SOS declares impossible scan header length {declared}"
                )));
            }
            let end = pos.sos_end + declared;
            (end, end)
        }
    };

    if body_start > pos.eoi_start {
        return Err(BitmendError::malformed(format!(
            "body region has negative length (starts at {}, EOI at {})",
            body_start, pos.eoi_start
        )));
    }

    Ok(Segment {
        header: Bytes::copy_from_slice(&data[..header_end]),
        body: Bytes::copy_from_slice(&data[body_start..pos.eoi_start]),
        trailer: Bytes::copy_from_slice(&data[pos.eoi_start..pos.eoi_end]),
        policy,
    })
}
