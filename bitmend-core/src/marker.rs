//! JPEG marker scanning
//!
//! Locates the first Start-Of-Scan marker and the last End-Of-Image marker
//! in a raw byte buffer. The entropy-coded stream is not parsed: the
//! rightmost `FF D9` pair is taken as the terminal EOI. That is a heuristic,
//! and a file carrying an EOI-like pair in trailing garbage will be cut there.

use crate::error::{BitmendError, Result};

/// Start-Of-Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// End-Of-Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Byte offsets of the structural markers in one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPositions {
    /// Offset of the first `FF DA` byte
    pub sos_start: usize,
    /// `sos_start + 2`
    pub sos_end: usize,
    /// Offset of the last `FF D9` byte pair
    pub eoi_start: usize,
    /// `eoi_start + 2`
    pub eoi_end: usize,
}

/// Find the first SOS and the rightmost EOI.
pub fn scan_markers(data: &[u8]) -> Result<MarkerPositions> {
    let sos_start = find_first(data, &SOS)
        .ok_or_else(|| BitmendError::malformed("missing SOS marker (FF DA)"))?;
    let eoi_start = find_last(data, &EOI)
        .ok_or_else(|| BitmendError::malformed("missing EOI marker (FF D9)"))?;

    Ok(MarkerPositions {
        sos_start,
        sos_end: sos_start + SOS.len(),
        eoi_start,
        eoi_end: eoi_start + EOI.len(),
    })
}

fn find_first(data: &[u8], marker: &[u8; 2]) -> Option<usize> {
    data.windows(2).position(|w| w == marker)
}

fn find_last(data: &[u8], marker: &[u8; 2]) -> Option<usize> {
    data.windows(2).rposition(|w| w == marker)
}
