//! Bitmend Core Library
//!
//! Building blocks for bit-level corruption and repair datasets of JPEG
//! images. This crate provides:
//! - JPEG segmentation into header / entropy-coded body / trailer
//! - A fixed-size chunk codec with zero padding and length metadata
//! - Weighted, seeded corruption with a pluggable bit-flip collaborator
//! - Bit-level recovery statistics
//! - Reconstruction of complete files from (repaired) chunks
//! - Corpus-level batch pipelines on the rayon pool

pub mod atomic;
pub mod chunk;
pub mod corruption;
pub mod dataset;
pub mod error;
pub mod flipper;
pub mod marker;
pub mod pipeline;
pub mod reconstruct;
pub mod recovery;
pub mod segment;

pub use chunk::{decode, encode, encode_parallel, ChunkId, ChunkMetadata, ChunkSet};
pub use corruption::{
    CorruptionConfig, CorruptionEngine, CorruptionLog, CorruptionRecord, Granularity, SeverityLevel,
};
pub use dataset::{BodyMeta, ImageDir};
pub use error::{BitmendError, Result};
pub use flipper::{BitFlipper, ExternalFlipper, InProcessFlipper};
pub use pipeline::{
    AnalysisReport, BatchFailure, BatchReport, BodyLayout, ImageNaming, OutputLayout, SegmentOptions,
};
pub use reconstruct::{reconstruct, reconstruct_from_chunks, write_raw_reconstructed, write_reconstructed};
pub use recovery::{bit_diff_stats, recovery_stats, BitDiffStats, RecoveryStatistics};
pub use segment::{segment, Segment, SegmentPolicy};

/// Default chunk size in bytes.
///
/// Override at runtime via the BITMEND_CHUNK_SIZE env var or the
/// `[chunking]` section of the config file.
pub const DEFAULT_CHUNK_SIZE: u32 = 4096;
