//! Chunk types and metadata
//!
//! Chunks are the unit of corruption and repair. A body is cut into
//! fixed-size chunks in offset order; the last one is zero-padded up to the
//! chunk size and the padding is stripped again on decode using
//! [`ChunkMetadata::last_chunk_length`].

use crate::error::{BitmendError, Result};
use bytes::Bytes;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CHUNK_ID_SEPARATOR: &str = "_chunk_";

/// Stable chunk identifier
///
/// Format: `<image-id>_chunk_<index>` with the index zero-padded to 4 digits.
/// Example: `image_0001_chunk_0003`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub image: String,
    pub index: u32,
}

impl ChunkId {
    pub fn new(image: impl Into<String>, index: u32) -> Self {
        Self {
            image: image.into(),
            index,
        }
    }

    /// File name of this chunk inside a `body/` directory
    pub fn file_name(&self) -> String {
        chunk_file_name(self.index)
    }
}

/// `chunk_0000.bin` style file name for a chunk index
pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{:04}.bin", index)
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:04}", self.image, CHUNK_ID_SEPARATOR, self.index)
    }
}

impl FromStr for ChunkId {
    type Err = BitmendError;

    fn from_str(s: &str) -> Result<Self> {
        let (image, index) = s.rsplit_once(CHUNK_ID_SEPARATOR).ok_or_else(|| {
            BitmendError::Configuration(format!("invalid chunk id: {s}"))
        })?;
        let index = index
            .parse::<u32>()
            .map_err(|e| BitmendError::Configuration(format!("invalid chunk id {s}: {e}")))?;
        if image.is_empty() {
            return Err(BitmendError::Configuration(format!(
                "invalid chunk id {s}: empty image id"
            )));
        }
        Ok(Self::new(image, index))
    }
}

/// Chunk geometry of one body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Length of the unpadded body in bytes
    #[serde(alias = "bod_len")]
    pub body_length: u64,

    /// Size of every stored chunk
    #[serde(alias = "size")]
    pub chunk_size: u32,

    /// `ceil(body_length / chunk_size)`
    #[serde(alias = "nr_chunks", alias = "num_chunks")]
    pub chunk_count: u32,

    /// Real payload bytes in the last chunk (`chunk_size` when it is full)
    #[serde(alias = "chunk_len", alias = "last_chunk_len")]
    pub last_chunk_length: u32,
}

impl ChunkMetadata {
    /// Compute the geometry for a body of `body_length` bytes
    pub fn for_body(body_length: u64, chunk_size: u32) -> Result<Self> {
        if chunk_size == 0 {
            return Err(BitmendError::InvalidChunkSize(chunk_size));
        }
        let size = chunk_size as u64;
        let chunk_count = u32::try_from(body_length.div_ceil(size)).map_err(|_| {
            BitmendError::Configuration(format!(
                "body of {body_length} bytes needs more than u32::MAX chunks of {chunk_size}"
            ))
        })?;
        let remainder = (body_length % size) as u32;
        let last_chunk_length = if remainder == 0 { chunk_size } else { remainder };

        Ok(Self {
            body_length,
            chunk_size,
            chunk_count,
            last_chunk_length,
        })
    }

    /// Body length implied by the chunk geometry
    pub fn decoded_length(&self) -> u64 {
        if self.chunk_count == 0 {
            return 0;
        }
        (self.chunk_count as u64 - 1) * self.chunk_size as u64 + self.last_chunk_length as u64
    }

    /// Check that the record is self-consistent
    pub fn validate(&self) -> Result<()> {
        let expected = Self::for_body(self.body_length, self.chunk_size)?;
        if expected.chunk_count != self.chunk_count {
            return Err(BitmendError::ChunkCountMismatch {
                expected: expected.chunk_count,
                actual: self.chunk_count,
            });
        }
        if expected.last_chunk_length != self.last_chunk_length {
            return Err(BitmendError::ChunkLengthMismatch {
                index: self.chunk_count.saturating_sub(1),
                expected: expected.last_chunk_length as usize,
                actual: self.last_chunk_length as usize,
            });
        }
        Ok(())
    }

    fn expected_payload(&self, index: u32) -> usize {
        if index + 1 == self.chunk_count {
            self.last_chunk_length as usize
        } else {
            self.chunk_size as usize
        }
    }
}

/// Ordered, padded chunks of one body plus their geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSet {
    pub metadata: ChunkMetadata,
    pub chunks: Vec<Bytes>,
}

impl ChunkSet {
    /// Number of chunks held
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Same geometry, different chunk contents (e.g. corrupted or repaired)
    pub fn with_chunks(&self, chunks: Vec<Bytes>) -> Self {
        Self {
            metadata: self.metadata,
            chunks,
        }
    }

    /// Assemble a chunk set from `(index, data)` pairs in any order.
    ///
    /// Chunks are placed by index, never by arrival order. Storage grows with
    /// the chunks supplied, not with the declared `chunk_count`.
    pub fn from_indexed(
        metadata: ChunkMetadata,
        indexed: impl IntoIterator<Item = (u32, Bytes)>,
    ) -> Result<Self> {
        let count = metadata.chunk_count;
        let mut items: Vec<(u32, Bytes)> = Vec::new();
        for (index, data) in indexed {
            if index >= count {
                return Err(BitmendError::ChunkCountMismatch {
                    expected: count,
                    actual: index + 1,
                });
            }
            items.push((index, data));
        }
        if items.len() as u64 > count as u64 {
            return Err(BitmendError::ChunkCountMismatch {
                expected: count,
                actual: items.len() as u32,
            });
        }

        items.sort_by_key(|(index, _)| *index);
        let mut chunks = Vec::with_capacity(items.len());
        for (expected, (index, data)) in items.into_iter().enumerate() {
            if index != expected as u32 {
                return Err(BitmendError::MissingChunk {
                    index: expected as u32,
                });
            }
            chunks.push(data);
        }
        if chunks.len() as u32 != count {
            return Err(BitmendError::MissingChunk {
                index: chunks.len() as u32,
            });
        }

        Ok(Self { metadata, chunks })
    }
}

fn pad_chunk(data: &[u8], chunk_size: usize) -> Bytes {
    let mut chunk = Vec::with_capacity(chunk_size);
    chunk.extend_from_slice(data);
    chunk.resize(chunk_size, 0);
    Bytes::from(chunk)
}

/// Split a body into fixed-size zero-padded chunks
pub fn encode(body: &[u8], chunk_size: u32) -> Result<ChunkSet> {
    let metadata = ChunkMetadata::for_body(body.len() as u64, chunk_size)?;
    let chunks = body
        .chunks(chunk_size as usize)
        .map(|c| pad_chunk(c, chunk_size as usize))
        .collect();
    Ok(ChunkSet { metadata, chunks })
}

/// Split a body into chunks using parallel processing
///
/// Produces the same chunk set as [`encode`]; worthwhile for large bodies.
pub fn encode_parallel(body: &[u8], chunk_size: u32) -> Result<ChunkSet> {
    let metadata = ChunkMetadata::for_body(body.len() as u64, chunk_size)?;
    let chunks = body
        .par_chunks(chunk_size as usize)
        .map(|c| pad_chunk(c, chunk_size as usize))
        .collect();
    Ok(ChunkSet { metadata, chunks })
}

/// Reassemble chunks into the original body, stripping the padding
pub fn decode(set: &ChunkSet) -> Result<Bytes> {
    let meta = &set.metadata;
    if meta.chunk_size == 0 {
        return Err(BitmendError::InvalidChunkSize(meta.chunk_size));
    }

    let actual = u32::try_from(set.chunks.len()).unwrap_or(u32::MAX);
    if actual != meta.chunk_count {
        return Err(BitmendError::ChunkCountMismatch {
            expected: meta.chunk_count,
            actual,
        });
    }

    // Every stored chunk must at least cover its payload and never exceed
    // the chunk size, otherwise later chunks would be shifted.
    for (index, chunk) in set.chunks.iter().enumerate() {
        let index = index as u32;
        let payload = meta.expected_payload(index);
        let is_last = index + 1 == meta.chunk_count;
        let ok = if is_last {
            chunk.len() >= payload && chunk.len() <= meta.chunk_size as usize
        } else {
            chunk.len() == meta.chunk_size as usize
        };
        if !ok {
            return Err(BitmendError::ChunkLengthMismatch {
                index,
                expected: if is_last {
                    meta.chunk_size as usize
                } else {
                    payload
                },
                actual: chunk.len(),
            });
        }
    }

    let total = meta.decoded_length() as usize;
    let mut result = Vec::with_capacity(set.chunks.iter().map(|c| c.len()).sum());
    for chunk in &set.chunks {
        result.extend_from_slice(chunk);
    }
    result.truncate(total);

    Ok(Bytes::from(result))
}
