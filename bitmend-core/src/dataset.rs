//! On-disk dataset layout
//!
//! ```text
//! <root>/<image-id>/header.bin
//! <root>/<image-id>/trailer.bin
//! <root>/<image-id>/body/chunk_0000.bin
//! <root>/<image-id>/body/meta.json
//! ```
//!
//! A whole-body export keeps the body unchunked:
//!
//! ```text
//! <root>/<image-id>/header.bin
//! <root>/<image-id>/body.bin
//! <root>/<image-id>/trailer.bin
//! ```

use crate::atomic::write_atomic;
use crate::chunk::{chunk_file_name, ChunkMetadata, ChunkSet};
use crate::error::{BitmendError, Result};
use crate::segment::{Segment, SegmentPolicy};
use bytes::Bytes;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HEADER_FILE: &str = "header.bin";
pub const TRAILER_FILE: &str = "trailer.bin";
pub const BODY_DIR: &str = "body";
pub const BODY_FILE: &str = "body.bin";
pub const META_FILE: &str = "meta.json";

/// Contents of `body/meta.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyMeta {
    pub chunks: ChunkMetadata,
    pub policy: SegmentPolicy,
}

#[derive(Serialize)]
struct BodyMetaRecord<'a> {
    #[serde(flatten)]
    chunks: &'a ChunkMetadata,
    policy: SegmentPolicy,
}

impl BodyMeta {
    pub fn save(&self, body_dir: &Path) -> Result<()> {
        let record = BodyMetaRecord {
            chunks: &self.chunks,
            policy: self.policy,
        };
        let json = serde_json::to_vec_pretty(&record)?;
        write_atomic(&body_dir.join(META_FILE), &json)
    }

    /// Load and validate; a record without `policy` is taken as `simple`
    pub fn load(body_dir: &Path) -> Result<Self> {
        let content = fs::read(body_dir.join(META_FILE))?;
        let value: serde_json::Value = serde_json::from_slice(&content)?;
        let chunks: ChunkMetadata = serde_json::from_value(value.clone())?;
        chunks.validate()?;
        let policy = match value.get("policy") {
            Some(p) => serde_json::from_value(p.clone())?,
            None => SegmentPolicy::default(),
        };
        Ok(Self { chunks, policy })
    }
}

/// One image directory inside a dataset root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDir {
    pub id: String,
    pub path: PathBuf,
}

impl ImageDir {
    pub fn new(root: &Path, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            path: root.join(&id),
            id,
        }
    }

    /// Treat an existing directory as an image directory
    pub fn from_path(path: &Path) -> Result<Self> {
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BitmendError::Configuration(format!("not an image directory: {}", path.display()))
            })?
            .to_string();
        Ok(Self {
            id,
            path: path.to_path_buf(),
        })
    }

    pub fn header_path(&self) -> PathBuf {
        self.path.join(HEADER_FILE)
    }

    pub fn trailer_path(&self) -> PathBuf {
        self.path.join(TRAILER_FILE)
    }

    pub fn body_dir(&self) -> PathBuf {
        self.path.join(BODY_DIR)
    }

    /// Unchunked body of a whole-body export
    pub fn body_file_path(&self) -> PathBuf {
        self.path.join(BODY_FILE)
    }

    /// A whole-body export: `body.bin` and no chunked `body/` directory
    pub fn is_whole_body(&self) -> bool {
        !self.body_dir().is_dir() && self.body_file_path().is_file()
    }

    pub fn read_header(&self) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(self.header_path())?))
    }

    pub fn read_trailer(&self) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(self.trailer_path())?))
    }

    /// Write header, trailer and chunked body
    pub fn write(&self, header: &[u8], trailer: &[u8], chunks: &ChunkSet, policy: SegmentPolicy) -> Result<()> {
        write_atomic(&self.header_path(), header)?;
        write_atomic(&self.trailer_path(), trailer)?;
        write_chunk_set(&self.body_dir(), chunks, policy)
    }

    pub fn write_segment(&self, seg: &Segment, chunks: &ChunkSet) -> Result<()> {
        self.write(&seg.header, &seg.trailer, chunks, seg.policy)
    }

    /// Write header, unchunked body and trailer.
    ///
    /// The parts concatenate back into the file, so only the scan-header
    /// policy is accepted.
    pub fn write_whole(&self, seg: &Segment) -> Result<()> {
        if seg.policy != SegmentPolicy::ScanHeader {
            return Err(BitmendError::Configuration(format!(
                "whole-body export needs the scan-header policy, got {}",
                seg.policy
            )));
        }
        fs::create_dir_all(&self.path)?;
        write_atomic(&self.header_path(), &seg.header)?;
        write_atomic(&self.body_file_path(), &seg.body)?;
        write_atomic(&self.trailer_path(), &seg.trailer)
    }

    pub fn read_chunk_set(&self) -> Result<(ChunkSet, SegmentPolicy)> {
        read_chunk_set(&self.body_dir())
    }
}

/// Write chunks first and the metadata record last.
///
/// Chunk files left over from an earlier write with a different geometry
/// are removed before the metadata is saved.
pub fn write_chunk_set(body_dir: &Path, set: &ChunkSet, policy: SegmentPolicy) -> Result<()> {
    fs::create_dir_all(body_dir)?;
    for (index, chunk) in set.chunks.iter().enumerate() {
        write_atomic(&body_dir.join(chunk_file_name(index as u32)), chunk)?;
    }
    for (index, path) in chunk_files(body_dir)? {
        if index >= set.metadata.chunk_count {
            debug!(file = %path.display(), "removing stale chunk");
            fs::remove_file(&path)?;
        }
    }
    BodyMeta {
        chunks: set.metadata,
        policy,
    }
    .save(body_dir)
}

/// Index encoded in a `chunk_NNNN.bin` file name
fn chunk_file_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("chunk_")?.strip_suffix(".bin")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // more digits than u32 holds still names a chunk file
    Some(digits.parse().unwrap_or(u32::MAX))
}

/// `chunk_NNNN.bin` files of a body directory with their indices
fn chunk_files(body_dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(body_dir)? {
        let entry = entry?;
        if let Some(index) = entry.file_name().to_str().and_then(chunk_file_index) {
            files.push((index, entry.path()));
        }
    }
    Ok(files)
}

/// Read the chunks of `body_dir` using the given geometry.
///
/// The directory listing is checked before any chunk is read, so a record
/// declaring an absurd chunk count fails without allocating for it.
pub fn read_chunks_with(body_dir: &Path, meta: ChunkMetadata) -> Result<ChunkSet> {
    let on_disk = chunk_files(body_dir)?.len();
    if on_disk as u64 > meta.chunk_count as u64 {
        return Err(BitmendError::ChunkCountMismatch {
            expected: meta.chunk_count,
            actual: u32::try_from(on_disk).unwrap_or(u32::MAX),
        });
    }

    let mut indexed = Vec::new();
    for index in 0..meta.chunk_count {
        let path = body_dir.join(chunk_file_name(index));
        match fs::read(&path) {
            Ok(data) => indexed.push((index, Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BitmendError::MissingChunk { index });
            }
            Err(e) => return Err(e.into()),
        }
    }

    ChunkSet::from_indexed(meta, indexed)
}

/// Read a body directory together with its metadata record
pub fn read_chunk_set(body_dir: &Path) -> Result<(ChunkSet, SegmentPolicy)> {
    let meta = BodyMeta::load(body_dir)?;
    Ok((read_chunks_with(body_dir, meta.chunks)?, meta.policy))
}

/// Image directories (those containing `body/`) under a dataset root, sorted
pub fn list_image_dirs(root: &Path) -> Result<Vec<ImageDir>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() && path.join(BODY_DIR).is_dir() {
            dirs.push(ImageDir::from_path(&path)?);
        }
    }
    dirs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(dirs)
}

/// Whole-body image directories (those containing `body.bin`) under a dataset root, sorted
pub fn list_whole_body_dirs(root: &Path) -> Result<Vec<ImageDir>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            let dir = ImageDir::from_path(&path)?;
            if dir.is_whole_body() {
                dirs.push(dir);
            }
        }
    }
    dirs.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(dirs)
}

/// `*.jpg` / `*.jpeg` files directly inside `dir`, sorted by name
pub fn discover_jpegs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
        if is_jpeg && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
