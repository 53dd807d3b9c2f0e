//! Corpus-level batch operations
//!
//! Every batch runs its items on the rayon pool and isolates failures: one
//! malformed image or one failing collaborator call is recorded in the
//! [`BatchReport`] and the rest of the batch carries on.

use crate::atomic::write_atomic;
use crate::chunk::{encode, ChunkId, ChunkSet};
use crate::corruption::{CorruptionEngine, CorruptionLog, CorruptionRecord};
use crate::dataset::{self, BodyMeta, ImageDir, META_FILE};
use crate::error::{BitmendError, Result};
use crate::flipper::BitFlipper;
use crate::reconstruct::{write_raw_reconstructed, write_reconstructed};
use crate::recovery::{bit_diff_stats, recovery_stats, BitDiffStats, RecoveryStatistics};
use crate::segment::{segment, Segment, SegmentPolicy};
use bytes::Bytes;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One failed item of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: Vec<String>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&mut self, id: impl Into<String>) {
        self.processed.push(id.into());
    }

    pub fn failed(&mut self, id: impl Into<String>, error: &BitmendError) {
        let id = id.into();
        warn!(item = %id, error = %error, "batch item failed");
        self.failures.push(BatchFailure {
            id,
            error: error.to_string(),
        });
    }

    /// Collect per-item results, sorted by id
    pub fn from_results(results: impl IntoIterator<Item = (String, Result<()>)>) -> Self {
        let mut report = Self::new();
        for (id, result) in results {
            match result {
                Ok(()) => report.succeeded(id),
                Err(e) => report.failed(id, &e),
            }
        }
        report.sort();
        report
    }

    pub fn sort(&mut self) {
        self.processed.sort();
        self.failures.sort_by(|a, b| a.id.cmp(&b.id));
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.processed.len() + self.failures.len()
    }
}

/// How image ids are derived from input file names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageNaming {
    /// `image_0001`, `image_0002`, ... in sorted file order
    #[default]
    Sequential,
    /// File stem of the input
    Stem,
}

/// How the body of a segmented image is stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyLayout {
    /// `body/chunk_NNNN.bin` plus `body/meta.json`
    #[default]
    Chunked,
    /// A single `body.bin`; requires the scan-header policy
    WholeBody,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    pub chunk_size: u32,
    pub policy: SegmentPolicy,
    pub naming: ImageNaming,
    pub layout: BodyLayout,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            policy: SegmentPolicy::default(),
            naming: ImageNaming::default(),
            layout: BodyLayout::default(),
        }
    }
}

/// Segment and chunk one file
pub fn segment_file(path: &Path, opts: &SegmentOptions) -> Result<(Segment, ChunkSet)> {
    let data = fs::read(path)?;
    let seg = segment(&data, opts.policy)?;
    let chunks = encode(&seg.body, opts.chunk_size)?;
    Ok((seg, chunks))
}

fn image_ids(files: &[PathBuf], naming: ImageNaming) -> Vec<Result<String>> {
    let mut seen = HashSet::new();
    files
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let id = match naming {
                ImageNaming::Sequential => format!("image_{:04}", i + 1),
                ImageNaming::Stem => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        BitmendError::Configuration(format!(
                            "cannot derive image id from {}",
                            path.display()
                        ))
                    })?,
            };
            if !seen.insert(id.clone()) {
                return Err(BitmendError::Configuration(format!(
                    "duplicate image id {id} for {}",
                    path.display()
                )));
            }
            Ok(id)
        })
        .collect()
}

/// Segment every JPEG in `input_dir` into a dataset under `output_dir`
pub fn segment_corpus<P>(
    input_dir: &Path,
    output_dir: &Path,
    opts: &SegmentOptions,
    progress: P,
) -> Result<BatchReport>
where
    P: Fn(&str) + Sync,
{
    if opts.chunk_size == 0 {
        return Err(BitmendError::InvalidChunkSize(opts.chunk_size));
    }
    if opts.layout == BodyLayout::WholeBody && opts.policy != SegmentPolicy::ScanHeader {
        return Err(BitmendError::Configuration(format!(
            "whole-body export needs the scan-header policy, got {}",
            opts.policy
        )));
    }
    let files = dataset::discover_jpegs(input_dir)?;
    fs::create_dir_all(output_dir)?;
    info!(
        images = files.len(),
        input = %input_dir.display(),
        chunk_size = opts.chunk_size,
        policy = %opts.policy,
        layout = ?opts.layout,
        "segmenting corpus"
    );

    let ids = image_ids(&files, opts.naming);
    let results: Vec<(String, Result<()>)> = files
        .par_iter()
        .zip(ids.into_par_iter())
        .map(|(path, id)| {
            let label = path.display().to_string();
            let result = id.and_then(|id| {
                let image = ImageDir::new(output_dir, &id);
                match opts.layout {
                    BodyLayout::Chunked => {
                        let (seg, chunks) = segment_file(path, opts)?;
                        image.write_segment(&seg, &chunks)?;
                        debug!(image = %id, source = %label, chunks = chunks.len(), "segmented");
                    }
                    BodyLayout::WholeBody => {
                        let seg = segment(&fs::read(path)?, opts.policy)?;
                        image.write_whole(&seg)?;
                        debug!(image = %id, source = %label, body = seg.body.len(), "segmented");
                    }
                }
                Ok(())
            });
            progress(&label);
            (label, result)
        })
        .collect();

    let report = BatchReport::from_results(results);
    info!(
        ok = report.processed.len(),
        failed = report.failures.len(),
        "segmentation finished"
    );
    Ok(report)
}

/// Output layout of a corrupted dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// Same tree as the input with corrupted chunk files
    #[default]
    Mirror,
    /// Flat `<chunk-id>.input` (corrupted) / `<chunk-id>.output` (clean) pairs
    Pairs,
}

impl std::str::FromStr for OutputLayout {
    type Err = BitmendError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mirror" => Ok(Self::Mirror),
            "pairs" => Ok(Self::Pairs),
            other => Err(BitmendError::Configuration(format!(
                "unknown output layout: {other} (expected mirror or pairs)"
            ))),
        }
    }
}

/// Result of [`corrupt_corpus`]
#[derive(Debug, Clone, Default)]
pub struct CorruptOutcome {
    /// Per-chunk (and per-image for load or write errors) results
    pub report: BatchReport,
    /// Every decision made, including those whose flip failed
    pub log: CorruptionLog,
}

struct LoadedImage {
    dir: ImageDir,
    header: Bytes,
    trailer: Bytes,
    chunks: ChunkSet,
    policy: SegmentPolicy,
}

impl LoadedImage {
    fn load(dir: &ImageDir) -> Result<Self> {
        let (chunks, policy) = dir.read_chunk_set()?;
        Ok(Self {
            dir: dir.clone(),
            header: dir.read_header()?,
            trailer: dir.read_trailer()?,
            chunks,
            policy,
        })
    }
}

struct ChunkOutcome {
    image: usize,
    id: ChunkId,
    record: CorruptionRecord,
    result: Result<Bytes>,
}

fn write_pair(output_root: &Path, id: &ChunkId, corrupted: &[u8], clean: &[u8]) -> Result<()> {
    write_atomic(&output_root.join(format!("{id}.input")), corrupted)?;
    write_atomic(&output_root.join(format!("{id}.output")), clean)
}

/// Corrupt every chunk of the dataset at `input_root`.
///
/// Chunks are processed in parallel; the log is assembled afterwards and
/// holds a decision for every chunk that was attempted.
pub fn corrupt_corpus<F, P>(
    engine: &CorruptionEngine<F>,
    input_root: &Path,
    output_root: &Path,
    layout: OutputLayout,
    progress: P,
) -> Result<CorruptOutcome>
where
    F: BitFlipper,
    P: Fn(&str) + Sync,
{
    let dirs = dataset::list_image_dirs(input_root)?;
    fs::create_dir_all(output_root)?;
    info!(
        images = dirs.len(),
        seed = engine.seed(),
        layout = ?layout,
        "corrupting dataset"
    );

    let mut report = BatchReport::new();
    let mut images = Vec::with_capacity(dirs.len());
    for (dir, loaded) in dirs
        .par_iter()
        .map(|dir| (dir, LoadedImage::load(dir)))
        .collect::<Vec<_>>()
    {
        match loaded {
            Ok(image) => images.push(image),
            Err(e) => report.failed(dir.id.clone(), &e),
        }
    }

    let tasks: Vec<(usize, u32)> = images
        .iter()
        .enumerate()
        .flat_map(|(i, img)| (0..img.chunks.len() as u32).map(move |index| (i, index)))
        .collect();

    let outcomes: Vec<ChunkOutcome> = tasks
        .par_iter()
        .map(|&(image, index)| {
            let img = &images[image];
            let id = ChunkId::new(img.dir.id.clone(), index);
            let clean = &img.chunks.chunks[index as usize];
            let record = engine.decide(&id);
            let result = engine.apply(&id, clean, record).and_then(|corrupted| {
                if layout == OutputLayout::Pairs {
                    write_pair(output_root, &id, &corrupted, clean)?;
                }
                Ok(corrupted)
            });
            progress(&id.to_string());
            ChunkOutcome {
                image,
                id,
                record,
                result,
            }
        })
        .collect();

    let mut log = CorruptionLog::new();
    let mut corrupted: Vec<Vec<Option<Bytes>>> = images
        .iter()
        .map(|img| vec![None; img.chunks.len()])
        .collect();

    for outcome in outcomes {
        log.record(engine.decision_key(&outcome.id), outcome.record);
        match outcome.result {
            Ok(data) => {
                report.succeeded(outcome.id.to_string());
                corrupted[outcome.image][outcome.id.index as usize] = Some(data);
            }
            Err(e) => report.failed(outcome.id.to_string(), &e),
        }
    }

    if layout == OutputLayout::Mirror {
        let written: Vec<(String, Result<()>)> = images
            .par_iter()
            .zip(corrupted.into_par_iter())
            .filter_map(|(img, slots)| {
                // images with a failed chunk are not written
                let chunks = slots.into_iter().collect::<Option<Vec<_>>>()?;
                let set = img.chunks.with_chunks(chunks);
                let result = ImageDir::new(output_root, img.dir.id.clone()).write(
                    &img.header,
                    &img.trailer,
                    &set,
                    img.policy,
                );
                Some((img.dir.id.clone(), result))
            })
            .collect();
        for (id, result) in written {
            if let Err(e) = result {
                report.failed(id, &e);
            }
        }
    }

    report.sort();
    info!(
        chunks = log.len(),
        clean = log.clean_count(),
        failed = report.failures.len(),
        "corruption finished"
    );
    Ok(CorruptOutcome { report, log })
}

/// Reassemble one image, optionally with chunks from a repaired body dir.
///
/// A repaired directory without its own `meta.json` is read with the
/// image's chunk geometry. The segmentation policy always comes from the
/// image itself. Whole-body images are rebuilt from their `body.bin`.
pub fn reconstruct_image(image: &ImageDir, repaired_body: Option<&Path>, out: &Path) -> Result<u64> {
    if image.is_whole_body() {
        if repaired_body.is_some() {
            return Err(BitmendError::Configuration(format!(
                "{} has an unchunked body; pass a repaired body file instead",
                image.id
            )));
        }
        return reconstruct_with_body(image, &image.body_file_path(), out);
    }

    let header = image.read_header()?;
    let trailer = image.read_trailer()?;
    let own = BodyMeta::load(&image.body_dir())?;

    let chunks = match repaired_body {
        Some(dir) => {
            let meta = if dir.join(META_FILE).is_file() {
                BodyMeta::load(dir)?.chunks
            } else {
                own.chunks
            };
            dataset::read_chunks_with(dir, meta)?
        }
        None => dataset::read_chunks_with(&image.body_dir(), own.chunks)?,
    };

    let written = write_reconstructed(out, &header, &trailer, &chunks, own.policy)?;
    debug!(image = %image.id, bytes = written, out = %out.display(), "reconstructed");
    Ok(written)
}

/// Reassemble one image from its header and trailer and an unchunked body file.
///
/// The policy is read from the image's `body/meta.json` when it has one;
/// whole-body exports are always scan-header.
pub fn reconstruct_with_body(image: &ImageDir, body: &Path, out: &Path) -> Result<u64> {
    let header = image.read_header()?;
    let trailer = image.read_trailer()?;
    let policy = if image.body_dir().join(META_FILE).is_file() {
        BodyMeta::load(&image.body_dir())?.policy
    } else {
        SegmentPolicy::ScanHeader
    };
    let body = fs::read(body)?;

    let written = write_raw_reconstructed(out, &header, &body, &trailer, policy)?;
    debug!(image = %image.id, bytes = written, out = %out.display(), "reconstructed from body file");
    Ok(written)
}

/// Reassemble every image of a dataset into `<output_dir>/<image-id>.jpg`
pub fn reconstruct_corpus<P>(root: &Path, output_dir: &Path, progress: P) -> Result<BatchReport>
where
    P: Fn(&str) + Sync,
{
    let mut dirs = dataset::list_image_dirs(root)?;
    dirs.extend(dataset::list_whole_body_dirs(root)?);
    fs::create_dir_all(output_dir)?;
    info!(images = dirs.len(), root = %root.display(), "reconstructing dataset");

    let results: Vec<(String, Result<()>)> = dirs
        .par_iter()
        .map(|dir| {
            let out = output_dir.join(format!("{}.jpg", dir.id));
            let result = reconstruct_image(dir, None, &out).map(|_| ());
            progress(&dir.id);
            (dir.id.clone(), result)
        })
        .collect();

    Ok(BatchReport::from_results(results))
}

/// Comparison of an original file with a corrupted and/or repaired version
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub original: PathBuf,
    pub test: PathBuf,
    pub repaired: Option<PathBuf>,
    /// Original against `test`
    pub diff: BitDiffStats,
    /// `None` when `diff.total_bits` is zero
    pub match_percent: Option<f64>,
    /// `None` when `diff.total_bits` is zero
    pub differ_percent: Option<f64>,
    /// Present when a repaired file was given; `test` is then the corrupted file
    pub recovery: Option<RecoveryStatistics>,
    /// `None` when corruption flipped nothing
    pub recovery_rate: Option<f64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

pub fn analyze_files(original: &Path, test: &Path, repaired: Option<&Path>) -> Result<AnalysisReport> {
    let o = fs::read(original)?;
    let t = fs::read(test)?;
    let diff = bit_diff_stats(&o, &t);

    let recovery = match repaired {
        Some(path) => Some(recovery_stats(&o, &t, &fs::read(path)?)),
        None => None,
    };

    Ok(AnalysisReport {
        original: original.to_path_buf(),
        test: test.to_path_buf(),
        repaired: repaired.map(Path::to_path_buf),
        match_percent: finite(diff.match_percent()),
        differ_percent: finite(diff.differ_percent()),
        recovery_rate: recovery.as_ref().and_then(|r| finite(r.recovery_rate())),
        diff,
        recovery,
    })
}
