//! Corruption severity selection
//!
//! The engine decides *whether* a chunk is corrupted and *how hard*; the
//! actual bit flipping is delegated to a [`BitFlipper`]. Decisions are a pure
//! function of the run seed and the decision key (the chunk id, or the image
//! id under [`Granularity::Image`]), so a corpus processed in parallel yields
//! the same log as a sequential run.

use crate::chunk::{ChunkId, ChunkSet};
use crate::error::{BitmendError, Result};
use crate::flipper::BitFlipper;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Default severities in percent of bits flipped
pub const DEFAULT_LEVELS: [f64; 5] = [0.05, 0.1, 0.2, 0.3, 0.5];

/// Default relative weights for [`DEFAULT_LEVELS`]
pub const DEFAULT_WEIGHTS: [f64; 5] = [10.0, 20.0, 30.0, 25.0, 15.0];

/// Default share of chunks passed through untouched
pub const DEFAULT_CLEAN_RATIO: f64 = 0.1;

/// One selectable severity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityLevel {
    /// Percent of bits to flip
    pub percent: f64,
    /// Relative weight (weights need not sum to 1)
    pub weight: f64,
}

impl SeverityLevel {
    pub fn new(percent: f64, weight: f64) -> Self {
        Self { percent, weight }
    }
}

/// Unit that one severity decision applies to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// Every chunk draws its own severity; the log is keyed by chunk id
    #[default]
    Chunk,
    /// One severity per image, applied to all of its chunks; the log is keyed by image id
    Image,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Chunk => write!(f, "chunk"),
            Granularity::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = BitmendError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chunk" => Ok(Self::Chunk),
            "image" => Ok(Self::Image),
            other => Err(BitmendError::Configuration(format!(
                "unknown granularity: {other} (expected chunk or image)"
            ))),
        }
    }
}

/// Immutable corruption configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionConfig {
    pub levels: Vec<SeverityLevel>,
    /// Probability in `[0, 1]` that a decision unit is left clean
    pub clean_ratio: f64,
    /// Run seed; `None` draws one per run
    pub seed: Option<u64>,
    #[serde(default)]
    pub granularity: Granularity,
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS
                .iter()
                .zip(DEFAULT_WEIGHTS.iter())
                .map(|(&p, &w)| SeverityLevel::new(p, w))
                .collect(),
            clean_ratio: DEFAULT_CLEAN_RATIO,
            seed: None,
            granularity: Granularity::default(),
        }
    }
}

impl CorruptionConfig {
    /// Build from parallel percent / weight lists
    pub fn from_lists(percents: &[f64], weights: &[f64], clean_ratio: f64) -> Result<Self> {
        if percents.len() != weights.len() {
            return Err(BitmendError::Configuration(format!(
                "{} severity levels but {} weights",
                percents.len(),
                weights.len()
            )));
        }
        let config = Self {
            levels: percents
                .iter()
                .zip(weights)
                .map(|(&p, &w)| SeverityLevel::new(p, w))
                .collect(),
            clean_ratio,
            seed: None,
            granularity: Granularity::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.clean_ratio) {
            return Err(BitmendError::Configuration(format!(
                "clean_ratio must be within [0, 1], got {}",
                self.clean_ratio
            )));
        }
        if self.clean_ratio < 1.0 && self.levels.is_empty() {
            return Err(BitmendError::Configuration(
                "at least one severity level is required".to_string(),
            ));
        }
        for level in &self.levels {
            if !(level.percent > 0.0 && level.percent <= 100.0) {
                return Err(BitmendError::Configuration(format!(
                    "severity must be within (0, 100], got {}",
                    level.percent
                )));
            }
            if !level.weight.is_finite() || level.weight < 0.0 {
                return Err(BitmendError::Configuration(format!(
                    "weight must be a finite non-negative number, got {}",
                    level.weight
                )));
            }
        }
        if self.clean_ratio < 1.0 && self.levels.iter().map(|l| l.weight).sum::<f64>() <= 0.0 {
            return Err(BitmendError::Configuration(
                "severity weights sum to zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cumulative-weight table for weighted severity draws
#[derive(Debug, Clone)]
pub struct SeverityTable {
    percents: Vec<f64>,
    cumulative: Vec<f64>,
}

impl SeverityTable {
    pub fn new(levels: &[SeverityLevel]) -> Self {
        let mut acc = 0.0;
        let cumulative = levels
            .iter()
            .map(|l| {
                acc += l.weight;
                acc
            })
            .collect();
        Self {
            percents: levels.iter().map(|l| l.percent).collect(),
            cumulative,
        }
    }

    pub fn total_weight(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Level for a point in `[0, total_weight)`
    pub fn lookup(&self, point: f64) -> Option<f64> {
        if self.percents.is_empty() {
            return None;
        }
        let idx = self.cumulative.partition_point(|&c| c <= point);
        Some(self.percents[idx.min(self.percents.len() - 1)])
    }

    /// Weighted random draw
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        let total = self.total_weight();
        if total <= 0.0 {
            return None;
        }
        self.lookup(rng.gen_range(0.0..total))
    }
}

/// One corruption decision; `0.0` means clean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorruptionRecord {
    pub severity_percent: f64,
}

impl CorruptionRecord {
    pub const CLEAN: CorruptionRecord = CorruptionRecord {
        severity_percent: 0.0,
    };

    pub fn is_clean(&self) -> bool {
        self.severity_percent == 0.0
    }
}

/// Dataset-level log: decision key (chunk or image id) → severity
///
/// Serialized as a flat JSON object with sorted keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorruptionLog {
    entries: BTreeMap<String, CorruptionRecord>,
}

impl CorruptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, record: CorruptionRecord) {
        self.entries.insert(key.into(), record);
    }

    pub fn get(&self, key: &str) -> Option<CorruptionRecord> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clean_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_clean()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CorruptionRecord)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Write the whole log at once, atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        crate::atomic::write_atomic(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Deterministic RNG for one key: `blake3(domain || seed || key)`
pub fn keyed_rng(seed: u64, domain: &[u8], key: &str) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(&seed.to_le_bytes());
    hasher.update(key.as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// Corruption engine: severity selection plus delegation to a flipper
pub struct CorruptionEngine<F: BitFlipper> {
    config: CorruptionConfig,
    table: SeverityTable,
    seed: u64,
    flipper: F,
}

impl<F: BitFlipper> CorruptionEngine<F> {
    pub fn new(config: CorruptionConfig, flipper: F) -> Result<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        let table = SeverityTable::new(&config.levels);
        Ok(Self {
            config,
            table,
            seed,
            flipper,
        })
    }

    /// Seed actually in use (drawn when the config had none)
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &CorruptionConfig {
        &self.config
    }

    /// Key under which the decision for `id` is made and logged
    pub fn decision_key(&self, id: &ChunkId) -> String {
        match self.config.granularity {
            Granularity::Chunk => id.to_string(),
            Granularity::Image => id.image.clone(),
        }
    }

    /// Decide the severity for one chunk.
    ///
    /// Under [`Granularity::Image`] every chunk of an image gets the same answer.
    pub fn decide(&self, id: &ChunkId) -> CorruptionRecord {
        let mut rng = keyed_rng(self.seed, b"bitmend.severity", &self.decision_key(id));
        if rng.gen::<f64>() < self.config.clean_ratio {
            return CorruptionRecord::CLEAN;
        }
        match self.table.draw(&mut rng) {
            Some(severity_percent) => CorruptionRecord { severity_percent },
            None => CorruptionRecord::CLEAN,
        }
    }

    /// Apply an already-made decision to a chunk
    pub fn apply(&self, id: &ChunkId, data: &[u8], record: CorruptionRecord) -> Result<Bytes> {
        if record.is_clean() {
            return Ok(Bytes::copy_from_slice(data));
        }
        let flipped = self.flipper.flip(id, data, record.severity_percent)?;
        if flipped.len() != data.len() {
            return Err(BitmendError::CollaboratorFailure {
                chunk: id.to_string(),
                reason: format!(
                    "returned {} bytes for a {} byte chunk",
                    flipped.len(),
                    data.len()
                ),
            });
        }
        Ok(Bytes::from(flipped))
    }

    /// Decide, log, then corrupt one chunk.
    ///
    /// The decision is in `log` before the flipper runs, so it survives a
    /// collaborator failure.
    pub fn corrupt_chunk(
        &self,
        id: &ChunkId,
        data: &[u8],
        log: &mut CorruptionLog,
    ) -> Result<Bytes> {
        let record = self.decide(id);
        log.record(self.decision_key(id), record);
        debug!(chunk = %id, severity = record.severity_percent, "corruption decided");
        self.apply(id, data, record)
    }

    /// Corrupt every chunk of one image, returning a parallel chunk set.
    ///
    /// Stops at the first failing chunk; every decision made so far is
    /// already logged.
    pub fn corrupt_set(
        &self,
        image: &str,
        set: &ChunkSet,
        log: &mut CorruptionLog,
    ) -> Result<ChunkSet> {
        let chunks = set
            .chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| self.corrupt_chunk(&ChunkId::new(image, index as u32), chunk, log))
            .collect::<Result<Vec<_>>>()?;
        Ok(set.with_chunks(chunks))
    }
}
