//! Bit-flip collaborators
//!
//! Contract: given a buffer and a percentage `p`, flip exactly
//! `round(p / 100 * 8 * len)` distinct bit positions chosen uniformly and
//! return a buffer of the same length.

use crate::chunk::ChunkId;
use crate::corruption::keyed_rng;
use crate::error::{BitmendError, Result};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default external program
pub const DEFAULT_BITFLIP_CMD: &str = "bitflip";

/// Default per-chunk timeout for the external program
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Capability to flip bits in one chunk
pub trait BitFlipper: Send + Sync {
    fn flip(&self, id: &ChunkId, data: &[u8], percent: f64) -> Result<Vec<u8>>;
}

impl<T: BitFlipper + ?Sized> BitFlipper for Box<T> {
    fn flip(&self, id: &ChunkId, data: &[u8], percent: f64) -> Result<Vec<u8>> {
        (**self).flip(id, data, percent)
    }
}

/// Number of bits to flip for `percent` of a `len`-byte buffer
pub fn flip_count(len: usize, percent: f64) -> usize {
    let total_bits = len * 8;
    let n = (percent / 100.0 * total_bits as f64).round();
    if n <= 0.0 {
        0
    } else {
        (n as usize).min(total_bits)
    }
}

/// Flip the given bit positions in place (bit `i` is bit `i % 8` of byte `i / 8`, LSB first)
pub fn flip_bit_positions(data: &mut [u8], positions: impl IntoIterator<Item = usize>) {
    for pos in positions {
        data[pos / 8] ^= 1 << (pos % 8);
    }
}

/// Deterministic in-process flipper
///
/// Positions are sampled without replacement from an RNG keyed on the seed
/// and the chunk id.
#[derive(Debug, Clone, Copy)]
pub struct InProcessFlipper {
    seed: u64,
}

impl InProcessFlipper {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl BitFlipper for InProcessFlipper {
    fn flip(&self, id: &ChunkId, data: &[u8], percent: f64) -> Result<Vec<u8>> {
        let mut out = data.to_vec();
        let n = flip_count(data.len(), percent);
        if n == 0 {
            return Ok(out);
        }
        let mut rng = keyed_rng(self.seed, b"bitmend.flip", &id.to_string());
        let positions = rand::seq::index::sample(&mut rng, data.len() * 8, n);
        flip_bit_positions(&mut out, positions.iter());
        Ok(out)
    }
}

/// External bit-flip program, run once per chunk
///
/// Invoked as `<program> spray percent:<p> <file>` on a scratch copy of the
/// chunk; the program edits the file in place.
#[derive(Debug, Clone)]
pub struct ExternalFlipper {
    program: PathBuf,
    timeout: Duration,
}

impl Default for ExternalFlipper {
    fn default() -> Self {
        Self::new(DEFAULT_BITFLIP_CMD, DEFAULT_TIMEOUT)
    }
}

impl ExternalFlipper {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn failure(id: &ChunkId, reason: impl Into<String>) -> BitmendError {
        BitmendError::CollaboratorFailure {
            chunk: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl BitFlipper for ExternalFlipper {
    fn flip(&self, id: &ChunkId, data: &[u8], percent: f64) -> Result<Vec<u8>> {
        let mut scratch = tempfile::NamedTempFile::new()?;
        scratch.write_all(data)?;
        scratch.flush()?;

        let mut stderr_log = tempfile::tempfile()?;
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .arg("spray")
            .arg(format!("percent:{percent}"))
            .arg(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_log.try_clone()?))
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Self::failure(id, format!("{} not found", self.program.display()))
                } else {
                    Self::failure(id, format!("spawn failed: {e}"))
                }
            })?;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        warn!(chunk = %id, timeout = ?self.timeout, "bit-flip collaborator killed");
                        return Err(BitmendError::CollaboratorTimeout {
                            chunk: id.to_string(),
                            timeout: self.timeout,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(Self::failure(id, format!("wait failed: {e}"))),
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            stderr_log.seek(SeekFrom::Start(0))?;
            let _ = stderr_log.read_to_string(&mut stderr);
            return Err(Self::failure(
                id,
                format!("{status}: {}", stderr.trim()),
            ));
        }

        let out = std::fs::read(scratch.path())?;
        debug!(
            chunk = %id,
            percent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "external flip done"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::bit_diff_stats;

    #[test]
    fn test_flip_count() {
        assert_eq!(flip_count(4096, 0.05), 16); // 16.384
        assert_eq!(flip_count(4096, 0.1), 33); // 32.768
        assert_eq!(flip_count(4096, 0.5), 164); // 163.84
        assert_eq!(flip_count(1, 100.0), 8);
        assert_eq!(flip_count(1, 1.0), 0); // 0.08
        assert_eq!(flip_count(0, 50.0), 0);
    }

    #[test]
    fn test_flip_bit_positions() {
        let mut data = vec![0u8; 4];
        flip_bit_positions(&mut data, [0, 9, 31]);
        assert_eq!(data, vec![0x01, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_in_process_flips_exact_count() {
        let flipper = InProcessFlipper::new(11);
        let data = vec![0xA5u8; 4096];
        for (i, percent) in [0.05, 0.1, 0.2, 0.3, 0.5].into_iter().enumerate() {
            let id = ChunkId::new("image_0001", i as u32);
            let out = flipper.flip(&id, &data, percent).unwrap();
            assert_eq!(out.len(), data.len());
            let stats = bit_diff_stats(&data, &out);
            assert_eq!(stats.differing_bits as usize, flip_count(data.len(), percent));
        }
    }

    #[test]
    fn test_in_process_is_deterministic_per_chunk() {
        let flipper = InProcessFlipper::new(1);
        let data = vec![0u8; 512];
        let a = flipper.flip(&ChunkId::new("img", 0), &data, 1.0).unwrap();
        let b = flipper.flip(&ChunkId::new("img", 0), &data, 1.0).unwrap();
        let c = flipper.flip(&ChunkId::new("img", 1), &data, 1.0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_external_missing_program() {
        let flipper = ExternalFlipper::new(
            "/nonexistent/bitmend-test-bitflip",
            Duration::from_secs(1),
        );
        let err = flipper
            .flip(&ChunkId::new("img", 0), &[0u8; 16], 0.5)
            .unwrap_err();
        assert!(matches!(err, BitmendError::CollaboratorFailure { .. }));
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_nonzero_exit() {
        // `false` ignores its arguments and exits 1
        let flipper = ExternalFlipper::new("false", Duration::from_secs(5));
        let err = flipper
            .flip(&ChunkId::new("img", 0), &[0u8; 16], 0.5)
            .unwrap_err();
        assert!(matches!(err, BitmendError::CollaboratorFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_external_timeout_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("hang.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let flipper = ExternalFlipper::new(&script, Duration::from_millis(300));
        let started = Instant::now();
        let err = flipper
            .flip(&ChunkId::new("img", 3), &[0u8; 16], 0.5)
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match &err {
            BitmendError::CollaboratorTimeout { chunk, timeout } => {
                assert_eq!(chunk, "img_chunk_0003");
                assert_eq!(*timeout, Duration::from_millis(300));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[test]
    fn test_external_success_passthrough() {
        // `true` leaves the scratch file untouched
        let flipper = ExternalFlipper::new("true", Duration::from_secs(5));
        let data: Vec<u8> = (0..64).collect();
        let out = flipper.flip(&ChunkId::new("img", 0), &data, 0.5).unwrap();
        assert_eq!(out, data);
    }
}
