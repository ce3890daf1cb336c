//! Ambient configuration for the engine: buffer sizing, HTTP timeouts and
//! redirect limits, and the on-disk cache location. `serde`/`serde_json`
//! let a host application persist this struct alongside its own config
//! instead of inventing a parallel mechanism.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Size of one ring-buffer chunk (spec default: 64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes/second of 44.1 kHz 16-bit stereo PCM, used to translate the
/// configured buffer size (in seconds) into a chunk count.
pub const CD_QUALITY_BYTES_PER_SEC: usize = 44_100 * 2 * 2;

/// Number of consecutive zero-progress reads the producer tolerates before
/// treating a misbehaving decoder as EOF (spec.md open question; the
/// suggested constant is used literally).
pub const MAX_ZERO_PROGRESS_RETRIES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Ring buffer capacity in seconds of CD-quality audio, clamped to [1, 20].
    pub buffer_seconds: u32,
    /// HTTP connect timeout.
    pub http_connect_timeout: Duration,
    /// HTTP read timeout.
    pub http_read_timeout: Duration,
    /// Maximum HTTP redirect hops before `HTTP_REDIRECT_LIMIT`.
    pub http_redirect_limit: u32,
    /// Directory holding the persistent track-info cache file.
    pub cache_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            buffer_seconds: 5,
            http_connect_timeout: Duration::from_secs(5),
            http_read_timeout: Duration::from_secs(5),
            http_redirect_limit: 2,
            cache_dir: PathBuf::from("."),
        }
    }
}

impl PlayerConfig {
    /// Number of chunks implied by `buffer_seconds`, per spec.md §4.8:
    /// `chunks = ceil(seconds * second_size / chunk_size)`, clamped to [1, 20] seconds.
    pub fn chunk_count(&self) -> usize {
        let seconds = self.buffer_seconds.clamp(1, 20) as usize;
        let bytes = seconds * CD_QUALITY_BYTES_PER_SEC;
        (bytes + CHUNK_SIZE - 1) / CHUNK_SIZE
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join("cache")
    }
}
