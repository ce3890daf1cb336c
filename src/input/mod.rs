//! Input plugin abstraction (spec.md §4.4): a registry/vtable model where
//! plugins publish the extensions and MIME types they claim, and a
//! per-stream decoder object drives one through
//! open/read/seek/read_tags/duration.
//!
//! Dynamically loaded plugins are out of scope — `PluginRegistry` just
//! holds a `Vec<Arc<dyn InputPlugin>>` populated at construction time,
//! with static registration standing in for the dynamic-loading mechanism
//! a C implementation would use.

mod genres;
pub mod symphonia_plugin;
pub mod tags;

use crate::cache::Comment;
use crate::config::PlayerConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::{self, IcyReader};
use crate::sample_format::SampleFormat;
use reqwest::blocking::Client;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use symphonia_plugin::SymphoniaPlugin;

/// Where an opened stream's bytes come from: a local file, or a remote
/// reader already stripped of Icy metadata framing if applicable.
pub enum PluginSource {
    Local(std::fs::File),
    Remote(Box<dyn Read + Send + Sync>, Option<u64>),
}

/// A single open media stream. Implementations are produced by
/// `InputPlugin::open` and own all per-stream decode state.
pub trait OpenStream: Send {
    fn sample_format(&self) -> SampleFormat;
    /// A blocking read of up to `buf.len()` bytes of *native* PCM (before
    /// C1 normalization). Returns `Ok(0)` at genuine end of stream.
    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize>;
    fn seek(&mut self, seconds: f64) -> EngineResult<()>;
    fn read_tags(&mut self) -> EngineResult<Vec<Comment>>;
    fn duration(&mut self) -> i32;
}

/// A registered codec/demuxer backend. `extensions`/`mime_types` drive
/// registry lookup; `open` does the actual probe + codec setup.
pub trait InputPlugin: Send + Sync {
    fn extensions(&self) -> &[&str];
    fn mime_types(&self) -> &[&str];
    fn open(&self, source: PluginSource) -> EngineResult<Box<dyn OpenStream>>;
}

/// Holds every registered plugin; lookup is O(plugin-count) over
/// case-insensitive extension or MIME type, per spec.md §4.4.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn InputPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry { plugins: Vec::new() }
    }

    /// The registry preloaded with the one built-in backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SymphoniaPlugin::new()));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn InputPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn by_extension(&self, ext: &str) -> Option<Arc<dyn InputPlugin>> {
        let ext = ext.to_lowercase();
        self.plugins
            .iter()
            .find(|p| p.extensions().iter().any(|e| e.eq_ignore_ascii_case(&ext)))
            .cloned()
    }

    pub fn by_mime(&self, mime: &str) -> Option<Arc<dyn InputPlugin>> {
        let mime = mime.to_lowercase();
        self.plugins
            .iter()
            .find(|p| p.mime_types().iter().any(|m| m.eq_ignore_ascii_case(&mime)))
            .cloned()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Small timeout budget standing in for a non-blocking read's poll before
/// delegating to the plugin; see `Decoder::read` below for why this
/// engine implements the "no data currently available" case as a bounded
/// zero-progress retry rather than a raw-fd `select(2)` call.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-stream decoder object (spec.md §4.4): the opened plugin stream plus
/// its bookkeeping (remote flag, sample format, EOF flag, precomputed
/// normalizer scale).
pub struct Decoder {
    path: String,
    remote: bool,
    stream: Option<Box<dyn OpenStream>>,
    sample_format: Option<SampleFormat>,
    eof: bool,
    zero_progress_retries: u32,
    duration_cache: Option<i32>,
    /// Icy inline-metadata sink for remote streams (spec.md §4.3/§4.7:
    /// "forwarded to the player (sets metadata changed)"); `None` for
    /// local files and remote streams without an `icy-metaint` header.
    icy_metadata: Option<Arc<http::MetadataState>>,
}

impl Decoder {
    /// Allocates the decoder; performs no I/O (spec.md: `new(path)` "does
    /// not touch I/O").
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let remote = http::ParsedUri::parse(&path).is_some();
        Decoder {
            path,
            remote,
            stream: None,
            sample_format: None,
            eof: false,
            zero_progress_retries: 0,
            duration_cache: None,
            icy_metadata: None,
        }
    }

    /// Clears and reports the Icy "metadata changed since last query"
    /// flag, along with the new title when it has in fact changed. A
    /// local decoder or a remote stream with no `icy-metaint` always
    /// reports no change.
    pub fn poll_metadata_changed(&self) -> Option<String> {
        let sink = self.icy_metadata.as_ref()?;
        if sink.poll_changed() {
            sink.current_title()
        } else {
            None
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.sample_format
    }

    /// Opens the underlying plugin stream: local paths dispatch on
    /// extension, URLs invoke C3 and dispatch on Content-Type.
    pub fn open(
        &mut self,
        config: &PlayerConfig,
        registry: &PluginRegistry,
        client: &Client,
    ) -> EngineResult<()> {
        let plugin_source;
        let plugin;

        if self.remote {
            let response = http::fetch(client, &self.path, config)?;
            let content_type = response
                .content_type
                .clone()
                .ok_or_else(|| EngineError::UnrecognizedFileType(self.path.clone()))?;
            plugin = registry
                .by_mime(&content_type)
                .ok_or_else(|| EngineError::UnrecognizedFileType(self.path.clone()))?;

            let content_length = response.content_length;
            let reader: Box<dyn Read + Send + Sync> = match response.icy_meta_interval {
                Some(interval) if interval > 0 => {
                    let sink = Arc::new(http::MetadataState::default());
                    self.icy_metadata = Some(sink.clone());
                    Box::new(IcyReader::new(response.reader, interval, sink))
                }
                _ => {
                    self.icy_metadata = None;
                    Box::new(response.reader)
                }
            };
            plugin_source = PluginSource::Remote(reader, content_length);
        } else {
            let ext = Path::new(&self.path)
                .extension()
                .and_then(|e| e.to_str())
                .ok_or_else(|| EngineError::UnrecognizedFileType(self.path.clone()))?;
            plugin = registry
                .by_extension(ext)
                .ok_or_else(|| EngineError::UnrecognizedFileType(self.path.clone()))?;
            let file = std::fs::File::open(&self.path)
                .map_err(|e| EngineError::errno(&self.path, e))?;
            plugin_source = PluginSource::Local(file);
        }

        let stream = plugin.open(plugin_source)?;
        self.sample_format = Some(stream.sample_format());
        self.stream = Some(stream);
        self.eof = false;
        self.zero_progress_retries = 0;
        Ok(())
    }

    pub fn close(&mut self) {
        self.stream = None;
        self.sample_format = None;
        self.icy_metadata = None;
    }

    /// Reads up to `buf.len()` bytes of already-normalized (C1) PCM. A
    /// non-blocking-read contract with a `select()`-style poll is
    /// reinterpreted here as: treat a zero-byte, no-error read as "no data
    /// currently available" and retry up to `MAX_ZERO_PROGRESS_RETRIES`
    /// times (a short sleep stands in for the poll timeout) before
    /// surfacing genuine end of stream. A raw-fd `select(2)` has no
    /// equivalent over a blocking `Read`-based source, which is the
    /// reason for the substitution (see DESIGN.md).
    pub fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        if self.eof {
            return Ok(0);
        }
        let fmt = self.sample_format.ok_or_else(|| {
            EngineError::Internal("read() called before open()".to_string())
        })?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| EngineError::Internal("read() called before open()".to_string()))?;

        let scale = fmt.scale_factor();
        let raw_capacity = if scale > 1 {
            buf.len() / scale as usize
        } else {
            buf.len()
        };
        if raw_capacity == 0 {
            return Ok(0);
        }

        let mut raw = vec![0u8; raw_capacity];
        let n = loop {
            let n = stream.read(&mut raw)?;
            if n > 0 {
                self.zero_progress_retries = 0;
                break n;
            }
            self.zero_progress_retries += 1;
            if self.zero_progress_retries >= crate::config::MAX_ZERO_PROGRESS_RETRIES {
                self.eof = true;
                return Ok(0);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let frames = n / fmt.frame_size().max(1);
        crate::sample_format::convert_in_place(fmt, &mut raw[..n], frames * fmt.channels as usize);

        if scale > 1 {
            let written = crate::sample_format::convert(fmt, buf, &raw[..n], frames);
            Ok(written)
        } else {
            buf[..n].copy_from_slice(&raw[..n]);
            Ok(n)
        }
    }

    /// Seeking a remote stream is disallowed (spec.md §4.4).
    pub fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        if self.remote {
            return Err(EngineError::FunctionNotSupported("seek on remote stream".to_string()));
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| EngineError::Internal("seek() called before open()".to_string()))?;
        stream.seek(seconds)?;
        self.eof = false;
        self.zero_progress_retries = 0;
        Ok(())
    }

    pub fn read_tags(&mut self) -> EngineResult<Vec<Comment>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| EngineError::Internal("read_tags() called before open()".to_string()))?;
        let raw = stream.read_tags()?;
        Ok(tags::normalize_all(raw))
    }

    pub fn duration(&mut self) -> i32 {
        if let Some(d) = self.duration_cache {
            return d;
        }
        let d = if self.remote {
            -1
        } else {
            self.stream.as_mut().map(|s| s.duration()).unwrap_or(-1)
        };
        self.duration_cache = Some(d);
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_metadata_changed_reports_once_per_icy_title() {
        let mut decoder = Decoder::new("http://example.invalid/stream.mp3");
        assert_eq!(decoder.poll_metadata_changed(), None);

        let sink = Arc::new(http::MetadataState::default());
        decoder.icy_metadata = Some(sink.clone());

        assert_eq!(decoder.poll_metadata_changed(), None);
        sink.set_title("Artist - Song".to_string());
        assert_eq!(decoder.poll_metadata_changed().as_deref(), Some("Artist - Song"));
        // Already polled; no change until the next title arrives.
        assert_eq!(decoder.poll_metadata_changed(), None);
    }

    #[test]
    fn local_decoder_never_reports_metadata_changes() {
        let decoder = Decoder::new("/home/user/music/a.flac");
        assert!(!decoder.is_remote());
        assert_eq!(decoder.poll_metadata_changed(), None);
    }
}
