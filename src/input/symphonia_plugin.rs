//! The one built-in `InputPlugin`: wraps Symphonia's probe/format/codec
//! machinery (`MediaSourceStream` + `FormatOptions{enable_gapless:true}` +
//! `default::get_probe()` + `CodecRegistry`), emitting 16-bit signed PCM
//! via `SampleBuffer<i16>` so C1's normalizer has integer samples to
//! operate on rather than Symphonia's native `f32` decode output.

use super::{InputPlugin, OpenStream, PluginSource};
use crate::cache::Comment;
use crate::error::{EngineError, EngineResult};
use crate::sample_format::SampleFormat;
use once_cell::sync::Lazy;
use std::io::{Read, Seek, SeekFrom};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecRegistry, Decoder as SymphoniaDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use symphonia::default::{self, register_enabled_codecs};

static CODEC_REGISTRY: Lazy<CodecRegistry> = Lazy::new(|| {
    let mut registry = CodecRegistry::new();
    register_enabled_codecs(&mut registry);
    registry
});

const EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "oga", "wav", "m4a", "aac", "mp4"];
const MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/flac",
    "audio/ogg",
    "audio/vorbis",
    "audio/wav",
    "audio/x-wav",
    "audio/aac",
    "audio/mp4",
    "audio/x-m4a",
];

pub struct SymphoniaPlugin;

impl SymphoniaPlugin {
    pub fn new() -> Self {
        SymphoniaPlugin
    }
}

impl Default for SymphoniaPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl InputPlugin for SymphoniaPlugin {
    fn extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn mime_types(&self) -> &[&str] {
        MIME_TYPES
    }

    fn open(&self, source: PluginSource) -> EngineResult<Box<dyn OpenStream>> {
        let media_source: Box<dyn MediaSource> = match source {
            PluginSource::Local(file) => Box::new(file),
            PluginSource::Remote(reader, len) => Box::new(NonSeekableSource::new(reader, len)),
        };

        let mss = MediaSourceStream::new(media_source, MediaSourceStreamOptions::default());
        let format_options = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_options = MetadataOptions::default();

        let probed = default::get_probe()
            .format(&Hint::new(), mss, &format_options, &metadata_options)
            .map_err(|e| EngineError::FileFormat(e.to_string()))?;

        let mut reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| EngineError::FileFormat("no default track".to_string()))?
            .clone();
        let track_id = track.id;

        let decoder = CODEC_REGISTRY
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::FileFormat(e.to_string()))?;

        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u8)
            .unwrap_or(2)
            .max(1);
        let rate = track.codec_params.sample_rate.unwrap_or(44_100);
        let sample_format = SampleFormat::new(rate, channels, 16, true, false);

        let duration = track.codec_params.n_frames.and_then(|frames| {
            track
                .codec_params
                .time_base
                .map(|tb| tb.calc_time(frames).seconds as i32)
        });

        Ok(Box::new(SymphoniaStream {
            reader,
            decoder,
            track_id,
            sample_format,
            backlog: Vec::new(),
            backlog_pos: 0,
            duration_seconds: duration.unwrap_or(-1),
            eof: false,
        }))
    }
}

struct SymphoniaStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_format: SampleFormat,
    backlog: Vec<u8>,
    backlog_pos: usize,
    duration_seconds: i32,
    eof: bool,
}

impl SymphoniaStream {
    fn refill(&mut self) -> EngineResult<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.eof = true;
                    return Ok(false);
                }
                Err(e) => return Err(EngineError::FileFormat(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    self.backlog.clear();
                    self.backlog.extend(
                        sample_buf
                            .samples()
                            .iter()
                            .flat_map(|s| s.to_le_bytes()),
                    );
                    self.backlog_pos = 0;
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(EngineError::FileFormat(e.to_string())),
            }
        }
    }
}

impl OpenStream for SymphoniaStream {
    fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    fn read(&mut self, buf: &mut [u8]) -> EngineResult<usize> {
        if self.backlog_pos >= self.backlog.len() {
            if self.eof {
                return Ok(0);
            }
            if !self.refill()? {
                return Ok(0);
            }
        }
        let available = self.backlog.len() - self.backlog_pos;
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.backlog[self.backlog_pos..self.backlog_pos + n]);
        self.backlog_pos += n;
        Ok(n)
    }

    fn seek(&mut self, seconds: f64) -> EngineResult<()> {
        let seconds = seconds.max(0.0);
        let time = Time::new(seconds.trunc() as u64, seconds.fract());
        let seek_to = SeekTo::Time {
            time,
            track_id: Some(self.track_id),
        };
        self.reader
            .seek(SeekMode::Accurate, seek_to)
            .map_err(|e| EngineError::FileFormat(e.to_string()))?;
        self.decoder.reset();
        self.backlog.clear();
        self.backlog_pos = 0;
        self.eof = false;
        Ok(())
    }

    fn read_tags(&mut self) -> EngineResult<Vec<Comment>> {
        let mut comments = Vec::new();
        if let Some(revision) = self.reader.metadata().current() {
            for tag in revision.tags() {
                comments.push(tag_to_comment(tag));
            }
        }
        Ok(comments)
    }

    fn duration(&mut self) -> i32 {
        self.duration_seconds
    }
}

/// Maps a Symphonia `Tag` to a raw (pre-normalization) comment, preferring
/// the standard key's canonical name when Symphonia recognized the frame,
/// falling back to the format-specific raw key (e.g. an unrecognized
/// `TXXX` description) so C4's `tags::normalize` can still promote it.
fn tag_to_comment(tag: &Tag) -> Comment {
    let key = match tag.std_key {
        Some(StandardTagKey::Artist) => "artist".to_string(),
        Some(StandardTagKey::Album) => "album".to_string(),
        Some(StandardTagKey::TrackTitle) => "title".to_string(),
        Some(StandardTagKey::Date) => "date".to_string(),
        Some(StandardTagKey::Genre) => "genre".to_string(),
        Some(StandardTagKey::TrackNumber) => "tracknumber".to_string(),
        Some(StandardTagKey::DiscNumber) => "discnumber".to_string(),
        Some(StandardTagKey::AlbumArtist) => "album artist".to_string(),
        Some(StandardTagKey::SortAlbumArtist) => "albumartistsort".to_string(),
        Some(StandardTagKey::Compilation) => "compilation".to_string(),
        Some(StandardTagKey::ReplayGainTrackGain) => "replaygain_track_gain".to_string(),
        Some(StandardTagKey::ReplayGainTrackPeak) => "replaygain_track_peak".to_string(),
        Some(StandardTagKey::ReplayGainAlbumGain) => "replaygain_album_gain".to_string(),
        Some(StandardTagKey::ReplayGainAlbumPeak) => "replaygain_album_peak".to_string(),
        _ => tag.key.to_lowercase(),
    };
    Comment {
        key,
        value: tag.value.to_string(),
    }
}

/// Wraps a non-seekable remote reader (after Icy stripping) as a Symphonia
/// `MediaSource`; modeled directly on the `NonSeekableSource` pattern used
/// for live Icecast/HTTP streams elsewhere in the Symphonia ecosystem.
/// `Seek` always errors — Symphonia only calls it when `is_seekable()` is
/// true, which this never reports.
struct NonSeekableSource<R> {
    reader: R,
    content_length: Option<u64>,
}

impl<R> NonSeekableSource<R> {
    fn new(reader: R, content_length: Option<u64>) -> Self {
        NonSeekableSource {
            reader,
            content_length,
        }
    }
}

impl<R: Read + Send + Sync> Read for NonSeekableSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: Read + Send + Sync> Seek for NonSeekableSource<R> {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "remote stream is not seekable",
        ))
    }
}

impl<R: Read + Send + Sync> MediaSource for NonSeekableSource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.content_length
    }
}
