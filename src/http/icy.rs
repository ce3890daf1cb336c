//! Icy (Shoutcast) inline metadata stripping (spec.md §4.3).
//!
//! When serving a live stream with `icy-metaint: N`, every `N` bytes of
//! audio payload are followed by one length byte `L` and `L * 16` bytes of
//! metadata text. `IcyReader` strips that framing so the decoder only ever
//! sees payload bytes, and forwards any `StreamTitle='...'` found in the
//! metadata block to a shared `MetadataState` the player polls.

use std::io::{Read, Result as IoResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared sink the player polls for "metadata changed since last query"
/// (spec.md §3 player-state field), guarded the way spec.md §5 calls for
/// ("metadata mutex (inside C4) guards the metadata buffer and
/// `metadata_changed` flag").
#[derive(Default)]
pub struct MetadataState {
    title: Mutex<Option<String>>,
    changed: AtomicBool,
}

impl MetadataState {
    pub fn set_title(&self, title: String) {
        *self.title.lock().unwrap() = Some(title);
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Returns the current title and clears the "changed" flag, matching
    /// `ip_metadata_changed`'s read-and-clear semantics.
    pub fn poll_changed(&self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }

    pub fn current_title(&self) -> Option<String> {
        self.title.lock().unwrap().clone()
    }
}

pub struct IcyReader<R> {
    inner: R,
    interval: usize,
    remaining_payload: usize,
    sink: Arc<MetadataState>,
}

impl<R: Read> IcyReader<R> {
    pub fn new(inner: R, interval: usize, sink: Arc<MetadataState>) -> Self {
        IcyReader {
            inner,
            interval,
            remaining_payload: interval,
            sink,
        }
    }

    fn read_exact_inner(&mut self, buf: &mut [u8]) -> IoResult<bool> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.inner.read(&mut buf[read..])?;
            if n == 0 {
                return Ok(false);
            }
            read += n;
        }
        Ok(true)
    }

    fn consume_metadata_block(&mut self) -> IoResult<()> {
        let mut len_byte = [0u8; 1];
        if !self.read_exact_inner(&mut len_byte)? {
            return Ok(());
        }
        let len = len_byte[0] as usize * 16;
        if len == 0 {
            self.remaining_payload = self.interval;
            return Ok(());
        }
        let mut meta = vec![0u8; len];
        if self.read_exact_inner(&mut meta)? {
            parse_stream_title(&meta, &self.sink);
        }
        self.remaining_payload = self.interval;
        Ok(())
    }
}

impl<R: Read> Read for IcyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.interval == 0 {
            return self.inner.read(buf);
        }

        if self.remaining_payload == 0 {
            self.consume_metadata_block()?;
        }

        let want = buf.len().min(self.remaining_payload);
        if want == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining_payload -= n;
        Ok(n)
    }
}

/// Scans a raw Icy metadata block (NUL-padded key='value'; pairs) for
/// `StreamTitle` and forwards it if found.
fn parse_stream_title(meta: &[u8], sink: &MetadataState) {
    let text = String::from_utf8_lossy(meta);
    let text = text.trim_end_matches('\0');
    for field in text.split(';') {
        let field = field.trim();
        if let Some(rest) = field.strip_prefix("StreamTitle=") {
            let title = rest.trim_matches('\'').to_string();
            if !title.is_empty() {
                sink.set_title(title);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_stream(payload_blocks: &[&[u8]], metadata: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, payload) in payload_blocks.iter().enumerate() {
            out.extend_from_slice(payload);
            let meta_text = metadata.get(i).copied().unwrap_or("");
            if meta_text.is_empty() {
                out.push(0);
            } else {
                let mut bytes = meta_text.as_bytes().to_vec();
                let padded_len = ((bytes.len() + 15) / 16) * 16;
                bytes.resize(padded_len, 0);
                out.push((padded_len / 16) as u8);
                out.extend_from_slice(&bytes);
            }
        }
        out
    }

    #[test]
    fn strips_metadata_and_forwards_title() {
        let payload = b"AUDIODATA";
        let meta = "StreamTitle='Artist - Song';StreamUrl='';";
        let raw = build_stream(&[payload, payload], &[meta, ""]);

        let sink = Arc::new(MetadataState::default());
        let mut reader = IcyReader::new(Cursor::new(raw), payload.len(), sink.clone());

        let mut collected = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }

        assert_eq!(collected, [payload.as_slice(), payload.as_slice()].concat());
        assert!(sink.poll_changed());
        assert_eq!(sink.current_title().as_deref(), Some("Artist - Song"));
        // Polling again without new metadata reports no change.
        assert!(!sink.poll_changed());
    }
}
