//! The immutable track-info record (spec.md §3): path/URL, duration,
//! mtime, and an ordered comment list with case-insensitive keys.
//!
//! Lifecycle and reference counting: spec.md describes a manual refcount
//! field, freed "when the last reference drops AND it is no longer in the
//! cache". In Rust, `Arc<TrackInfo>` gives us exactly that lifecycle for
//! free — the cache holds one `Arc` clone in its table, every external
//! holder (player, UI, playlist entries) holds its own clone, and the
//! value drops the moment the last clone does, whether that's the cache's
//! own entry (on `remove`) or an external holder releasing its handle.
//! There is no separate refcount field to get out of sync.

use std::sync::Arc;

/// A single (key, value) comment pair, as read from tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub key: String,
    pub value: String,
}

/// Immutable once published into the cache (spec.md §3 invariant):
/// replacing a stale entry is done by removing it and inserting a new
/// `TrackInfo`, never by mutating one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Absolute path or URL.
    pub path: String,
    /// Duration in whole seconds, -1 if unknown (always so for remote).
    pub duration: i32,
    /// mtime at decode time; 0 for remote sources.
    pub mtime: i64,
    pub comments: Vec<Comment>,
}

impl TrackInfo {
    pub fn new(path: impl Into<String>) -> Self {
        TrackInfo {
            path: path.into(),
            duration: -1,
            mtime: 0,
            comments: Vec::new(),
        }
    }

    /// Case-insensitive comment lookup, per spec.md §3.
    pub fn comment(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key))
            .map(|c| c.value.as_str())
    }
}

pub type TrackInfoRef = Arc<TrackInfo>;
