//! Output plugin abstraction (spec.md §4.6): a trait cpal is the one
//! built-in implementation of, structured as a vtable a future backend
//! (ALSA direct, PulseAudio, JACK) could also implement.
//!
//! This engine writes 16-bit signed PCM (C1's normalized format, or a
//! pass-through format C1 declined to touch) straight into the device;
//! `CpalOutput` below owns the int16-to-f32 conversion cpal's stream needs
//! internally so the contract this trait exposes stays in the sample
//! format C4 actually produces.

pub mod cpal_output;

use crate::error::EngineResult;
use crate::sample_format::SampleFormat;

pub use cpal_output::CpalOutput;

/// A backend that can accept normalized PCM and play it: open/write/pause/
/// buffer_space plus option get/set, per spec.md's output vtable.
pub trait OutputPlugin: Send {
    fn init(&mut self) -> EngineResult<()>;
    fn exit(&mut self);

    /// Opens the device for `format`. Fails with `SampleFormat` if the
    /// backend cannot accept it (no resampling/DSP, per spec.md non-goal).
    fn open(&mut self, format: SampleFormat) -> EngineResult<()>;
    fn close(&mut self);

    /// Writes up to `buf.len()` bytes (always a whole number of frames)
    /// without blocking, returning the number of bytes actually accepted.
    /// A short write is not an error — the caller retries with the
    /// remainder once `buffer_space()` reports room.
    fn write(&mut self, buf: &[u8]) -> EngineResult<usize>;

    fn pause(&mut self);
    fn unpause(&mut self);

    /// Free space in the device's internal buffer, in bytes of the format
    /// passed to `open`. `-1` signals the device is in an error/lost state.
    fn buffer_space(&self) -> isize;

    fn set_option(&mut self, key: &str, value: &str) -> EngineResult<()>;
    fn get_option(&self, key: &str) -> Option<String>;
}
