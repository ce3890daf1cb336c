//! cpal-backed `OutputPlugin`: default-output-device + `build_output_stream`,
//! with a `DeviceNotAvailable` error callback setting a flag the player
//! notices on its next `write`/`buffer_space` call. Accepts the volume
//! gain C7's `CpalMixer` writes into directly, with no round trip through
//! the player.
//!
//! The producer/consumer bridge between `write()` and cpal's audio
//! callback is a plain `Mutex<VecDeque<f32>>` (see DESIGN.md on why a
//! lock-free ring isn't used here) — an implementation detail entirely
//! behind `OutputPlugin`; nothing externally observable depends on it
//! being lock-free.

use super::OutputPlugin;
use crate::error::{EngineError, EngineResult};
use crate::sample_format::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Raw cpal output is uncomfortably loud at gain 1.0 on most hardware.
const BASE_VOLUME: f32 = 0.8;

/// Roughly 300ms of buffering at the stream's sample rate.
const BUFFER_MS: usize = 300;

pub struct CpalOutput {
    stream: Option<Stream>,
    device: Option<Device>,
    config: Option<StreamConfig>,
    format: Option<SampleFormat>,
    buffer: Arc<Mutex<VecDeque<f32>>>,
    buffer_capacity_frames: usize,
    device_lost: Arc<AtomicBool>,
    volume: Arc<Mutex<f32>>,
    paused: bool,
}

impl CpalOutput {
    pub fn new(volume: Arc<Mutex<f32>>) -> Self {
        CpalOutput {
            stream: None,
            device: None,
            config: None,
            format: None,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            buffer_capacity_frames: 0,
            device_lost: Arc::new(AtomicBool::new(false)),
            volume,
            paused: false,
        }
    }

    pub fn device_lost(&self) -> bool {
        self.device_lost.load(Ordering::SeqCst)
    }
}

impl OutputPlugin for CpalOutput {
    fn init(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn exit(&mut self) {
        self.close();
    }

    fn open(&mut self, format: SampleFormat) -> EngineResult<()> {
        if !format.signed || format.big_endian || format.bits != 16 {
            return Err(EngineError::SampleFormat(format!(
                "cpal backend only accepts 16-bit signed LE PCM, got {format:?}"
            )));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Device("no default output device".to_string()))?;

        let config = StreamConfig {
            channels: format.channels as cpal::ChannelCount,
            sample_rate: cpal::SampleRate(format.rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer_len = ((BUFFER_MS * format.rate as usize) / 1000) * format.channels as usize;
        self.buffer_capacity_frames = buffer_len;
        self.buffer = Arc::new(Mutex::new(VecDeque::with_capacity(buffer_len)));

        let buffer = self.buffer.clone();
        let volume = self.volume.clone();
        let device_lost = self.device_lost.clone();
        let device_lost_for_error = self.device_lost.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let gain = *volume.lock().unwrap() * BASE_VOLUME;
                    let mut buf = buffer.lock().unwrap();
                    for sample in data.iter_mut() {
                        *sample = buf.pop_front().map(|s| s * gain).unwrap_or(0.0);
                    }
                },
                move |err| {
                    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                        device_lost_for_error.store(true, Ordering::SeqCst);
                    }
                },
                None,
            )
            .map_err(|e| EngineError::Device(e.to_string()))?;

        stream.play().map_err(|e| EngineError::Device(e.to_string()))?;

        self.device_lost.store(false, Ordering::SeqCst);
        self.stream = Some(stream);
        self.device = Some(device);
        self.config = Some(config);
        self.format = Some(format);
        self.paused = false;
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
        self.device = None;
        self.config = None;
        self.format = None;
        self.buffer.lock().unwrap().clear();
    }

    fn write(&mut self, buf: &[u8]) -> EngineResult<usize> {
        if self.device_lost() {
            return Err(EngineError::Device("output device lost".to_string()));
        }
        let frame_size = 2; // one i16 sample per channel-interleaved slot
        let mut queue = self.buffer.lock().unwrap();
        let free = self.buffer_capacity_frames.saturating_sub(queue.len());
        let max_samples = free.min(buf.len() / frame_size);

        for i in 0..max_samples {
            let off = i * frame_size;
            let sample = i16::from_le_bytes([buf[off], buf[off + 1]]);
            queue.push_back(sample as f32 / i16::MAX as f32);
        }

        Ok(max_samples * frame_size)
    }

    fn pause(&mut self) {
        self.paused = true;
        if let Some(stream) = &self.stream {
            let _ = stream.pause();
        }
    }

    fn unpause(&mut self) {
        self.paused = false;
        if let Some(stream) = &self.stream {
            let _ = stream.play();
        }
    }

    fn buffer_space(&self) -> isize {
        if self.device_lost() {
            return -1;
        }
        let queue = self.buffer.lock().unwrap();
        (self.buffer_capacity_frames.saturating_sub(queue.len()) * 2) as isize
    }

    fn set_option(&mut self, _key: &str, _value: &str) -> EngineResult<()> {
        Ok(())
    }

    fn get_option(&self, _key: &str) -> Option<String> {
        None
    }
}
