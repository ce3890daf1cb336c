//! Player engine (spec.md §4.7): the producer (decode) and consumer
//! (output) threads, and the `Player` handle a caller drives through
//! `Controls`. Construction returns `(Self, Receiver<PlayerEvent>)` and
//! spawns the decoder thread immediately, built around the full
//! STOPPED/PLAYING/PAUSED state table and producer/consumer split
//! spec.md describes.

pub mod controls;
pub mod types;

use crate::cache::{Comment, TrackInfoCache, TrackInfoRef};
use crate::config::{PlayerConfig, CHUNK_SIZE};
use crate::error::EngineResult;
use crate::input::{Decoder, PluginRegistry};
use crate::mixer::{CpalMixer, Mixer};
use crate::output::{CpalOutput, OutputPlugin};
use crate::ring_buffer::RingBuffer;
use crate::sample_format::SampleFormat;
use crossbeam::channel::RecvTimeoutError;
use reqwest::blocking::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub use controls::Controls;
pub use types::{InternalEvent, PlayerEvent, PlayerStatus, ProgressState};

/// Poll/backoff interval consumer and producer threads use while idle or
/// waiting on the ring buffer; not a hard latency bound, just how often
/// each thread re-checks its condition.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// The ring buffer plus the two condvars producer/consumer wait on, kept
/// separate from `Controls` because it is internal plumbing no caller
/// ever touches directly.
struct RingState {
    buffer: Mutex<RingBuffer>,
    not_full: Condvar,
    not_empty: Condvar,
    /// Set by the producer once the decoder has reported genuine end of
    /// stream; the consumer only emits `TrackEnded`/goes STOPPED once it
    /// also observes the ring buffer empty, so trailing buffered audio
    /// still reaches the output (spec.md §4.7: "Emit end-of-track when
    /// buffer is empty and producer is in EOF state").
    producer_eof: AtomicBool,
}

/// The audio engine: owns the producer and consumer threads and the
/// shared state (`Controls`) a caller drives. Dropping a `Player` signals
/// both threads to exit and flushes the track-info cache to disk.
pub struct Player {
    controls: Controls,
    cache: Arc<TrackInfoCache>,
    mixer: Mutex<Box<dyn Mixer>>,
    running: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl Player {
    /// Builds the engine and spawns its two threads. Returns the player
    /// handle plus the `Receiver<PlayerEvent>` a caller polls (or blocks
    /// on) for track-ended/failure/device notifications.
    pub fn new(config: PlayerConfig) -> EngineResult<(Self, std::sync::mpsc::Receiver<PlayerEvent>)> {
        let client = crate::http::build_client(&config)
            .map_err(|e| crate::error::EngineError::Internal(e.to_string()))?;
        let registry = Arc::new(PluginRegistry::with_defaults());
        let (cache, _outcome) = TrackInfoCache::init(config.cache_file());
        let cache = Arc::new(cache);

        let ring = Arc::new(RingState {
            buffer: Mutex::new(RingBuffer::new(config.chunk_count())),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            producer_eof: AtomicBool::new(false),
        });

        let volume_gain = Arc::new(Mutex::new(1.0f32));
        let controls = Controls::new(volume_gain.clone());
        let (tx, rx) = std::sync::mpsc::channel();
        controls.set_event_sink(tx);

        let sample_format: Arc<RwLock<Option<SampleFormat>>> = Arc::new(RwLock::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let mut mixer = CpalMixer::new(volume_gain.clone());
        mixer.init()?;
        mixer.open(100)?;

        let output = Box::new(CpalOutput::new(volume_gain));

        let producer = {
            let controls = controls.clone();
            let config = config.clone();
            let cache = cache.clone();
            let registry = registry.clone();
            let ring = ring.clone();
            let sample_format = sample_format.clone();
            thread::Builder::new()
                .name("spindle-producer".to_owned())
                .spawn(move || producer_loop(controls, config, cache, registry, client, ring, sample_format))
                .map_err(|e| crate::error::EngineError::Internal(e.to_string()))?
        };

        let consumer = {
            let controls = controls.clone();
            let ring = ring.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("spindle-consumer".to_owned())
                .spawn(move || consumer_loop(controls, ring, running, output, sample_format))
                .map_err(|e| crate::error::EngineError::Internal(e.to_string()))?
        };

        Ok((
            Player {
                controls,
                cache,
                mixer: Mutex::new(Box::new(mixer)),
                running,
                producer: Some(producer),
                consumer: Some(consumer),
            },
            rx,
        ))
    }

    pub fn open(&self, path: impl Into<String>) {
        self.controls.open(path);
    }

    pub fn play(&self) {
        self.controls.play();
    }

    pub fn pause(&self) {
        self.controls.pause();
    }

    pub fn stop(&self) {
        self.controls.stop();
    }

    pub fn seek(&self, seconds: f64) {
        self.controls.seek(seconds);
    }

    pub fn status(&self) -> PlayerStatus {
        self.controls.status()
    }

    pub fn progress(&self) -> ProgressState {
        self.controls.progress()
    }

    pub fn track_info(&self) -> Option<TrackInfoRef> {
        self.controls.track_info()
    }

    /// The current Icy `StreamTitle` for a live stream, if one has been
    /// received (spec.md §4.3/§4.7); `None` for local files or streams
    /// without inline metadata.
    pub fn stream_title(&self) -> Option<String> {
        self.controls.stream_title()
    }

    /// Polls and clears the metadata-changed flag (spec.md §4.7's
    /// caller-polled Icy title-change signal).
    pub fn take_metadata_changed(&self) -> bool {
        let changed = self.controls.metadata_changed();
        if changed {
            self.controls.set_metadata_changed(false);
        }
        changed
    }

    pub fn set_volume(&self, percent: u32) {
        let mut mixer = self.mixer.lock().unwrap();
        let _ = mixer.set_volume(percent);
    }

    pub fn get_volume(&self) -> u32 {
        self.mixer.lock().unwrap().get_volume()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.controls.shutdown();
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.consumer.take() {
            let _ = handle.join();
        }
        if let Err(e) = self.cache.close() {
            log::warn!("failed to flush track-info cache: {e}");
        }
    }
}

/// Opens `path` through C4, then resolves its `TrackInfo` through C5,
/// reusing the just-opened decoder to answer the cache's decode closure
/// instead of opening the file a second time.
fn open_and_cache(
    path: &str,
    config: &PlayerConfig,
    registry: &PluginRegistry,
    client: &Client,
    cache: &TrackInfoCache,
) -> EngineResult<(Decoder, TrackInfoRef)> {
    let mut decoder = Decoder::new(path);
    decoder.open(config, registry, client)?;

    let info = cache.get(path, |_| -> EngineResult<(i32, Vec<Comment>)> {
        let duration = decoder.duration();
        let comments = decoder.read_tags()?;
        Ok((duration, comments))
    })?;

    Ok((decoder, info))
}

/// Frame size of the bytes actually handed to the output: C1 normalizes
/// any convertible source (<=16 bit, <=2 channels) to 16-bit stereo, so
/// those always write 4-byte frames regardless of the source's own
/// channel count; non-convertible sources pass through at their native
/// frame size (spec.md §4.1).
fn output_frame_size(format: SampleFormat) -> usize {
    if format.is_convertible() {
        4
    } else {
        format.frame_size().max(1)
    }
}

/// Seconds of audio represented by `bytes` actually written to the output
/// at `format`'s rate.
fn seconds_for_bytes(format: SampleFormat, bytes: usize) -> f64 {
    bytes as f64 / output_frame_size(format) as f64 / format.rate as f64
}

fn producer_loop(
    controls: Controls,
    config: PlayerConfig,
    cache: Arc<TrackInfoCache>,
    registry: Arc<PluginRegistry>,
    client: Client,
    ring: Arc<RingState>,
    sample_format: Arc<RwLock<Option<SampleFormat>>>,
) {
    let mut decoder: Option<Decoder> = None;

    loop {
        let event = {
            let guard = controls.event_handler();
            guard.1.recv_timeout(IDLE_POLL)
        };

        match event {
            Ok(InternalEvent::Shutdown) => break,
            Ok(InternalEvent::Open(path)) => {
                decoder = None;
                *sample_format.write().unwrap() = None;
                reset_ring(&ring);
                controls.set_status(PlayerStatus::Stopped);

                match open_and_cache(&path, &config, &registry, &client, &cache) {
                    Ok((opened, info)) => {
                        let fmt = opened.sample_format();
                        *sample_format.write().unwrap() = fmt;
                        controls.set_track_info(Some(info));
                        controls.set_progress(ProgressState {
                            position: 0.0,
                            duration: -1,
                        });
                        decoder = Some(opened);
                        controls.set_http_error(None);
                        controls.set_status(PlayerStatus::Playing);
                    }
                    Err(e) => {
                        controls.set_http_error(Some(e.to_string()));
                        controls.emit(PlayerEvent::from(&e));
                        controls.set_status(PlayerStatus::Stopped);
                    }
                }
            }
            Ok(InternalEvent::Play) => {
                if controls.status() == PlayerStatus::Paused {
                    controls.set_status(PlayerStatus::Playing);
                }
            }
            Ok(InternalEvent::Pause) => {
                if controls.status() == PlayerStatus::Playing {
                    controls.set_status(PlayerStatus::Paused);
                }
            }
            Ok(InternalEvent::Stop) => {
                decoder = None;
                *sample_format.write().unwrap() = None;
                reset_ring(&ring);
                controls.set_status(PlayerStatus::Stopped);
            }
            Ok(InternalEvent::Seek(seconds)) => {
                if let Some(dec) = decoder.as_mut() {
                    match dec.seek(seconds) {
                        Ok(()) => {
                            reset_ring(&ring);
                            let mut progress = controls.progress();
                            progress.position = seconds;
                            controls.set_progress(progress);
                        }
                        Err(e) => controls.emit(PlayerEvent::from(&e)),
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if controls.status() != PlayerStatus::Playing {
            continue;
        }
        let Some(dec) = decoder.as_mut() else {
            continue;
        };

        if let Some(title) = dec.poll_metadata_changed() {
            controls.set_stream_title(title);
            controls.emit(PlayerEvent::MetadataChanged);
        }

        let mut local = [0u8; CHUNK_SIZE];
        let n = match dec.read(&mut local) {
            Ok(0) => {
                // Genuine end of stream: stop reading but leave the
                // sample format and PLAYING status alone so the consumer
                // keeps draining whatever is still buffered. The consumer
                // is the one that transitions to STOPPED and emits
                // `TrackEnded`, once `reserve_read` reports empty with
                // this flag set (spec.md §4.7).
                decoder = None;
                ring.producer_eof.store(true, Ordering::SeqCst);
                ring.not_empty.notify_all();
                continue;
            }
            Ok(n) => n,
            Err(e) => {
                decoder = None;
                *sample_format.write().unwrap() = None;
                ring.producer_eof.store(false, Ordering::SeqCst);
                controls.set_http_error(Some(e.to_string()));
                controls.emit(PlayerEvent::Failed(e.to_string()));
                controls.set_status(PlayerStatus::Stopped);
                continue;
            }
        };

        let mut pos = 0;
        while pos < n && controls.status() == PlayerStatus::Playing {
            let mut guard = ring.buffer.lock().unwrap();
            match guard.reserve_write() {
                Some((buf, free)) => {
                    let take = free.min(n - pos);
                    buf[..take].copy_from_slice(&local[pos..pos + take]);
                    guard.commit(take);
                    pos += take;
                    drop(guard);
                    ring.not_empty.notify_all();
                }
                None => {
                    let _ = ring.not_full.wait_timeout(guard, IDLE_POLL).unwrap();
                }
            }
        }
    }
}

fn reset_ring(ring: &RingState) {
    let mut guard = ring.buffer.lock().unwrap();
    guard.reset();
    drop(guard);
    ring.producer_eof.store(false, Ordering::SeqCst);
    ring.not_full.notify_all();
    ring.not_empty.notify_all();
}

fn consumer_loop(
    controls: Controls,
    ring: Arc<RingState>,
    running: Arc<AtomicBool>,
    mut output: Box<dyn OutputPlugin>,
    sample_format: Arc<RwLock<Option<SampleFormat>>>,
) {
    let _ = output.init();
    let mut current_format: Option<SampleFormat> = None;
    let mut device_failed_once = false;

    while running.load(Ordering::SeqCst) {
        let target = *sample_format.read().unwrap();
        if target != current_format {
            output.close();
            current_format = match target {
                Some(fmt) => match output.open(fmt) {
                    Ok(()) => {
                        device_failed_once = false;
                        Some(fmt)
                    }
                    Err(e) => {
                        controls.emit(PlayerEvent::DeviceError(e.to_string()));
                        controls.set_status(PlayerStatus::Stopped);
                        None
                    }
                },
                None => None,
            };
        }

        let Some(fmt) = current_format else {
            thread::sleep(IDLE_POLL);
            continue;
        };

        if controls.status() != PlayerStatus::Playing {
            output.pause();
            thread::sleep(IDLE_POLL);
            continue;
        }
        output.unpause();

        let mut local = Vec::new();
        {
            let mut guard = ring.buffer.lock().unwrap();
            match guard.reserve_read() {
                Some((slice, n)) => {
                    local.extend_from_slice(&slice[..n]);
                    guard.consume(n);
                    drop(guard);
                    ring.not_full.notify_all();
                }
                None => {
                    // Buffer drained. Only genuine end-of-track if the
                    // producer has also hit EOF; otherwise this is an
                    // ordinary underrun and we just wait for more.
                    if ring.producer_eof.swap(false, Ordering::SeqCst) {
                        drop(guard);
                        *sample_format.write().unwrap() = None;
                        controls.set_status(PlayerStatus::Stopped);
                        controls.emit(PlayerEvent::TrackEnded);
                        continue;
                    }
                    let _ = ring.not_empty.wait_timeout(guard, IDLE_POLL).unwrap();
                    continue;
                }
            }
        }

        let mut written = 0;
        while written < local.len() {
            match output.write(&local[written..]) {
                Ok(0) => {
                    // Device buffer momentarily full; not an error.
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(n) => {
                    written += n;
                    device_failed_once = false;
                }
                Err(e) => {
                    if device_failed_once {
                        controls.emit(PlayerEvent::DeviceError(e.to_string()));
                        controls.set_status(PlayerStatus::Stopped);
                        current_format = None;
                        break;
                    }
                    device_failed_once = true;
                    output.close();
                    let _ = output.open(fmt);
                    break;
                }
            }
        }

        if written > 0 {
            let mut progress = controls.progress();
            progress.position += seconds_for_bytes(fmt, written);
            controls.set_progress(progress);
        }
    }

    output.close();
    output.exit();
}
