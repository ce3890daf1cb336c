//! Shared player state: a `getset_atomic_bool!`-style macro for simple
//! flags, a `crossbeam::channel::unbounded` event handler carrying
//! commands to the producer thread, and a `player_event_sender` out to the
//! caller. Status is the full STOPPED/PLAYING/PAUSED `PlayerStatus` state
//! table spec.md §4.7 calls for, with `Seek` among the producer commands.

use super::types::{InternalEvent, PlayerEvent, PlayerStatus, ProgressState};
use crate::cache::TrackInfoRef;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

macro_rules! getset_atomic_bool {
    ($name:ident, $setter_name:ident) => {
        pub fn $name(&self) -> bool {
            self.$name.load(Ordering::SeqCst)
        }

        pub fn $setter_name(&self, value: bool) {
            self.$name.store(value, Ordering::SeqCst);
        }
    };
}

type EventHandler = (Sender<InternalEvent>, Receiver<InternalEvent>);

#[derive(Clone)]
pub struct Controls {
    event_handler: Arc<RwLock<EventHandler>>,
    status: Arc<RwLock<PlayerStatus>>,
    metadata_changed: Arc<AtomicBool>,
    track_info: Arc<RwLock<Option<TrackInfoRef>>>,
    stream_title: Arc<RwLock<Option<String>>>,
    http_error: Arc<RwLock<Option<String>>>,
    progress: Arc<RwLock<ProgressState>>,
    /// Shared with the output's mixer so volume changes apply with no
    /// round trip through the player threads.
    volume_gain: Arc<Mutex<f32>>,

    player_event_sender: Arc<Mutex<Option<std::sync::mpsc::Sender<PlayerEvent>>>>,
}

impl Controls {
    pub fn new(volume_gain: Arc<Mutex<f32>>) -> Self {
        Controls {
            event_handler: Arc::new(RwLock::new(unbounded())),
            status: Arc::new(RwLock::new(PlayerStatus::Stopped)),
            metadata_changed: Arc::new(AtomicBool::new(false)),
            track_info: Arc::new(RwLock::new(None)),
            stream_title: Arc::new(RwLock::new(None)),
            http_error: Arc::new(RwLock::new(None)),
            progress: Arc::new(RwLock::new(ProgressState::default())),
            volume_gain,
            player_event_sender: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_event_sink(&self, sender: std::sync::mpsc::Sender<PlayerEvent>) {
        *self.player_event_sender.lock().unwrap() = Some(sender);
    }

    pub(crate) fn event_handler(&self) -> RwLockReadGuard<'_, EventHandler> {
        self.event_handler.read().unwrap()
    }

    pub(crate) fn send_internal(&self, event: InternalEvent) {
        let _ = self.event_handler().0.send(event);
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        if let Some(sender) = self.player_event_sender.lock().unwrap().as_ref() {
            let _ = sender.send(event);
        }
    }

    getset_atomic_bool!(metadata_changed, set_metadata_changed);

    pub fn status(&self) -> PlayerStatus {
        *self.status.read().unwrap()
    }

    pub(crate) fn set_status(&self, value: PlayerStatus) {
        *self.status.write().unwrap() = value;
    }

    pub fn track_info(&self) -> Option<TrackInfoRef> {
        self.track_info.read().unwrap().clone()
    }

    pub(crate) fn set_track_info(&self, value: Option<TrackInfoRef>) {
        *self.track_info.write().unwrap() = value;
        *self.stream_title.write().unwrap() = None;
        self.set_metadata_changed(true);
    }

    /// The current Icy `StreamTitle` for a live stream, if any has been
    /// received yet (spec.md §4.3/§4.7).
    pub fn stream_title(&self) -> Option<String> {
        self.stream_title.read().unwrap().clone()
    }

    pub(crate) fn set_stream_title(&self, title: String) {
        *self.stream_title.write().unwrap() = Some(title);
        self.set_metadata_changed(true);
    }

    pub fn http_error(&self) -> Option<String> {
        self.http_error.read().unwrap().clone()
    }

    pub(crate) fn set_http_error(&self, value: Option<String>) {
        *self.http_error.write().unwrap() = value;
    }

    pub fn progress(&self) -> ProgressState {
        *self.progress.read().unwrap()
    }

    pub(crate) fn set_progress(&self, value: ProgressState) {
        *self.progress.write().unwrap() = value;
    }

    pub fn volume(&self) -> f32 {
        *self.volume_gain.lock().unwrap()
    }

    pub fn set_volume(&self, value: f32) {
        *self.volume_gain.lock().unwrap() = value.clamp(0.0, 1.0);
    }

    pub fn open(&self, path: impl Into<String>) {
        self.send_internal(InternalEvent::Open(path.into()));
    }

    pub fn play(&self) {
        self.send_internal(InternalEvent::Play);
    }

    pub fn pause(&self) {
        self.send_internal(InternalEvent::Pause);
    }

    pub fn stop(&self) {
        self.send_internal(InternalEvent::Stop);
    }

    pub fn seek(&self, seconds: f64) {
        self.send_internal(InternalEvent::Seek(seconds));
    }

    pub fn shutdown(&self) {
        self.send_internal(InternalEvent::Shutdown);
    }
}
