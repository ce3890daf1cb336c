//! Concurrent decode -> ring buffer -> output playback engine.
//!
//! `Player::new` spawns the producer (decoder -> ring buffer) and consumer
//! (ring buffer -> output) threads and returns a handle plus an event
//! receiver; callers drive playback through [`player::Controls`] (reachable
//! via the handle's `open`/`play`/`pause`/`stop`/`seek` methods) and poll
//! [`player::PlayerEvent`]s for track-ended/failure/device notifications.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod input;
pub mod mixer;
pub mod output;
pub mod player;
pub mod ring_buffer;
pub mod sample_format;

pub use cache::{Comment, TrackInfo, TrackInfoCache, TrackInfoRef};
pub use config::PlayerConfig;
pub use error::{EngineError, EngineResult};
pub use player::{Controls, Player, PlayerEvent, PlayerStatus};
pub use ring_buffer::RingBuffer;
pub use sample_format::SampleFormat;
