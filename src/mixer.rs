//! Mixer abstraction (spec.md §4.6/C7). cpal exposes no hardware mixer
//! lever the way an ALSA/OSS backend would, so the one built-in `Mixer`,
//! `CpalMixer`, maps `[0, max]` onto software gain applied in
//! `CpalOutput`'s stream callback — the "backend-specific channel
//! selection" spec.md allows for, here resolved as "the only channel
//! cpal actually exposes".

use crate::error::EngineResult;
use std::sync::{Arc, Mutex};

pub trait Mixer: Send {
    fn init(&mut self) -> EngineResult<()>;
    fn exit(&mut self);
    fn open(&mut self, max: u32) -> EngineResult<()>;
    fn close(&mut self);
    fn set_volume(&mut self, value: u32) -> EngineResult<()>;
    fn get_volume(&self) -> u32;
    fn set_option(&mut self, key: &str, value: &str) -> EngineResult<()>;
    fn get_option(&self, key: &str) -> Option<String>;
}

pub struct CpalMixer {
    shared_gain: Arc<Mutex<f32>>,
    max: u32,
    current: u32,
}

impl CpalMixer {
    /// `shared_gain` is the same `Arc<Mutex<f32>>` handed to
    /// `CpalOutput::new` so volume changes take effect on the next sample
    /// the stream callback pulls, with no round trip through the player.
    pub fn new(shared_gain: Arc<Mutex<f32>>) -> Self {
        CpalMixer {
            shared_gain,
            max: 100,
            current: 100,
        }
    }
}

impl Mixer for CpalMixer {
    fn init(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn exit(&mut self) {}

    fn open(&mut self, max: u32) -> EngineResult<()> {
        self.max = max.max(1);
        self.current = self.max;
        *self.shared_gain.lock().unwrap() = 1.0;
        Ok(())
    }

    fn close(&mut self) {}

    fn set_volume(&mut self, value: u32) -> EngineResult<()> {
        self.current = value.min(self.max);
        let gain = self.current as f32 / self.max as f32;
        *self.shared_gain.lock().unwrap() = gain;
        Ok(())
    }

    fn get_volume(&self) -> u32 {
        self.current
    }

    fn set_option(&mut self, _key: &str, _value: &str) -> EngineResult<()> {
        Ok(())
    }

    fn get_option(&self, _key: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_scales_gain_linearly() {
        let gain = Arc::new(Mutex::new(0.0));
        let mut mixer = CpalMixer::new(gain.clone());
        mixer.open(100).unwrap();
        mixer.set_volume(50).unwrap();
        assert_eq!(mixer.get_volume(), 50);
        assert!((*gain.lock().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn volume_clamps_to_max() {
        let gain = Arc::new(Mutex::new(0.0));
        let mut mixer = CpalMixer::new(gain.clone());
        mixer.open(100).unwrap();
        mixer.set_volume(500).unwrap();
        assert_eq!(mixer.get_volume(), 100);
    }
}
