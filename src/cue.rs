//! Audio cues and narration.
//!
//! The pipeline hands the top detection's label to a [`CueDispatcher`] and
//! never looks back: nothing here can fail into the loop. Unknown labels are
//! skipped, playback errors are swallowed, and a missing speech engine is a
//! logged warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

/// Fire-and-forget consumer of detection labels.
pub trait CueDispatcher: Send {
    fn dispatch(&self, label: &str);
}

/// Plays a sound asset. Failures are reported but never propagated past
/// [`Announcer`].
pub trait CuePlayer: Send {
    fn play(&self, asset: &Path, volume: f32) -> Result<()>;
}

/// Text-to-speech engine.
pub trait SpeechEngine: Send {
    fn speak(&self, utterance: &Utterance) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

/// Default label → sound asset mapping.
pub fn default_cue_map() -> HashMap<String, PathBuf> {
    [
        ("person", "/sounds/person.mp3"),
        ("car", "/sounds/car.mp3"),
        ("dog", "/sounds/dog.mp3"),
    ]
    .into_iter()
    .map(|(label, path)| (label.to_string(), PathBuf::from(path)))
    .collect()
}

/// Player that only logs what it would play. Used when no audio output exists.
#[derive(Default)]
pub struct LogPlayer;

impl CuePlayer for LogPlayer {
    fn play(&self, asset: &Path, volume: f32) -> Result<()> {
        log::info!("cue: {} (volume {:.1})", asset.display(), volume);
        Ok(())
    }
}

/// Cue dispatcher combining asset playback and optional narration.
pub struct Announcer {
    cues: HashMap<String, PathBuf>,
    player: Box<dyn CuePlayer>,
    volume: f32,
    speech: Option<Box<dyn SpeechEngine>>,
    narrate: bool,
}

impl Announcer {
    pub fn new(cues: HashMap<String, PathBuf>, player: Box<dyn CuePlayer>) -> Self {
        Self {
            cues,
            player,
            volume: 0.4,
            speech: None,
            narrate: false,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Speak each dispatched label. `engine = None` models a runtime without
    /// speech support.
    pub fn with_narration(mut self, engine: Option<Box<dyn SpeechEngine>>) -> Self {
        self.speech = engine;
        self.narrate = true;
        self
    }

    pub fn play_cue(&self, label: &str) {
        let Some(asset) = self.cues.get(label) else {
            return;
        };
        if let Err(e) = self.player.play(asset, self.volume) {
            log::debug!("cue playback for {} suppressed: {:#}", label, e);
        }
    }

    pub fn speak(&self, text: &str) {
        let Some(engine) = &self.speech else {
            log::warn!("speech synthesis not supported; dropping {:?}", text);
            return;
        };
        if let Err(e) = engine.speak(&Utterance::new(text)) {
            log::debug!("speech for {:?} suppressed: {:#}", text, e);
        }
    }
}

impl CueDispatcher for Announcer {
    fn dispatch(&self, label: &str) {
        self.play_cue(label);
        if self.narrate {
            self.speak(label);
        }
    }
}
