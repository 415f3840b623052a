//! Configuration for the assistant
//!
//! Every section has defaults, so an empty file (or no file) gives the stock
//! timings of the interface. Files are TOML:
//!
//! ```toml
//! [timing]
//! capture_window_ms = 2000
//!
//! [voice]
//! rate = 0.8
//!
//! [engine]
//! kind = "simulated"
//!
//! [assistant]
//! volunteers = ["Juan Pérez", "Ana Torres"]
//! ```

use crate::speech::{NullEngine, SimulatedEngine, SpeechEngine, UtteranceRequest};
use crate::{KusiError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for the complete assistant
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Fixed durations of the interaction cycle
    pub timing: TimingConfig,

    /// Utterance parameters
    pub voice: VoiceConfig,

    /// Which speech engine backs the wrapper
    pub engine: EngineConfig,

    /// Interpreter and help-desk settings
    pub assistant: AssistantSection,
}

/// Fixed durations, all in milliseconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before the startup greeting appears
    pub greeting_delay_ms: u64,
    /// How long the startup greeting blocks push-to-talk
    pub greeting_duration_ms: u64,
    /// Capture window after push-to-talk
    pub capture_window_ms: u64,
    /// Informational answers stay on screen this long
    pub info_display_ms: u64,
    /// Simulated call duration
    pub call_duration_ms: u64,
    pub call_ended_display_ms: u64,
    pub cancel_display_ms: u64,
    pub medication_display_ms: u64,
    /// Delay before a help request is connected to a volunteer
    pub help_connect_delay_ms: u64,
    pub help_connected_display_ms: u64,
    pub greeting_repeat_display_ms: u64,
    /// Added to every display duration while voice output is unavailable
    pub fallback_extension_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            greeting_delay_ms: 1000,
            greeting_duration_ms: 5000,
            capture_window_ms: 2000,
            info_display_ms: 4000,
            call_duration_ms: 5000,
            call_ended_display_ms: 2000,
            cancel_display_ms: 2000,
            medication_display_ms: 2000,
            help_connect_delay_ms: 3000,
            help_connected_display_ms: 3000,
            greeting_repeat_display_ms: 6000,
            fallback_extension_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn greeting_delay(&self) -> Duration {
        Duration::from_millis(self.greeting_delay_ms)
    }

    pub fn greeting_duration(&self) -> Duration {
        Duration::from_millis(self.greeting_duration_ms)
    }

    pub fn capture_window(&self) -> Duration {
        Duration::from_millis(self.capture_window_ms)
    }

    pub fn info_display(&self) -> Duration {
        Duration::from_millis(self.info_display_ms)
    }

    pub fn call_duration(&self) -> Duration {
        Duration::from_millis(self.call_duration_ms)
    }

    pub fn call_ended_display(&self) -> Duration {
        Duration::from_millis(self.call_ended_display_ms)
    }

    pub fn cancel_display(&self) -> Duration {
        Duration::from_millis(self.cancel_display_ms)
    }

    pub fn medication_display(&self) -> Duration {
        Duration::from_millis(self.medication_display_ms)
    }

    pub fn help_connect_delay(&self) -> Duration {
        Duration::from_millis(self.help_connect_delay_ms)
    }

    pub fn help_connected_display(&self) -> Duration {
        Duration::from_millis(self.help_connected_display_ms)
    }

    pub fn greeting_repeat_display(&self) -> Duration {
        Duration::from_millis(self.greeting_repeat_display_ms)
    }

    pub fn fallback_extension(&self) -> Duration {
        Duration::from_millis(self.fallback_extension_ms)
    }
}

/// Utterance parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// BCP 47 language tag
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Slower rate used for the greeting
    pub greeting_rate: f32,
    /// Delay between cancelling the engine and submitting the next utterance
    pub settle_delay_ms: u64,
    /// Speak the startup greeting instead of only showing it
    pub speak_startup_greeting: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: "es-ES".to_string(),
            rate: 0.8,
            pitch: 1.0,
            volume: 1.0,
            greeting_rate: 0.7,
            settle_delay_ms: 100,
            speak_startup_greeting: false,
        }
    }
}

impl VoiceConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Build an utterance for `text` at the given rate
    pub fn utterance(&self, text: &str, rate: f32) -> Result<UtteranceRequest> {
        UtteranceRequest::builder(text)
            .language(self.language.clone())
            .rate(rate)
            .pitch(self.pitch)
            .volume(self.volume)
            .build()
    }
}

/// Speech engine selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Timed in-process engine
    #[default]
    Simulated,
    /// No speech synthesis; subtitles only
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Simulated speaking speed at rate 1.0
    pub ms_per_char: u64,
    /// Raw engine code every utterance fails with
    pub fail_with: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Simulated,
            ms_per_char: 60,
            fail_with: None,
        }
    }
}

impl EngineConfig {
    /// Instantiate the configured engine
    pub fn build_engine(&self) -> Box<dyn SpeechEngine> {
        match self.kind {
            EngineKind::Simulated => {
                let engine = SimulatedEngine::new(self.ms_per_char);
                match &self.fail_with {
                    Some(code) => Box::new(engine.failing_with(code.clone())),
                    None => Box::new(engine),
                }
            }
            EngineKind::None => Box::new(NullEngine),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSection {
    /// Volunteer roster, assigned round-robin to help requests
    pub volunteers: Vec<String>,
    /// Interpreter seed; entropy when absent
    pub seed: Option<u64>,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            volunteers: vec!["Juan Pérez".to_string()],
            seed: None,
        }
    }
}

impl AssistantConfig {
    /// Load and validate a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            KusiError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            KusiError::ConfigError(msg) => {
                KusiError::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AssistantConfig = toml::from_str(content)
            .map_err(|e| KusiError::ConfigError(format!("Failed to parse: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the capture window
    pub fn with_capture_window(mut self, window: Duration) -> Self {
        self.timing.capture_window_ms = window.as_millis() as u64;
        self
    }

    /// Set the interpreter seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.assistant.seed = Some(seed);
        self
    }

    /// Replace the volunteer roster
    pub fn with_volunteers<I, S>(mut self, volunteers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assistant.volunteers = volunteers.into_iter().map(Into::into).collect();
        self
    }

    /// Use the simulated engine at the given speed
    pub fn with_simulated_engine(mut self, ms_per_char: u64) -> Self {
        self.engine.kind = EngineKind::Simulated;
        self.engine.ms_per_char = ms_per_char;
        self
    }

    /// Subtitles only
    pub fn without_voice(mut self) -> Self {
        self.engine.kind = EngineKind::None;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timing.capture_window_ms == 0 {
            return Err(KusiError::ConfigError(
                "capture_window_ms must be greater than zero".to_string(),
            ));
        }

        let voice = &self.voice;
        if voice.language.trim().is_empty() {
            return Err(KusiError::ConfigError(
                "voice.language must not be empty".to_string(),
            ));
        }
        for (name, rate) in [("rate", voice.rate), ("greeting_rate", voice.greeting_rate)] {
            if !(0.1..=10.0).contains(&rate) {
                return Err(KusiError::ConfigError(format!(
                    "voice.{} {} outside 0.1..=10",
                    name, rate
                )));
            }
        }
        if !(0.0..=2.0).contains(&voice.pitch) {
            return Err(KusiError::ConfigError(format!(
                "voice.pitch {} outside 0..=2",
                voice.pitch
            )));
        }
        if !(0.0..=1.0).contains(&voice.volume) {
            return Err(KusiError::ConfigError(format!(
                "voice.volume {} outside 0..=1",
                voice.volume
            )));
        }

        if self.engine.kind == EngineKind::Simulated && self.engine.ms_per_char == 0 {
            return Err(KusiError::ConfigError(
                "engine.ms_per_char must be greater than zero".to_string(),
            ));
        }

        if self.assistant.volunteers.is_empty()
            || self
                .assistant
                .volunteers
                .iter()
                .any(|name| name.trim().is_empty())
        {
            return Err(KusiError::ConfigError(
                "assistant.volunteers must list at least one named volunteer".to_string(),
            ));
        }

        Ok(())
    }
}
