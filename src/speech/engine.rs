//! Platform speech-engine seam
//!
//! The wrapper in [`super::tts`] talks to the audio engine only through the
//! [`SpeechEngine`] trait. Engines report playback lifecycle asynchronously by
//! sending [`EngineEvent`]s into the sink handed to them in
//! [`SpeechEngine::attach`]; failures carry the engine's raw error code, which
//! the wrapper classifies.

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

/// Raw error codes reported by platform speech engines
pub mod codes {
    pub const NOT_ALLOWED: &str = "not-allowed";
    pub const INTERRUPTED: &str = "interrupted";
    pub const CANCELED: &str = "canceled";
    pub const AUDIO_BUSY: &str = "audio-busy";
    pub const AUDIO_HARDWARE: &str = "audio-hardware";
    pub const NETWORK: &str = "network";
    pub const SYNTHESIS_UNAVAILABLE: &str = "synthesis-unavailable";
    pub const SYNTHESIS_FAILED: &str = "synthesis-failed";
    pub const LANGUAGE_UNAVAILABLE: &str = "language-unavailable";
    pub const VOICE_UNAVAILABLE: &str = "voice-unavailable";
    pub const TEXT_TOO_LONG: &str = "text-too-long";
    pub const INVALID_ARGUMENT: &str = "invalid-argument";

    /// Every code a conforming engine may report
    pub const ALL: [&str; 12] = [
        NOT_ALLOWED,
        INTERRUPTED,
        CANCELED,
        AUDIO_BUSY,
        AUDIO_HARDWARE,
        NETWORK,
        SYNTHESIS_UNAVAILABLE,
        SYNTHESIS_FAILED,
        LANGUAGE_UNAVAILABLE,
        VOICE_UNAVAILABLE,
        TEXT_TOO_LONG,
        INVALID_ARGUMENT,
    ];
}

/// Utterance as handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub struct EngineUtterance {
    /// Identifier echoed back in lifecycle events
    pub id: Uuid,
    /// Text to synthesize (already normalized for speech)
    pub text: String,
    /// BCP 47 language tag
    pub language: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Playback lifecycle notification from the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Audio output for the utterance began
    Started(Uuid),

    /// The utterance played to completion
    Ended(Uuid),

    /// The utterance failed or was cancelled
    Failed {
        /// Utterance the failure belongs to
        id: Uuid,
        /// Raw engine error code
        code: String,
    },
}

impl EngineEvent {
    /// Utterance this event refers to
    pub fn utterance_id(&self) -> Uuid {
        match self {
            EngineEvent::Started(id) | EngineEvent::Ended(id) => *id,
            EngineEvent::Failed { id, .. } => *id,
        }
    }
}

/// Channel end engines push lifecycle events into
pub type EngineEventSink = Sender<EngineEvent>;

/// Platform speech-synthesis capability
pub trait SpeechEngine: Send {
    /// Whether the platform offers speech synthesis at all
    fn is_available(&self) -> bool;

    /// Register the sink lifecycle events are delivered to
    fn attach(&mut self, sink: EngineEventSink);

    /// Whether an utterance is currently producing audio (or is paused mid-way)
    fn is_speaking(&self) -> bool;

    /// Whether utterances are queued behind the current one
    fn is_pending(&self) -> bool;

    /// Queue an utterance. An `Err` carries the raw code of a synchronous start failure.
    fn speak(&mut self, utterance: &EngineUtterance) -> std::result::Result<(), String>;

    /// Drop the current and all queued utterances
    fn cancel(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Advance the engine's notion of time
    fn tick(&mut self, _now: Duration) {}

    /// Next instant at which the engine will emit an event on its own
    fn next_deadline(&self) -> Option<Duration> {
        None
    }
}

/// Engine for platforms without speech synthesis
#[derive(Debug, Default)]
pub struct NullEngine;

impl SpeechEngine for NullEngine {
    fn is_available(&self) -> bool {
        false
    }

    fn attach(&mut self, _sink: EngineEventSink) {}

    fn is_speaking(&self) -> bool {
        false
    }

    fn is_pending(&self) -> bool {
        false
    }

    fn speak(&mut self, _utterance: &EngineUtterance) -> std::result::Result<(), String> {
        Err(codes::SYNTHESIS_UNAVAILABLE.to_string())
    }

    fn cancel(&mut self) {}

    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

#[derive(Debug)]
struct SimulatedUtterance {
    id: Uuid,
    length: Duration,
}

#[derive(Debug)]
struct ActiveUtterance {
    id: Uuid,
    /// `None` while paused
    ends_at: Option<Duration>,
    remaining: Duration,
}

/// Engine that "speaks" for a duration proportional to text length
///
/// Lifecycle events are emitted from [`SpeechEngine::tick`], never from inside
/// `speak`, the way a real engine reports asynchronously.
#[derive(Debug)]
pub struct SimulatedEngine {
    ms_per_char: u64,
    fail_with: Option<String>,
    sink: Option<EngineEventSink>,
    now: Duration,
    active: Option<ActiveUtterance>,
    queue: VecDeque<SimulatedUtterance>,
}

impl SimulatedEngine {
    /// Create an engine speaking at `ms_per_char` at rate 1.0
    pub fn new(ms_per_char: u64) -> Self {
        Self {
            ms_per_char,
            fail_with: None,
            sink: None,
            now: Duration::ZERO,
            active: None,
            queue: VecDeque::new(),
        }
    }

    /// Fail every utterance with the given raw code when it would start
    pub fn failing_with(mut self, code: impl Into<String>) -> Self {
        self.fail_with = Some(code.into());
        self
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(event);
        }
    }

    fn length_of(&self, utterance: &EngineUtterance) -> Duration {
        let chars = utterance.text.chars().count() as f64;
        let ms = chars * self.ms_per_char as f64 / f64::from(utterance.rate.max(0.1));
        Duration::from_millis(ms.max(1.0) as u64)
    }
}

impl SpeechEngine for SimulatedEngine {
    fn is_available(&self) -> bool {
        true
    }

    fn attach(&mut self, sink: EngineEventSink) {
        self.sink = Some(sink);
    }

    fn is_speaking(&self) -> bool {
        self.active.is_some()
    }

    fn is_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    fn speak(&mut self, utterance: &EngineUtterance) -> std::result::Result<(), String> {
        let length = self.length_of(utterance);
        trace!("Simulated engine queued {} ({:?})", utterance.id, length);
        self.queue.push_back(SimulatedUtterance {
            id: utterance.id,
            length,
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            self.emit(EngineEvent::Failed {
                id: active.id,
                code: codes::INTERRUPTED.to_string(),
            });
        }
        while let Some(queued) = self.queue.pop_front() {
            self.emit(EngineEvent::Failed {
                id: queued.id,
                code: codes::CANCELED.to_string(),
            });
        }
    }

    fn pause(&mut self) {
        let now = self.now;
        if let Some(active) = self.active.as_mut() {
            if let Some(ends_at) = active.ends_at.take() {
                active.remaining = ends_at.saturating_sub(now);
            }
        }
    }

    fn resume(&mut self) {
        let now = self.now;
        if let Some(active) = self.active.as_mut() {
            if active.ends_at.is_none() {
                active.ends_at = Some(now + active.remaining);
            }
        }
    }

    fn tick(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }

        loop {
            if let Some(active) = &self.active {
                match active.ends_at {
                    Some(ends_at) if ends_at <= self.now => {
                        let id = active.id;
                        self.active = None;
                        self.emit(EngineEvent::Ended(id));
                    }
                    _ => break,
                }
            }

            let Some(next) = self.queue.pop_front() else {
                break;
            };

            if let Some(code) = self.fail_with.clone() {
                debug!("Simulated engine failing {} with {}", next.id, code);
                self.emit(EngineEvent::Failed { id: next.id, code });
                continue;
            }

            self.emit(EngineEvent::Started(next.id));
            self.active = Some(ActiveUtterance {
                id: next.id,
                ends_at: Some(self.now + next.length),
                remaining: next.length,
            });
        }
    }

    fn next_deadline(&self) -> Option<Duration> {
        match &self.active {
            Some(active) => active.ends_at,
            None if !self.queue.is_empty() => Some(self.now),
            None => None,
        }
    }
}

/// A call made by the wrapper into a [`ScriptedEngine`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineCall {
    Speak { id: Uuid, text: String },
    Cancel,
    Pause,
    Resume,
}

#[derive(Debug, Default)]
struct ScriptedState {
    calls: Vec<EngineCall>,
    current: Option<Uuid>,
    speaking: bool,
    pending: bool,
    fail_next_speak: Option<String>,
    sink: Option<EngineEventSink>,
}

impl ScriptedState {
    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(event);
        }
    }
}

/// Engine driven by hand through a [`ScriptedEngineProbe`]
///
/// Records every call it receives; lifecycle events are only emitted when the
/// probe asks for them, except `cancel`, which interrupts like a real engine.
#[derive(Debug)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptedState>>,
}

/// Test-side handle of a [`ScriptedEngine`]
#[derive(Clone, Debug)]
pub struct ScriptedEngineProbe {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedEngine {
    /// Create an engine and the probe that controls it
    pub fn new() -> (Self, ScriptedEngineProbe) {
        let state = Arc::new(Mutex::new(ScriptedState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptedEngineProbe { state },
        )
    }
}

impl SpeechEngine for ScriptedEngine {
    fn is_available(&self) -> bool {
        true
    }

    fn attach(&mut self, sink: EngineEventSink) {
        self.state.lock().sink = Some(sink);
    }

    fn is_speaking(&self) -> bool {
        self.state.lock().speaking
    }

    fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    fn speak(&mut self, utterance: &EngineUtterance) -> std::result::Result<(), String> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Speak {
            id: utterance.id,
            text: utterance.text.clone(),
        });
        if let Some(code) = state.fail_next_speak.take() {
            return Err(code);
        }
        state.current = Some(utterance.id);
        state.pending = true;
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Cancel);
        if state.speaking || state.pending {
            if let Some(id) = state.current {
                state.emit(EngineEvent::Failed {
                    id,
                    code: codes::INTERRUPTED.to_string(),
                });
            }
        }
        state.speaking = false;
        state.pending = false;
    }

    fn pause(&mut self) {
        self.state.lock().calls.push(EngineCall::Pause);
    }

    fn resume(&mut self) {
        self.state.lock().calls.push(EngineCall::Resume);
    }
}

impl ScriptedEngineProbe {
    /// Every call the engine received, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Texts passed to `speak`, in order
    pub fn spoken_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Speak { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Id of the most recently submitted utterance
    pub fn current(&self) -> Option<Uuid> {
        self.state.lock().current
    }

    /// Make the next `speak` call fail synchronously with `code`
    pub fn fail_next_speak(&self, code: impl Into<String>) {
        self.state.lock().fail_next_speak = Some(code.into());
    }

    /// Start playback of the current utterance
    pub fn start(&self) {
        let mut state = self.state.lock();
        if let Some(id) = state.current {
            state.pending = false;
            state.speaking = true;
            state.emit(EngineEvent::Started(id));
        }
    }

    /// Finish playback of the current utterance
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if let Some(id) = state.current {
            state.pending = false;
            state.speaking = false;
            state.emit(EngineEvent::Ended(id));
        }
    }

    /// Fail the current utterance with a raw engine code
    pub fn fail(&self, code: &str) {
        let mut state = self.state.lock();
        if let Some(id) = state.current {
            state.pending = false;
            state.speaking = false;
            state.emit(EngineEvent::Failed {
                id,
                code: code.to_string(),
            });
        }
    }
}
