//! Text-to-speech wrapper over a platform speech engine
//!
//! [`TtsWrapper`] presents one `speak / pause / resume / stop` contract over an
//! engine that may be missing, busy or permission-gated. It never fails across
//! that contract: every engine failure is classified into a [`TtsErrorKind`]
//! and recorded as wrapper state for the controller to read.
//!
//! A new `speak` while audio is playing or queued first cancels the engine and
//! only submits after a short settling delay, so the new utterance is neither
//! dropped nor interleaved with the one being cancelled.

use crate::speech::engine::{codes, EngineEvent, EngineUtterance, SpeechEngine};
use crate::{KusiError, Result};
use crossbeam_channel::{unbounded, Receiver};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default settling delay between an engine cancel and the next submission
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Immutable request to speak one piece of text
#[derive(Clone, Debug, PartialEq)]
pub struct UtteranceRequest {
    text: String,
    language: String,
    rate: f32,
    pitch: f32,
    volume: f32,
}

impl UtteranceRequest {
    /// Start building a request with the interface defaults (es-ES, rate 0.8)
    pub fn builder(text: impl Into<String>) -> UtteranceBuilder {
        UtteranceBuilder {
            text: text.into(),
            language: "es-ES".to_string(),
            rate: 0.8,
            pitch: 1.0,
            volume: 1.0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}

/// Builder for [`UtteranceRequest`]; ranges are checked in [`build`](Self::build)
#[derive(Clone, Debug)]
pub struct UtteranceBuilder {
    text: String,
    language: String,
    rate: f32,
    pitch: f32,
    volume: f32,
}

impl UtteranceBuilder {
    /// Set the BCP 47 language tag
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the speech rate (0.1 to 10)
    pub fn rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    /// Set the pitch (0 to 2)
    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    /// Set the volume (0 to 1)
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Validate and freeze the request
    pub fn build(self) -> Result<UtteranceRequest> {
        if self.text.trim().is_empty() {
            return Err(KusiError::InvalidUtterance("text is empty".into()));
        }
        if self.language.trim().is_empty() {
            return Err(KusiError::InvalidUtterance("language tag is empty".into()));
        }
        if !(0.1..=10.0).contains(&self.rate) {
            return Err(KusiError::InvalidUtterance(format!(
                "rate {} outside 0.1..=10",
                self.rate
            )));
        }
        if !(0.0..=2.0).contains(&self.pitch) {
            return Err(KusiError::InvalidUtterance(format!(
                "pitch {} outside 0..=2",
                self.pitch
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(KusiError::InvalidUtterance(format!(
                "volume {} outside 0..=1",
                self.volume
            )));
        }

        Ok(UtteranceRequest {
            text: self.text,
            language: self.language,
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
        })
    }
}

/// Stable taxonomy of speech-output failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsErrorKind {
    /// The platform has no speech synthesis
    Unsupported,
    /// Audio output needs a user gesture or was refused
    PermissionDenied,
    /// Superseded by a newer utterance or a stop; benign
    Interrupted,
    AudioBusy,
    HardwareError,
    NetworkError,
    SynthesisUnavailable,
    Unknown,
}

impl TtsErrorKind {
    /// Benign failures are absorbed without any user-visible message
    pub fn is_benign(&self) -> bool {
        matches!(self, TtsErrorKind::Interrupted)
    }

    /// Message shown to the user, `None` for benign failures
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            TtsErrorKind::Unsupported => {
                Some("La síntesis de voz no está soportada en este dispositivo")
            }
            TtsErrorKind::PermissionDenied => {
                Some("Se requiere permiso del usuario para reproducir audio")
            }
            TtsErrorKind::Interrupted => None,
            TtsErrorKind::AudioBusy => Some("El audio está ocupado, intente nuevamente"),
            TtsErrorKind::HardwareError => Some("Error de hardware de audio"),
            TtsErrorKind::NetworkError => Some("Error de red"),
            TtsErrorKind::SynthesisUnavailable => Some("Síntesis de voz no disponible"),
            TtsErrorKind::Unknown => Some("Error de síntesis de voz"),
        }
    }
}

impl std::fmt::Display for TtsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TtsErrorKind::Unsupported => "unsupported",
            TtsErrorKind::PermissionDenied => "permission-denied",
            TtsErrorKind::Interrupted => "interrupted",
            TtsErrorKind::AudioBusy => "audio-busy",
            TtsErrorKind::HardwareError => "hardware-error",
            TtsErrorKind::NetworkError => "network-error",
            TtsErrorKind::SynthesisUnavailable => "synthesis-unavailable",
            TtsErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Map a raw engine error code onto the taxonomy
///
/// Total and pure: unrecognised codes map to [`TtsErrorKind::Unknown`].
/// `canceled` (a queued utterance removed by a cancel) is as benign as
/// `interrupted`.
pub fn classify_error(code: &str) -> TtsErrorKind {
    let code = code.trim().to_ascii_lowercase();
    match code.as_str() {
        codes::NOT_ALLOWED => TtsErrorKind::PermissionDenied,
        codes::INTERRUPTED | codes::CANCELED => TtsErrorKind::Interrupted,
        codes::AUDIO_BUSY => TtsErrorKind::AudioBusy,
        codes::AUDIO_HARDWARE => TtsErrorKind::HardwareError,
        codes::NETWORK => TtsErrorKind::NetworkError,
        codes::SYNTHESIS_UNAVAILABLE => TtsErrorKind::SynthesisUnavailable,
        _ => TtsErrorKind::Unknown,
    }
}

/// Lifecycle state of one utterance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Queued,
    Speaking,
    Paused,
    Ended,
    Failed,
}

impl PlaybackState {
    /// Queued, speaking or paused
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            PlaybackState::Queued | PlaybackState::Speaking | PlaybackState::Paused
        )
    }
}

/// The single in-flight or most recent utterance
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSession {
    id: Uuid,
    text: String,
    state: PlaybackState,
    error_kind: Option<TtsErrorKind>,
}

impl PlaybackSession {
    fn queued(id: Uuid, text: &str) -> Self {
        Self {
            id,
            text: text.to_string(),
            state: PlaybackState::Queued,
            error_kind: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn error_kind(&self) -> Option<TtsErrorKind> {
        self.error_kind
    }
}

#[derive(Debug)]
struct PendingSubmission {
    id: Uuid,
    request: UtteranceRequest,
    due: Duration,
}

/// Queuing, cancellation and error-classification layer over a [`SpeechEngine`]
pub struct TtsWrapper {
    engine: Box<dyn SpeechEngine>,
    supported: bool,
    settle_delay: Duration,
    events_rx: Receiver<EngineEvent>,
    session: Option<PlaybackSession>,
    pending: Option<PendingSubmission>,
    has_permission: bool,
    last_error: Option<TtsErrorKind>,
    now: Duration,
}

impl TtsWrapper {
    /// Wrap an engine. Support is probed once, here.
    pub fn new(mut engine: Box<dyn SpeechEngine>, settle_delay: Duration) -> Self {
        let (events_tx, events_rx) = unbounded();
        engine.attach(events_tx);
        let supported = engine.is_available();

        if supported {
            info!("Speech synthesis available");
        } else {
            warn!("Speech synthesis not available, using subtitles only");
        }

        Self {
            engine,
            supported,
            settle_delay,
            events_rx,
            session: None,
            pending: None,
            has_permission: false,
            last_error: None,
            now: Duration::ZERO,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Speak `request`, superseding whatever is playing or queued
    pub fn speak(&mut self, request: UtteranceRequest) {
        if !self.supported {
            warn!("Speech synthesis is not supported, dropping utterance");
            self.last_error = Some(TtsErrorKind::Unsupported);
            return;
        }

        self.pump_events();
        let id = Uuid::new_v4();

        if let Some(pending) = self.pending.as_mut() {
            // Cancel already requested; the newest request takes the waiting slot
            debug!("Replacing utterance {} waiting to be submitted", pending.id);
            pending.id = id;
            self.session = Some(PlaybackSession::queued(id, request.text()));
            pending.request = request;
            return;
        }

        if self.engine.is_speaking() || self.engine.is_pending() {
            debug!("Engine busy, cancelling before submitting {}", id);
            self.engine.cancel();
            self.session = Some(PlaybackSession::queued(id, request.text()));
            self.pending = Some(PendingSubmission {
                id,
                request,
                due: self.now + self.settle_delay,
            });
            self.pump_events();
            return;
        }

        self.submit(id, request);
    }

    /// Pause the current utterance; no-op unless it is speaking
    pub fn pause(&mut self) {
        if !self.supported {
            return;
        }
        self.pump_events();
        if let Some(session) = self.session.as_mut() {
            if session.state == PlaybackState::Speaking {
                self.engine.pause();
                session.state = PlaybackState::Paused;
                debug!("Paused utterance {}", session.id);
            }
        }
    }

    /// Resume a paused utterance; no-op unless it is paused
    pub fn resume(&mut self) {
        if !self.supported {
            return;
        }
        self.pump_events();
        if let Some(session) = self.session.as_mut() {
            if session.state == PlaybackState::Paused {
                self.engine.resume();
                session.state = PlaybackState::Speaking;
                debug!("Resumed utterance {}", session.id);
            }
        }
    }

    /// Cancel anything queued, speaking or paused. Always safe to call.
    pub fn stop(&mut self) {
        if !self.supported {
            return;
        }
        self.engine.cancel();
        self.pending = None;
        if let Some(session) = self.session.as_mut() {
            if session.state.is_live() {
                debug!("Stopped utterance {}", session.id);
                session.state = PlaybackState::Ended;
            }
        }
        self.pump_events();
    }

    /// Advance time: let the engine progress, submit a settled utterance and
    /// apply lifecycle events
    pub fn tick(&mut self, now: Duration) {
        if now > self.now {
            self.now = now;
        }
        self.engine.tick(self.now);
        self.pump_events();

        let due = self
            .pending
            .as_ref()
            .map_or(false, |pending| pending.due <= self.now);
        if due {
            if let Some(pending) = self.pending.take() {
                self.submit(pending.id, pending.request);
            }
        }

        self.engine.tick(self.now);
        self.pump_events();
    }

    /// Next instant at which [`tick`](Self::tick) has work to do
    pub fn next_deadline(&self) -> Option<Duration> {
        let pending = self.pending.as_ref().map(|pending| pending.due);
        match (pending, self.engine.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Speaking, including paused mid-utterance
    pub fn is_speaking(&self) -> bool {
        self.session.as_ref().map_or(false, |session| {
            matches!(session.state, PlaybackState::Speaking | PlaybackState::Paused)
        })
    }

    pub fn is_paused(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| session.state == PlaybackState::Paused)
    }

    /// Sticky: true once any utterance has started playing
    pub fn has_permission(&self) -> bool {
        self.has_permission
    }

    pub fn last_error(&self) -> Option<TtsErrorKind> {
        self.last_error
    }

    /// A non-benign failure is recorded
    pub fn has_active_error(&self) -> bool {
        self.last_error.map_or(false, |kind| !kind.is_benign())
    }

    /// User-facing message for the recorded failure, never set for benign ones
    pub fn permission_error(&self) -> Option<&'static str> {
        self.last_error.and_then(|kind| kind.user_message())
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    fn submit(&mut self, id: Uuid, request: UtteranceRequest) {
        let utterance = EngineUtterance {
            id,
            text: normalize_for_speech(request.text()),
            language: request.language().to_string(),
            rate: request.rate(),
            pitch: request.pitch(),
            volume: request.volume(),
        };
        self.session = Some(PlaybackSession::queued(id, request.text()));

        match self.engine.speak(&utterance) {
            Ok(()) => debug!("Submitted utterance {}: {}", id, request.text()),
            Err(code) => {
                warn!("Engine refused utterance {}: {}", id, code);
                self.apply_failure(id, &code);
            }
        }
    }

    fn pump_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: EngineEvent) {
        let current = self
            .session
            .as_ref()
            .filter(|session| session.id == event.utterance_id() && session.state.is_live())
            .is_some();

        if !current {
            debug!("Ignoring stale engine event {:?}", event);
            return;
        }

        match event {
            EngineEvent::Started(id) => {
                if let Some(session) = self.session.as_mut() {
                    session.state = PlaybackState::Speaking;
                }
                self.has_permission = true;
                self.last_error = None;
                debug!("Utterance {} started", id);
            }
            EngineEvent::Ended(id) => {
                if let Some(session) = self.session.as_mut() {
                    session.state = PlaybackState::Ended;
                }
                debug!("Utterance {} ended", id);
            }
            EngineEvent::Failed { id, code } => self.apply_failure(id, &code),
        }
    }

    fn apply_failure(&mut self, id: Uuid, code: &str) {
        let kind = classify_error(code);
        if kind.is_benign() {
            debug!("Utterance {} interrupted ({})", id, code);
        } else {
            warn!("Utterance {} failed: {} ({})", id, kind, code);
        }

        if let Some(session) = self.session.as_mut() {
            if session.id == id {
                session.state = PlaybackState::Failed;
                session.error_kind = Some(kind);
            }
        }
        self.last_error = Some(kind);
    }
}

/// Normalize display text for speech synthesis
///
/// Expands the abbreviations, currency and clock formats that appear in the
/// assistant's prompts so engines read them naturally. Subtitles keep the
/// original text.
pub fn normalize_for_speech(text: &str) -> String {
    let abbreviations = [
        ("Dr.", "Doctor"),
        ("Dra.", "Doctora"),
        ("Sr.", "Señor"),
        ("Sra.", "Señora"),
        ("Srta.", "Señorita"),
        ("AM", "de la mañana"),
        ("a.m.", "de la mañana"),
        ("PM", "de la tarde"),
        ("p.m.", "de la tarde"),
    ];

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut words: Vec<String> = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];

        // "S/ 500.00" and "S/500.00" read as "500.00 soles"
        if token == "S/" {
            if let Some(amount) = tokens.get(i + 1) {
                words.push(format!("{} soles", amount));
                i += 2;
                continue;
            }
        } else if let Some(amount) = token.strip_prefix("S/") {
            words.push(format!("{} soles", amount));
            i += 1;
            continue;
        }

        if let Some((_, expansion)) = abbreviations.iter().find(|(abbrev, _)| *abbrev == token) {
            words.push(expansion.to_string());
        } else {
            words.push(expand_clock_time(token));
        }
        i += 1;
    }

    words
        .join(" ")
        .replace('%', " por ciento")
        .replace('&', " y ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// "8:00" -> "8 en punto", "8:30" -> "8 y 30"; other tokens pass through
fn expand_clock_time(token: &str) -> String {
    let trimmed = token.trim_end_matches(|c: char| ",.;!?".contains(c));
    let suffix = &token[trimmed.len()..];

    let Some((hours, minutes)) = trimmed.split_once(':') else {
        return token.to_string();
    };
    let valid = !hours.is_empty()
        && hours.len() <= 2
        && minutes.len() == 2
        && hours.chars().all(|c| c.is_ascii_digit())
        && minutes.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return token.to_string();
    }

    let hour = hours.trim_start_matches('0');
    let hour = if hour.is_empty() { "0" } else { hour };
    if minutes == "00" {
        format!("{} en punto{}", hour, suffix)
    } else {
        format!("{} y {}{}", hour, minutes.trim_start_matches('0'), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::engine::{EngineCall, NullEngine, ScriptedEngine, ScriptedEngineProbe};

    fn wrapper() -> (TtsWrapper, ScriptedEngineProbe) {
        let (engine, probe) = ScriptedEngine::new();
        (TtsWrapper::new(Box::new(engine), DEFAULT_SETTLE_DELAY), probe)
    }

    fn request(text: &str) -> UtteranceRequest {
        UtteranceRequest::builder(text).build().unwrap()
    }

    #[test]
    fn test_classify_every_engine_code() {
        let expected = [
            (codes::NOT_ALLOWED, TtsErrorKind::PermissionDenied),
            (codes::INTERRUPTED, TtsErrorKind::Interrupted),
            (codes::CANCELED, TtsErrorKind::Interrupted),
            (codes::AUDIO_BUSY, TtsErrorKind::AudioBusy),
            (codes::AUDIO_HARDWARE, TtsErrorKind::HardwareError),
            (codes::NETWORK, TtsErrorKind::NetworkError),
            (codes::SYNTHESIS_UNAVAILABLE, TtsErrorKind::SynthesisUnavailable),
            (codes::SYNTHESIS_FAILED, TtsErrorKind::Unknown),
            (codes::LANGUAGE_UNAVAILABLE, TtsErrorKind::Unknown),
            (codes::VOICE_UNAVAILABLE, TtsErrorKind::Unknown),
            (codes::TEXT_TOO_LONG, TtsErrorKind::Unknown),
            (codes::INVALID_ARGUMENT, TtsErrorKind::Unknown),
        ];
        assert_eq!(expected.len(), codes::ALL.len());

        for (code, kind) in expected {
            assert_eq!(classify_error(code), kind, "code {}", code);
        }
        assert_eq!(classify_error(""), TtsErrorKind::Unknown);
        assert_eq!(classify_error("something-new"), TtsErrorKind::Unknown);
        assert_eq!(classify_error(" Not-Allowed "), TtsErrorKind::PermissionDenied);
    }

    #[test]
    fn test_only_interrupted_is_benign() {
        for code in codes::ALL {
            let kind = classify_error(code);
            assert_eq!(kind.is_benign(), kind.user_message().is_none(), "code {}", code);
        }
        assert!(TtsErrorKind::Interrupted.is_benign());
        assert!(!TtsErrorKind::Unsupported.is_benign());
    }

    #[test]
    fn test_utterance_validation() {
        assert!(UtteranceRequest::builder("  ").build().is_err());
        assert!(UtteranceRequest::builder("hola").rate(0.05).build().is_err());
        assert!(UtteranceRequest::builder("hola").rate(10.5).build().is_err());
        assert!(UtteranceRequest::builder("hola").pitch(2.1).build().is_err());
        assert!(UtteranceRequest::builder("hola").volume(-0.1).build().is_err());
        assert!(UtteranceRequest::builder("hola").language("").build().is_err());

        let req = UtteranceRequest::builder("hola")
            .language("qu-PE")
            .rate(10.0)
            .pitch(0.0)
            .volume(1.0)
            .build()
            .unwrap();
        assert_eq!(req.language(), "qu-PE");
        assert_eq!(req.rate(), 10.0);
    }

    #[test]
    fn test_speak_when_idle_submits_immediately() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Hola"));

        assert_eq!(probe.spoken_texts(), vec!["Hola".to_string()]);
        assert_eq!(tts.session().unwrap().state(), PlaybackState::Queued);
        assert!(!tts.is_speaking());

        probe.start();
        tts.tick(Duration::from_millis(1));
        assert!(tts.is_speaking());
        assert!(tts.has_permission());

        probe.finish();
        tts.tick(Duration::from_millis(2));
        assert!(!tts.is_speaking());
        assert_eq!(tts.session().unwrap().state(), PlaybackState::Ended);
    }

    #[test]
    fn test_speak_while_active_cancels_before_submitting() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Primero"));
        probe.start();
        tts.tick(Duration::from_millis(10));

        tts.speak(request("Segundo"));
        // Cancel issued, new text held back for the settling delay
        assert_eq!(probe.spoken_texts(), vec!["Primero".to_string()]);
        assert_eq!(probe.calls().last(), Some(&EngineCall::Cancel));

        tts.tick(Duration::from_millis(50));
        assert_eq!(probe.spoken_texts().len(), 1);

        tts.tick(Duration::from_millis(110));
        let calls = probe.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], EngineCall::Speak { text, .. } if text == "Primero"));
        assert_eq!(calls[1], EngineCall::Cancel);
        assert!(matches!(&calls[2], EngineCall::Speak { text, .. } if text == "Segundo"));

        // Exactly one session, the new one, and the old interruption left no error
        let session = tts.session().unwrap();
        assert_eq!(session.text(), "Segundo");
        assert_eq!(session.state(), PlaybackState::Queued);
        assert_eq!(Some(session.id()), probe.current());
        assert_eq!(tts.permission_error(), None);
    }

    #[test]
    fn test_speak_during_settle_replaces_waiting_request() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Uno"));
        probe.start();
        tts.tick(Duration::from_millis(1));

        tts.speak(request("Dos"));
        tts.speak(request("Tres"));
        tts.tick(Duration::from_millis(200));

        assert_eq!(
            probe.spoken_texts(),
            vec!["Uno".to_string(), "Tres".to_string()]
        );
        let cancels = probe
            .calls()
            .iter()
            .filter(|call| **call == EngineCall::Cancel)
            .count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Hola"));
        probe.start();
        tts.tick(Duration::from_millis(1));
        tts.pause();

        tts.stop();
        tts.stop();
        assert!(!tts.is_speaking());
        assert!(!tts.is_paused());
        assert_eq!(tts.session().unwrap().state(), PlaybackState::Ended);
        assert_eq!(tts.permission_error(), None);
    }

    #[test]
    fn test_stop_discards_settling_request() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Uno"));
        probe.start();
        tts.tick(Duration::from_millis(1));
        tts.speak(request("Dos"));

        tts.stop();
        tts.tick(Duration::from_millis(500));
        assert_eq!(probe.spoken_texts(), vec!["Uno".to_string()]);
        assert_eq!(tts.next_deadline(), None);
    }

    #[test]
    fn test_pause_and_resume_guards() {
        let (mut tts, probe) = wrapper();

        tts.pause();
        tts.resume();
        assert!(probe.calls().is_empty());

        tts.speak(request("Hola"));
        tts.pause(); // still queued
        assert!(!tts.is_paused());

        probe.start();
        tts.tick(Duration::from_millis(1));
        tts.resume(); // not paused
        tts.pause();
        assert!(tts.is_paused());
        assert!(tts.is_speaking());
        tts.pause(); // already paused

        tts.resume();
        assert!(!tts.is_paused());

        let pauses = probe
            .calls()
            .iter()
            .filter(|call| **call == EngineCall::Pause)
            .count();
        let resumes = probe
            .calls()
            .iter()
            .filter(|call| **call == EngineCall::Resume)
            .count();
        assert_eq!((pauses, resumes), (1, 1));
    }

    #[test]
    fn test_engine_failure_is_recorded_not_raised() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Hola"));
        probe.fail(codes::NOT_ALLOWED);
        tts.tick(Duration::from_millis(1));

        assert_eq!(tts.last_error(), Some(TtsErrorKind::PermissionDenied));
        assert!(tts.has_active_error());
        assert_eq!(
            tts.permission_error(),
            Some("Se requiere permiso del usuario para reproducir audio")
        );
        assert_eq!(tts.session().unwrap().state(), PlaybackState::Failed);
        assert!(!tts.is_speaking());
        assert!(!tts.has_permission());
    }

    #[test]
    fn test_successful_start_clears_error_and_permission_is_sticky() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Uno"));
        probe.start();
        tts.tick(Duration::from_millis(1));
        probe.finish();
        tts.tick(Duration::from_millis(2));

        tts.speak(request("Dos"));
        probe.fail(codes::AUDIO_BUSY);
        tts.tick(Duration::from_millis(3));
        assert_eq!(tts.last_error(), Some(TtsErrorKind::AudioBusy));
        assert!(tts.has_permission());

        tts.speak(request("Tres"));
        probe.start();
        tts.tick(Duration::from_millis(4));
        assert_eq!(tts.last_error(), None);
    }

    #[test]
    fn test_interruption_never_surfaces() {
        let (mut tts, probe) = wrapper();
        tts.speak(request("Hola"));
        probe.start();
        tts.tick(Duration::from_millis(1));
        probe.fail(codes::INTERRUPTED);
        tts.tick(Duration::from_millis(2));

        assert_eq!(tts.last_error(), Some(TtsErrorKind::Interrupted));
        assert!(!tts.has_active_error());
        assert_eq!(tts.permission_error(), None);
        assert!(!tts.is_speaking());
    }

    #[test]
    fn test_synchronous_start_failure() {
        let (mut tts, probe) = wrapper();
        probe.fail_next_speak(codes::SYNTHESIS_UNAVAILABLE);
        tts.speak(request("Hola"));

        assert_eq!(tts.last_error(), Some(TtsErrorKind::SynthesisUnavailable));
        assert_eq!(tts.session().unwrap().state(), PlaybackState::Failed);
    }

    #[test]
    fn test_unsupported_engine_records_error() {
        let mut tts = TtsWrapper::new(Box::new(NullEngine), DEFAULT_SETTLE_DELAY);
        assert!(!tts.is_supported());

        tts.speak(request("Hola"));
        tts.stop();
        tts.pause();
        tts.resume();

        assert_eq!(tts.last_error(), Some(TtsErrorKind::Unsupported));
        assert!(tts.session().is_none());
        assert!(!tts.is_speaking());
    }

    #[test]
    fn test_normalize_for_speech() {
        assert_eq!(normalize_for_speech("Llamar al Dr. Pérez"), "Llamar al Doctor Pérez");
        assert_eq!(
            normalize_for_speech("Monto: S/ 500.00 este mes"),
            "Monto: 500.00 soles este mes"
        );
        assert_eq!(normalize_for_speech("Pago S/500.00"), "Pago 500.00 soles");
        assert_eq!(
            normalize_for_speech("Tomar pastilla a las 8:00 AM"),
            "Tomar pastilla a las 8 en punto de la mañana"
        );
        assert_eq!(normalize_for_speech("a las 20:30."), "a las 20 y 30.");
        assert_eq!(normalize_for_speech("50% menos"), "50 por ciento menos");
    }

    #[test]
    fn test_normalize_leaves_plain_text() {
        let text = "¿Quieres llamar a Carlos Quispe? Sí o No";
        assert_eq!(normalize_for_speech(text), text);
    }
}
