//! Speech input and output
//!
//! This module provides:
//! - The platform speech-engine seam and its simulated/scripted engines
//! - The TTS wrapper with cancellation and error classification
//! - The command interpreter standing in for speech recognition

pub mod engine;
pub mod interpreter;
pub mod tts;

// Re-export commonly used types
pub use engine::{
    codes, EngineCall, EngineEvent, EngineUtterance, NullEngine, ScriptedEngine,
    ScriptedEngineProbe, SimulatedEngine, SpeechEngine,
};
pub use interpreter::{
    default_commands, Command, CommandInterpreter, RandomInterpreter, ScriptedInterpreter,
};
pub use tts::{
    classify_error, normalize_for_speech, PlaybackSession, PlaybackState, TtsErrorKind,
    TtsWrapper, UtteranceBuilder, UtteranceRequest, DEFAULT_SETTLE_DELAY,
};
