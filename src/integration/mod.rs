//! Integration layer
//!
//! Wires the speech wrapper, the interpreter and the reference data into the
//! voice controller, and runs it on a thread for the presentation layer.

pub mod config;
pub mod controller;
pub mod runtime;

pub use config::{AssistantConfig, EngineConfig, EngineKind, TimingConfig, VoiceConfig};
pub use controller::VoiceController;
pub use runtime::{Runtime, RuntimeCommand, RuntimeEvent, RuntimeHandle};
