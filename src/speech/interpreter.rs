//! Command interpretation seam
//!
//! Stands in for speech recognition: at the end of the capture window the
//! controller asks a [`CommandInterpreter`] for the user's [`Command`]. The
//! shipped [`RandomInterpreter`] picks uniformly from a fixed candidate list;
//! a real ASR/NLU backend plugs in behind the same trait.

use crate::state::ActionDescriptor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;

/// A recognised utterance and the action it maps to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// What the user said
    pub transcript: String,
    /// What the assistant should do about it
    pub action: ActionDescriptor,
}

impl Command {
    pub fn new(transcript: impl Into<String>, action: ActionDescriptor) -> Self {
        Self {
            transcript: transcript.into(),
            action,
        }
    }
}

/// Resolves the captured audio into a command
pub trait CommandInterpreter: Send {
    /// `None` when nothing could be understood
    fn interpret(&mut self) -> Option<Command>;
}

/// The commands the stand-in interpreter chooses from
pub fn default_commands() -> Vec<Command> {
    vec![
        Command::new(
            "Quiero llamar a mi hijo",
            ActionDescriptor::Call {
                contact_id: "1".to_string(),
            },
        ),
        Command::new("¿Cuándo cobro mi pensión?", ActionDescriptor::PensionInfo),
        Command::new(
            "Recordar medicina",
            ActionDescriptor::HealthInfo {
                reminder_id: "1".to_string(),
            },
        ),
        Command::new(
            "Necesito ayuda",
            ActionDescriptor::HelpRequest {
                topic: "Consulta general".to_string(),
            },
        ),
    ]
}

/// Uniform random choice over a fixed candidate list
pub struct RandomInterpreter {
    candidates: Vec<Command>,
    rng: StdRng,
}

impl RandomInterpreter {
    /// Seed from OS entropy
    pub fn new(candidates: Vec<Command>) -> Self {
        Self {
            candidates,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence of choices
    pub fn with_seed(candidates: Vec<Command>, seed: u64) -> Self {
        Self {
            candidates,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl CommandInterpreter for RandomInterpreter {
    fn interpret(&mut self) -> Option<Command> {
        self.candidates.choose(&mut self.rng).cloned()
    }
}

/// Replays a fixed sequence of commands, then understands nothing
#[derive(Debug, Default)]
pub struct ScriptedInterpreter {
    script: VecDeque<Command>,
}

impl ScriptedInterpreter {
    pub fn new(script: impl IntoIterator<Item = Command>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Commands still to be replayed
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl CommandInterpreter for ScriptedInterpreter {
    fn interpret(&mut self) -> Option<Command> {
        self.script.pop_front()
    }
}
