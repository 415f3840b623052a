//! Interaction session state for the Kusi Voz assistant
//!
//! This module holds:
//! - **InteractionSession**: the controller's phase, pending action and subtitle
//! - **SessionSnapshot**: an immutable view the presentation layer renders
//! - **SharedSession**: a thread-safe holder the runtime publishes snapshots into
//!
//! The session is owned by the controller and mutated only through the
//! transition methods below, which encode the confirmation gate: the only way
//! into [`Phase::Executing`] is [`InteractionSession::resolve_confirmation`] with
//! `confirmed = true` while awaiting confirmation.

use crate::data::{Feature, HealthReminder, HelpRequest};
use crate::speech::TtsErrorKind;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Phase of the voice interaction cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for a gesture
    #[default]
    Idle,
    /// Capture window open
    Listening,
    /// Irreversible action waiting for yes/no
    AwaitingConfirmation,
    /// Confirmed action in progress
    Executing,
    /// Informational answer on screen
    Informing,
}

impl Phase {
    /// Check if idle
    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Listening => write!(f, "Listening"),
            Phase::AwaitingConfirmation => write!(f, "AwaitingConfirmation"),
            Phase::Executing => write!(f, "Executing"),
            Phase::Informing => write!(f, "Informing"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Call,
    HealthInfo,
    PensionInfo,
    HelpRequest,
}

/// What a resolved command asks the assistant to do
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDescriptor {
    /// Phone a contact; irreversible
    Call { contact_id: String },
    /// Read out a medication reminder
    HealthInfo { reminder_id: String },
    /// Read out pension deposit information
    PensionInfo,
    /// Tell the user help is on its way
    HelpRequest { topic: String },
}

impl ActionDescriptor {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionDescriptor::Call { .. } => ActionKind::Call,
            ActionDescriptor::HealthInfo { .. } => ActionKind::HealthInfo,
            ActionDescriptor::PensionInfo => ActionKind::PensionInfo,
            ActionDescriptor::HelpRequest { .. } => ActionKind::HelpRequest,
        }
    }

    /// Irreversible actions go through the yes/no dialog
    pub fn requires_confirmation(&self) -> bool {
        self.kind() == ActionKind::Call
    }
}

/// The single interaction session of a running assistant
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionSession {
    phase: Phase,
    pending_action: Option<ActionDescriptor>,
    subtitle: String,
}

impl InteractionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_action(&self) -> Option<&ActionDescriptor> {
        self.pending_action.as_ref()
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn set_subtitle(&mut self, text: impl Into<String>) {
        self.subtitle = text.into();
    }

    pub fn clear_subtitle(&mut self) {
        self.subtitle.clear();
    }

    // === State transitions ===

    /// Idle -> Listening
    pub fn start_listening(&mut self) -> bool {
        if !self.phase.is_idle() {
            return false;
        }
        self.phase = Phase::Listening;
        true
    }

    /// Listening -> AwaitingConfirmation, only for actions that need it
    pub fn await_confirmation(&mut self, action: ActionDescriptor) -> bool {
        if !matches!(self.phase, Phase::Listening | Phase::Idle) || !action.requires_confirmation()
        {
            return false;
        }
        self.phase = Phase::AwaitingConfirmation;
        self.pending_action = Some(action);
        true
    }

    /// Listening -> Informing, only for actions that skip confirmation
    pub fn begin_informing(&mut self, action: &ActionDescriptor) -> bool {
        if self.phase != Phase::Listening || action.requires_confirmation() {
            return false;
        }
        self.phase = Phase::Informing;
        true
    }

    /// AwaitingConfirmation -> Executing (confirmed) or Idle (denied)
    ///
    /// Returns the pending action, cleared from the session either way.
    pub fn resolve_confirmation(&mut self, confirmed: bool) -> Option<ActionDescriptor> {
        if self.phase != Phase::AwaitingConfirmation {
            return None;
        }
        self.phase = if confirmed {
            Phase::Executing
        } else {
            Phase::Idle
        };
        self.pending_action.take()
    }

    /// Back to Idle after a completed or abandoned cycle
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.pending_action = None;
    }
}

/// Immutable view of the assistant for the presentation layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub subtitle: String,
    pub pending_action: Option<ActionDescriptor>,
    pub feature: Option<Feature>,
    pub greeting_active: bool,
    pub is_online: bool,
    pub voice_supported: bool,
    pub is_speaking: bool,
    pub is_paused: bool,
    pub has_permission: bool,
    pub last_voice_error: Option<TtsErrorKind>,
    /// User-facing voice failure, never set for benign interruptions
    pub permission_error: Option<String>,
    /// Failure explanation plus the retry hint, shown in subtitle-only mode
    pub voice_notice: Option<String>,
    /// Push-to-talk enabled
    pub can_press: bool,
    /// Yes/No buttons enabled
    pub can_confirm: bool,
    pub call_in_progress: bool,
    pub calls_placed: usize,
    pub reminders: Vec<HealthReminder>,
    pub help_requests: Vec<HelpRequest>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            subtitle: String::new(),
            pending_action: None,
            feature: None,
            greeting_active: false,
            is_online: true,
            voice_supported: false,
            is_speaking: false,
            is_paused: false,
            has_permission: false,
            last_voice_error: None,
            permission_error: None,
            voice_notice: None,
            can_press: true,
            can_confirm: false,
            call_in_progress: false,
            calls_placed: 0,
            reminders: Vec::new(),
            help_requests: Vec::new(),
        }
    }
}

/// Thread-safe holder of the latest published snapshot
#[derive(Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published snapshot; returns whether anything changed
    pub fn publish(&self, snapshot: SessionSnapshot) -> bool {
        let mut current = self.inner.write();
        if *current == snapshot {
            return false;
        }
        *current = snapshot;
        true
    }

    /// Get a read lock on the snapshot
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionSnapshot> {
        self.inner.read()
    }

    /// Clone of the current snapshot (no lock held after return)
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    // === Convenience read methods ===

    pub fn phase(&self) -> Phase {
        self.inner.read().phase
    }

    pub fn subtitle(&self) -> String {
        self.inner.read().subtitle.clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.read().is_speaking
    }

    pub fn is_online(&self) -> bool {
        self.inner.read().is_online
    }

    pub fn permission_error(&self) -> Option<String> {
        self.inner.read().permission_error.clone()
    }
}
