//! Runtime that drives the controller on wall-clock time
//!
//! One thread owns the [`VoiceController`]. It waits for commands from the
//! presentation layer and wakes up for the controller's next deadline,
//! publishing a fresh [`SessionSnapshot`] whenever something changed.

use crate::data::Feature;
use crate::integration::config::AssistantConfig;
use crate::integration::controller::VoiceController;
use crate::state::{SessionSnapshot, SharedSession};
use crate::{KusiError, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Longest the loop sleeps when nothing is scheduled
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Commands accepted by the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCommand {
    /// Push-to-talk
    Press,

    /// Answer to the yes/no prompt
    Confirm(bool),

    /// Call a contact by id from the contact list
    InitiateCall(String),

    /// End the call in progress
    HangUp,

    /// Mark a health reminder as taken
    MarkTaken(String),

    /// Open a help request on the given topic
    RequestHelp(String),

    /// Close a connected help request
    ResolveHelp(Uuid),

    RepeatGreeting,

    /// Speak the last announcement again
    RetryVoice,

    PauseVoice,

    ResumeVoice,

    StopVoice,

    OpenFeature(Feature),

    CloseFeature,

    SetOnline(bool),

    /// Stop the runtime thread
    Shutdown,
}

/// Events emitted by the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// A new snapshot was published
    StateChanged,

    /// A command referenced something that does not exist
    Error(String),

    /// The runtime thread has stopped
    Shutdown,
}

/// Handle for controlling the runtime from the presentation layer
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: Sender<RuntimeCommand>,
    event_rx: Receiver<RuntimeEvent>,
    state: SharedSession,
}

impl RuntimeHandle {
    /// Send a command to the runtime
    pub fn send_command(&self, cmd: RuntimeCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| KusiError::ChannelError(format!("Failed to send command: {}", e)))
    }

    /// Try to receive an event from the runtime
    pub fn try_recv_event(&self) -> Option<RuntimeEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<RuntimeEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Shared view of the latest snapshot
    pub fn state(&self) -> SharedSession {
        self.state.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }
}

/// Owns the controller until [`start`](Runtime::start) moves it onto its thread
pub struct Runtime {
    controller: VoiceController,
    command_rx: Receiver<RuntimeCommand>,
    event_tx: Sender<RuntimeEvent>,
    state: SharedSession,
}

impl Runtime {
    /// Create a runtime with the configured engine and interpreter
    pub fn new(config: AssistantConfig) -> Result<(Self, RuntimeHandle)> {
        let controller = VoiceController::from_config(config)?;
        Ok(Self::with_controller(controller))
    }

    /// Create a runtime around an already assembled controller
    pub fn with_controller(controller: VoiceController) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = bounded(100);
        let (event_tx, event_rx) = bounded(100);

        let state = SharedSession::new();
        state.publish(controller.snapshot());

        let handle = RuntimeHandle {
            command_tx,
            event_rx,
            state: state.clone(),
        };

        let runtime = Self {
            controller,
            command_rx,
            event_tx,
            state,
        };

        (runtime, handle)
    }

    /// Spawn the runtime thread. The controller's clock starts now.
    pub fn start(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("kusi-voz-runtime".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    fn run(mut self) {
        info!("Runtime started");
        let started = Instant::now();
        let command_rx = self.command_rx.clone();

        loop {
            let wait = self
                .controller
                .next_deadline()
                .map(|deadline| deadline.saturating_sub(started.elapsed()))
                .unwrap_or(IDLE_WAIT)
                .min(IDLE_WAIT);

            select! {
                recv(command_rx) -> cmd => {
                    match cmd {
                        Ok(RuntimeCommand::Shutdown) => {
                            info!("Runtime shutdown requested");
                            break;
                        }
                        Ok(cmd) => {
                            // Catch up first so the command sees current state
                            self.controller.advance_to(started.elapsed());
                            self.apply(cmd);
                        }
                        Err(_) => {
                            warn!("Command channel disconnected");
                            break;
                        }
                    }
                }
                default(wait) => {}
            }

            self.controller.advance_to(started.elapsed());
            self.publish();
        }

        self.controller.stop_voice();
        self.publish();
        self.emit(RuntimeEvent::Shutdown);
        info!("Runtime stopped");
    }

    fn apply(&mut self, cmd: RuntimeCommand) {
        debug!("Command: {:?}", cmd);
        let controller = &mut self.controller;

        let outcome = match cmd {
            RuntimeCommand::Press => Ok(controller.press()),
            RuntimeCommand::Confirm(confirmed) => Ok(controller.confirm(confirmed)),
            RuntimeCommand::InitiateCall(contact_id) => controller.initiate_call(&contact_id),
            RuntimeCommand::HangUp => Ok(controller.hang_up()),
            RuntimeCommand::MarkTaken(reminder_id) => controller.mark_taken(&reminder_id),
            RuntimeCommand::RequestHelp(topic) => {
                controller.request_help(topic);
                Ok(true)
            }
            RuntimeCommand::ResolveHelp(id) => controller.resolve_help(id),
            RuntimeCommand::RepeatGreeting => Ok(controller.repeat_greeting()),
            RuntimeCommand::RetryVoice => Ok(controller.retry_voice()),
            RuntimeCommand::PauseVoice => {
                controller.pause_voice();
                Ok(true)
            }
            RuntimeCommand::ResumeVoice => {
                controller.resume_voice();
                Ok(true)
            }
            RuntimeCommand::StopVoice => {
                controller.stop_voice();
                Ok(true)
            }
            RuntimeCommand::OpenFeature(feature) => {
                controller.open_feature(feature);
                Ok(true)
            }
            RuntimeCommand::CloseFeature => {
                controller.close_feature();
                Ok(true)
            }
            RuntimeCommand::SetOnline(online) => {
                controller.set_online(online);
                Ok(true)
            }
            // Handled by the loop
            RuntimeCommand::Shutdown => Ok(false),
        };

        match outcome {
            Ok(true) => {}
            Ok(false) => debug!("Command had no effect"),
            Err(e) => {
                warn!("Command failed: {}", e);
                self.emit(RuntimeEvent::Error(e.user_message()));
            }
        }
    }

    fn publish(&self) {
        if self.state.publish(self.controller.snapshot()) {
            self.emit(RuntimeEvent::StateChanged);
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("Event queue full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => trace!("No event listener"),
        }
    }
}
