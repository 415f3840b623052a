//! Voice interaction controller
//!
//! Owns the [`InteractionSession`] and drives it through
//! `Idle -> Listening -> (AwaitingConfirmation -> Executing | Informing) -> Idle`.
//! Every delay is a cancellable task on the controller's virtual clock; the
//! owner moves time forward with [`VoiceController::advance`] or
//! [`VoiceController::advance_to`].
//!
//! User-facing text always lands in the subtitle. It is also spoken while voice
//! output is available; otherwise it stays on screen a little longer.

use crate::data::{CallRecord, Contact, Feature, HelpRequest, HelpStatus, ReferenceData};
use crate::integration::config::AssistantConfig;
use crate::speech::{
    default_commands, CommandInterpreter, RandomInterpreter, TtsErrorKind, TtsWrapper,
};
use crate::state::{ActionDescriptor, InteractionSession, Phase, SessionSnapshot};
use crate::utils::{TimerId, TimerQueue};
use crate::{KusiError, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const GREETING: &str = "Allinllachu, bienvenido. Ima hina yanapawanqui?";
pub const LISTENING: &str = "Escuchando...";
pub const NOT_UNDERSTOOD: &str = "No le entendí. Intente de nuevo.";
pub const CALL_ENDED: &str = "Llamada finalizada";
pub const CALL_CANCELLED: &str = "Llamada cancelada";
pub const MEDICATION_TAKEN: &str = "Medicina marcada como tomada";
pub const HELP_SEARCHING: &str = "Buscando Nieto Digital disponible...";
pub const HELP_CONNECTING: &str = "Conectando con Nieto Digital...";
pub const RETRY_HINT: &str = "Toque \"Repetir\" para intentar de nuevo.";
/// Volunteer assigned when the configured roster is empty
pub const FALLBACK_VOLUNTEER: &str = "Nieto Digital";

/// Cap on deadline steps taken at a single instant
const MAX_STEPS_PER_INSTANT: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Timer {
    ShowGreeting,
    EndGreeting,
    CaptureElapsed,
    InformingElapsed,
    CallElapsed,
    ClearSubtitle { close_feature: bool },
    HelpConnected(Uuid),
}

/// The voice interaction state machine
pub struct VoiceController {
    config: AssistantConfig,
    data: ReferenceData,
    tts: TtsWrapper,
    interpreter: Box<dyn CommandInterpreter>,
    session: InteractionSession,
    timers: TimerQueue<Timer>,

    /// Auto-clear of the current subtitle
    subtitle_timer: Option<TimerId>,
    /// Capture window, informing display or call duration
    phase_timer: Option<TimerId>,
    /// Startup greeting show/end
    greeting_timer: Option<TimerId>,
    greeting_active: bool,

    feature: Option<Feature>,
    is_online: bool,
    help_requests: Vec<HelpRequest>,
    next_volunteer: usize,
    calls: Vec<CallRecord>,
    /// Latest announcement and its rate, spoken or not
    last_announcement: Option<(String, f32)>,
}

impl VoiceController {
    /// Create a controller; the startup greeting is scheduled immediately
    pub fn new(
        config: AssistantConfig,
        data: ReferenceData,
        tts: TtsWrapper,
        interpreter: Box<dyn CommandInterpreter>,
    ) -> Self {
        let mut timers = TimerQueue::new();
        let greeting_timer = Some(timers.schedule_in(
            config.timing.greeting_delay(),
            Timer::ShowGreeting,
        ));

        Self {
            config,
            data,
            tts,
            interpreter,
            session: InteractionSession::new(),
            timers,
            subtitle_timer: None,
            phase_timer: None,
            greeting_timer,
            greeting_active: false,
            feature: None,
            is_online: true,
            help_requests: Vec::new(),
            next_volunteer: 0,
            calls: Vec::new(),
            last_announcement: None,
        }
    }

    /// Build the engine, wrapper and interpreter the configuration names
    pub fn from_config(config: AssistantConfig) -> Result<Self> {
        config.validate()?;

        let tts = TtsWrapper::new(config.engine.build_engine(), config.voice.settle_delay());
        let interpreter: Box<dyn CommandInterpreter> = match config.assistant.seed {
            Some(seed) => Box::new(RandomInterpreter::with_seed(default_commands(), seed)),
            None => Box::new(RandomInterpreter::new(default_commands())),
        };

        Ok(Self::new(config, ReferenceData::fixtures(), tts, interpreter))
    }

    // === Clock ===

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /// Next instant at which the controller or the wrapper has work to do
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.timers.next_deadline(), self.tts.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.advance_to(self.now() + by);
    }

    /// Move the clock to `target`, firing every deadline on the way in order
    pub fn advance_to(&mut self, target: Duration) {
        let mut last_step = None;
        let mut steps_at_instant = 0;

        while let Some(deadline) = self.next_deadline() {
            if deadline > target {
                break;
            }
            let step = deadline.max(self.now());

            if last_step == Some(step) {
                steps_at_instant += 1;
                if steps_at_instant >= MAX_STEPS_PER_INSTANT {
                    warn!("Deadline at {:?} keeps rescheduling itself, moving on", step);
                    break;
                }
            } else {
                last_step = Some(step);
                steps_at_instant = 0;
            }

            self.step_to(step);
        }

        self.step_to(target);
    }

    fn step_to(&mut self, now: Duration) {
        self.timers.set_now(now);
        self.tts.tick(self.timers.now());

        while let Some((id, timer)) = self.timers.pop_due() {
            self.fire(id, timer);
        }
    }

    fn fire(&mut self, id: TimerId, timer: Timer) {
        debug!("Timer {:?} fired at {:?}", timer, self.now());
        match timer {
            Timer::ShowGreeting => {
                self.greeting_timer = None;
                self.show_greeting();
            }
            Timer::EndGreeting => {
                self.greeting_timer = None;
                self.greeting_active = false;
                if self.session.subtitle() == GREETING {
                    self.clear_subtitle();
                }
                debug!("Greeting window closed");
            }
            Timer::CaptureElapsed => {
                self.phase_timer = None;
                self.resolve_command();
            }
            Timer::InformingElapsed => {
                self.phase_timer = None;
                self.session.reset();
                self.clear_subtitle();
                info!("Phase: Informing -> Idle");
            }
            Timer::CallElapsed => {
                self.phase_timer = None;
                self.finish_call();
            }
            Timer::ClearSubtitle { close_feature } => {
                if self.subtitle_timer == Some(id) {
                    self.subtitle_timer = None;
                }
                self.session.clear_subtitle();
                if close_feature {
                    self.feature = None;
                }
            }
            Timer::HelpConnected(request_id) => self.connect_help(request_id),
        }
    }

    // === Gestures ===

    /// Push-to-talk. Dropped (returns `false`) unless idle and outside the
    /// startup greeting.
    pub fn press(&mut self) -> bool {
        if self.greeting_active {
            debug!("Push-to-talk ignored during greeting");
            return false;
        }
        if !self.session.start_listening() {
            debug!("Push-to-talk ignored in phase {}", self.session.phase());
            return false;
        }

        info!("Phase: Idle -> Listening");
        self.cancel_greeting();
        self.announce(LISTENING, None);
        self.phase_timer = Some(
            self.timers
                .schedule_in(self.config.timing.capture_window(), Timer::CaptureElapsed),
        );
        true
    }

    /// Yes/No answer to the confirmation prompt; `false` when nothing is pending
    pub fn confirm(&mut self, confirmed: bool) -> bool {
        let Some(action) = self.session.resolve_confirmation(confirmed) else {
            debug!(
                "Confirmation ignored in phase {}",
                self.session.phase()
            );
            return false;
        };

        if !confirmed {
            info!("Phase: AwaitingConfirmation -> Idle (denied)");
            let display = self.config.timing.cancel_display();
            self.announce(CALL_CANCELLED, Some(display));
            return true;
        }

        info!("Phase: AwaitingConfirmation -> Executing");
        self.execute(action);
        true
    }

    /// Call a contact straight from the contact list, behind the same
    /// confirmation prompt as a spoken command
    pub fn initiate_call(&mut self, contact_id: &str) -> Result<bool> {
        let contact = self.contact(contact_id)?.clone();
        let action = ActionDescriptor::Call {
            contact_id: contact.id.clone(),
        };

        if !self.session.phase().is_idle() || !self.session.await_confirmation(action) {
            debug!("Call to {} ignored in phase {}", contact.name, self.session.phase());
            return Ok(false);
        }

        info!("Phase: Idle -> AwaitingConfirmation (call {})", contact.name);
        self.cancel_greeting();
        self.announce(&confirmation_prompt(&contact), None);
        Ok(true)
    }

    /// End the call in progress early
    pub fn hang_up(&mut self) -> bool {
        if self.session.phase() != Phase::Executing {
            return false;
        }
        self.cancel_phase_timer();
        self.finish_call();
        true
    }

    // === Reference data ===

    /// Mark a reminder as taken. `Ok(false)` if it already was.
    pub fn mark_taken(&mut self, reminder_id: &str) -> Result<bool> {
        let reminder = self
            .data
            .reminder_mut(reminder_id)
            .ok_or_else(|| KusiError::UnknownReminder(reminder_id.to_string()))?;

        if reminder.taken {
            debug!("Reminder {} already taken", reminder_id);
            return Ok(false);
        }
        reminder.taken = true;
        info!("Reminder {} ({}) marked as taken", reminder_id, reminder.medication);

        let display = self.config.timing.medication_display();
        self.notify(MEDICATION_TAKEN, display);
        Ok(true)
    }

    /// Open a help request; it connects to a volunteer after a fixed delay
    pub fn request_help(&mut self, topic: impl Into<String>) -> Uuid {
        let request = HelpRequest::new(topic);
        let id = request.id;
        info!("Help request {} opened: {}", id, request.topic);
        self.help_requests.push(request);

        self.timers
            .schedule_in(self.config.timing.help_connect_delay(), Timer::HelpConnected(id));
        let display = self.config.timing.help_connect_delay();
        self.notify(HELP_SEARCHING, display);
        id
    }

    /// Close a connected help request. `Ok(false)` unless it was connected.
    pub fn resolve_help(&mut self, request_id: Uuid) -> Result<bool> {
        let request = self
            .help_requests
            .iter_mut()
            .find(|request| request.id == request_id)
            .ok_or_else(|| KusiError::UnknownHelpRequest(request_id.to_string()))?;

        if request.status != HelpStatus::Connected {
            return Ok(false);
        }
        request.status = HelpStatus::Resolved;
        info!("Help request {} resolved", request_id);
        Ok(true)
    }

    // === Voice ===

    /// Show the greeting again and try to speak it at the greeting rate
    pub fn repeat_greeting(&mut self) -> bool {
        if !self.session.phase().is_idle() {
            debug!("Greeting repeat ignored in phase {}", self.session.phase());
            return false;
        }

        self.cancel_greeting();
        let timing = &self.config.timing;
        let display = if self.tts.is_supported() {
            timing.greeting_repeat_display()
        } else {
            timing.greeting_repeat_display() + timing.fallback_extension()
        };

        if self.tts.is_supported() {
            let rate = self.config.voice.greeting_rate;
            self.say(GREETING, rate);
        }
        self.set_subtitle(GREETING, Some(display));
        true
    }

    /// Speak the last announcement again, even with a voice error active
    pub fn retry_voice(&mut self) -> bool {
        if !self.tts.is_supported() {
            return false;
        }
        let Some((text, rate)) = self.last_announcement.clone() else {
            return false;
        };
        info!("Retrying voice output: {}", text);
        self.say(&text, rate);
        true
    }

    pub fn pause_voice(&mut self) {
        self.tts.pause();
    }

    pub fn resume_voice(&mut self) {
        self.tts.resume();
    }

    pub fn stop_voice(&mut self) {
        self.tts.stop();
    }

    /// Spoken output is attempted: supported and no non-benign error active
    pub fn voice_available(&self) -> bool {
        self.tts.is_supported() && !self.tts.has_active_error()
    }

    // === Navigation ===

    pub fn open_feature(&mut self, feature: Feature) {
        debug!("Feature opened: {:?}", feature);
        self.feature = Some(feature);
    }

    pub fn close_feature(&mut self) {
        self.feature = None;
    }

    pub fn set_online(&mut self, online: bool) {
        if self.is_online != online {
            info!("Connectivity: {}", if online { "online" } else { "offline" });
        }
        self.is_online = online;
    }

    // === Queries ===

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn subtitle(&self) -> &str {
        self.session.subtitle()
    }

    pub fn pending_action(&self) -> Option<&ActionDescriptor> {
        self.session.pending_action()
    }

    pub fn is_greeting_active(&self) -> bool {
        self.greeting_active
    }

    pub fn feature(&self) -> Option<Feature> {
        self.feature
    }

    pub fn is_online(&self) -> bool {
        self.is_online
    }

    pub fn data(&self) -> &ReferenceData {
        &self.data
    }

    pub fn help_requests(&self) -> &[HelpRequest] {
        &self.help_requests
    }

    pub fn help_request(&self, id: Uuid) -> Option<&HelpRequest> {
        self.help_requests.iter().find(|request| request.id == id)
    }

    /// Every confirmed call, oldest first
    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn tts(&self) -> &TtsWrapper {
        &self.tts
    }

    /// User-facing voice failure; never set for benign interruptions
    pub fn permission_error(&self) -> Option<&'static str> {
        if !self.tts.is_supported() {
            return TtsErrorKind::Unsupported.user_message();
        }
        self.tts.permission_error()
    }

    /// Latest voice failure kind; `Unsupported` without a speech engine
    pub fn last_voice_error(&self) -> Option<TtsErrorKind> {
        if !self.tts.is_supported() {
            return Some(TtsErrorKind::Unsupported);
        }
        self.tts.last_error()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = self.session.phase();
        let permission_error = self.permission_error();

        SessionSnapshot {
            phase,
            subtitle: self.session.subtitle().to_string(),
            pending_action: self.session.pending_action().cloned(),
            feature: self.feature,
            greeting_active: self.greeting_active,
            is_online: self.is_online,
            voice_supported: self.tts.is_supported(),
            is_speaking: self.tts.is_speaking(),
            is_paused: self.tts.is_paused(),
            has_permission: self.tts.has_permission(),
            last_voice_error: self.last_voice_error(),
            permission_error: permission_error.map(str::to_string),
            voice_notice: permission_error.map(|message| format!("{}. {}", message, RETRY_HINT)),
            can_press: phase.is_idle() && !self.greeting_active,
            can_confirm: phase == Phase::AwaitingConfirmation,
            call_in_progress: phase == Phase::Executing,
            calls_placed: self.calls.len(),
            reminders: self.data.reminders.clone(),
            help_requests: self.help_requests.clone(),
        }
    }

    // === Internals ===

    fn show_greeting(&mut self) {
        if !self.session.phase().is_idle() {
            debug!("Skipping startup greeting, phase is {}", self.session.phase());
            return;
        }

        self.greeting_active = true;
        if self.config.voice.speak_startup_greeting && self.voice_available() {
            let rate = self.config.voice.greeting_rate;
            self.say(GREETING, rate);
        }
        self.set_subtitle(GREETING, None);
        self.greeting_timer = Some(
            self.timers
                .schedule_in(self.config.timing.greeting_duration(), Timer::EndGreeting),
        );
        info!("Startup greeting shown");
    }

    fn cancel_greeting(&mut self) {
        if let Some(id) = self.greeting_timer.take() {
            self.timers.cancel(id);
        }
        self.greeting_active = false;
    }

    fn resolve_command(&mut self) {
        let Some(command) = self.interpreter.interpret() else {
            info!("Phase: Listening -> Idle (nothing understood)");
            self.session.reset();
            let display = self.config.timing.cancel_display();
            self.announce(NOT_UNDERSTOOD, Some(display));
            return;
        };
        info!("Command: \"{}\" -> {:?}", command.transcript, command.action);

        let action = command.action;
        if action.requires_confirmation() {
            let prompt = match &action {
                ActionDescriptor::Call { contact_id } => {
                    self.contact(contact_id).map(confirmation_prompt)
                }
                _ => Ok(String::new()),
            };
            match prompt {
                Ok(prompt) => {
                    self.session.await_confirmation(action);
                    info!("Phase: Listening -> AwaitingConfirmation");
                    self.announce(&prompt, None);
                }
                Err(e) => self.abandon_command(e),
            }
            return;
        }

        match self.information_for(&action) {
            Ok(text) => {
                self.session.begin_informing(&action);
                info!("Phase: Listening -> Informing");
                self.announce(&text, None);
                let display = self.display_time(self.config.timing.info_display());
                self.phase_timer = Some(self.timers.schedule_in(display, Timer::InformingElapsed));
            }
            Err(e) => self.abandon_command(e),
        }
    }

    fn abandon_command(&mut self, error: KusiError) {
        warn!("Command could not be carried out: {}", error);
        self.session.reset();
        let display = self.config.timing.cancel_display();
        self.announce(&error.user_message(), Some(display));
    }

    fn information_for(&self, action: &ActionDescriptor) -> Result<String> {
        match action {
            ActionDescriptor::PensionInfo => Ok(format!(
                "Tu pensión se deposita el {} de cada mes",
                self.data.pension.deposit_day
            )),
            ActionDescriptor::HealthInfo { reminder_id } => {
                let reminder = self
                    .data
                    .reminder(reminder_id)
                    .ok_or_else(|| KusiError::UnknownReminder(reminder_id.clone()))?;
                Ok(format!(
                    "Tomar {} a las {}",
                    lowercase_first(&reminder.medication),
                    reminder.time
                ))
            }
            ActionDescriptor::HelpRequest { .. } => Ok(HELP_CONNECTING.to_string()),
            ActionDescriptor::Call { contact_id } => {
                Err(KusiError::UnknownContact(contact_id.clone()))
            }
        }
    }

    fn execute(&mut self, action: ActionDescriptor) {
        match action {
            ActionDescriptor::Call { contact_id } => {
                let name = self
                    .data
                    .contact(&contact_id)
                    .map(|contact| contact.name.clone())
                    .unwrap_or_else(|| contact_id.clone());

                self.calls.push(CallRecord {
                    contact_id,
                    contact_name: name.clone(),
                    placed_at: Utc::now(),
                });
                info!("Calling {}", name);

                self.announce(&format!("Llamando a {}...", name), None);
                self.phase_timer = Some(
                    self.timers
                        .schedule_in(self.config.timing.call_duration(), Timer::CallElapsed),
                );
            }
            other => {
                // Only calls are gated; anything else falls back to Idle
                warn!("Nothing to execute for {:?}", other);
                self.session.reset();
            }
        }
    }

    fn finish_call(&mut self) {
        info!("Phase: Executing -> Idle (call finished)");
        self.session.reset();
        let display = self.display_time(self.config.timing.call_ended_display());
        self.say_if_available(CALL_ENDED);
        self.replace_subtitle_timer(CALL_ENDED, display, true);
    }

    fn connect_help(&mut self, request_id: Uuid) {
        let roster = &self.config.assistant.volunteers;
        let volunteer = if roster.is_empty() {
            warn!("No volunteers configured, assigning {}", FALLBACK_VOLUNTEER);
            FALLBACK_VOLUNTEER.to_string()
        } else {
            roster[self.next_volunteer % roster.len()].clone()
        };

        let Some(request) = self
            .help_requests
            .iter_mut()
            .find(|request| request.id == request_id && request.status == HelpStatus::Pending)
        else {
            return;
        };
        request.status = HelpStatus::Connected;
        request.volunteer = Some(volunteer.clone());
        self.next_volunteer += 1;
        info!("Help request {} connected with {}", request_id, volunteer);

        let display = self.config.timing.help_connected_display();
        self.notify(&format!("Conectado con {}", volunteer), display);
    }

    fn contact(&self, contact_id: &str) -> Result<&Contact> {
        self.data
            .contact(contact_id)
            .ok_or_else(|| KusiError::UnknownContact(contact_id.to_string()))
    }

    /// Side notice; shown only while Idle so the session's own text stays visible
    fn notify(&mut self, text: &str, display: Duration) {
        if !self.session.phase().is_idle() {
            debug!("Notice suppressed in phase {}: {}", self.session.phase(), text);
            return;
        }
        self.announce(text, Some(display));
    }

    /// Speak (when possible) and show `text`; `None` keeps it until replaced
    fn announce(&mut self, text: &str, display: Option<Duration>) {
        self.say_if_available(text);
        let display = display.map(|display| self.display_time(display));
        self.set_subtitle(text, display);
    }

    fn say_if_available(&mut self, text: &str) {
        let rate = self.config.voice.rate;
        self.last_announcement = Some((text.to_string(), rate));
        if self.voice_available() {
            self.say(text, rate);
        } else {
            debug!("Voice unavailable, subtitle only: {}", text);
        }
    }

    fn say(&mut self, text: &str, rate: f32) {
        match self.config.voice.utterance(text, rate) {
            Ok(request) => {
                self.last_announcement = Some((text.to_string(), rate));
                self.tts.speak(request);
            }
            Err(e) => warn!("Not speaking \"{}\": {}", text, e),
        }
    }

    /// Display duration, extended while voice output is unavailable
    fn display_time(&self, base: Duration) -> Duration {
        if self.voice_available() {
            base
        } else {
            base + self.config.timing.fallback_extension()
        }
    }

    fn set_subtitle(&mut self, text: &str, display: Option<Duration>) {
        match display {
            Some(display) => self.replace_subtitle_timer(text, display, false),
            None => {
                self.cancel_subtitle_timer();
                self.session.set_subtitle(text);
            }
        }
    }

    fn replace_subtitle_timer(&mut self, text: &str, display: Duration, close_feature: bool) {
        self.cancel_subtitle_timer();
        self.session.set_subtitle(text);
        self.subtitle_timer = Some(
            self.timers
                .schedule_in(display, Timer::ClearSubtitle { close_feature }),
        );
    }

    fn clear_subtitle(&mut self) {
        self.cancel_subtitle_timer();
        self.session.clear_subtitle();
    }

    fn cancel_subtitle_timer(&mut self) {
        if let Some(id) = self.subtitle_timer.take() {
            self.timers.cancel(id);
        }
    }

    fn cancel_phase_timer(&mut self) {
        if let Some(id) = self.phase_timer.take() {
            self.timers.cancel(id);
        }
    }
}

fn confirmation_prompt(contact: &Contact) -> String {
    format!("¿Quieres llamar a {}? Sí o No", contact.name)
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
