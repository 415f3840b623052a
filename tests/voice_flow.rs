//! End-to-end voice interaction flows on the virtual clock
//!
//! These tests drive the controller through its public API with a scripted
//! speech engine and a scripted interpreter, stepping time explicitly.

use kusi_voz::data::{HelpStatus, ReferenceData};
use kusi_voz::integration::controller::{CALL_CANCELLED, CALL_ENDED, LISTENING, MEDICATION_TAKEN};
use kusi_voz::integration::{AssistantConfig, VoiceController};
use kusi_voz::speech::{
    codes, default_commands, Command, EngineCall, RandomInterpreter, ScriptedEngine,
    ScriptedEngineProbe, ScriptedInterpreter, TtsWrapper, DEFAULT_SETTLE_DELAY,
};
use kusi_voz::state::{ActionDescriptor, Phase};
use std::time::Duration;

const PENSION_TEXT: &str = "Tu pensión se deposita el 15 de cada mes";

fn call_son() -> Command {
    Command::new(
        "Quiero llamar a mi hijo",
        ActionDescriptor::Call {
            contact_id: "1".to_string(),
        },
    )
}

fn pension() -> Command {
    Command::new("¿Cuándo cobro mi pensión?", ActionDescriptor::PensionInfo)
}

fn scripted(script: Vec<Command>) -> (VoiceController, ScriptedEngineProbe) {
    let (engine, probe) = ScriptedEngine::new();
    let controller = VoiceController::new(
        AssistantConfig::default(),
        ReferenceData::fixtures(),
        TtsWrapper::new(Box::new(engine), DEFAULT_SETTLE_DELAY),
        Box::new(ScriptedInterpreter::new(script)),
    );
    (controller, probe)
}

/// Step past the startup greeting window
fn skip_greeting(controller: &mut VoiceController) {
    controller.advance(Duration::from_secs(7));
}

#[test]
fn test_call_requires_confirmation() {
    let (mut controller, _probe) = scripted(vec![call_son()]);
    skip_greeting(&mut controller);

    assert!(controller.press());
    controller.advance(Duration::from_secs(2));

    assert_eq!(controller.phase(), Phase::AwaitingConfirmation);
    assert_eq!(
        controller.subtitle(),
        "¿Quieres llamar a Carlos Quispe? Sí o No"
    );
    assert!(controller.calls().is_empty());

    let snapshot = controller.snapshot();
    assert!(snapshot.can_confirm);
    assert!(!snapshot.can_press);

    // Waiting does not place the call
    controller.advance(Duration::from_secs(30));
    assert_eq!(controller.phase(), Phase::AwaitingConfirmation);
    assert!(controller.calls().is_empty());

    assert!(controller.confirm(true));
    assert_eq!(controller.phase(), Phase::Executing);
    assert!(controller.pending_action().is_none());
    assert_eq!(controller.subtitle(), "Llamando a Carlos Quispe...");
    assert_eq!(controller.calls().len(), 1);
    assert_eq!(controller.calls()[0].contact_id, "1");
    assert!(controller.snapshot().call_in_progress);

    // Call runs for its simulated duration, then the cycle closes
    controller.advance(Duration::from_secs(5));
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.subtitle(), CALL_ENDED);

    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.subtitle(), "");
    assert!(controller.press());
}

#[test]
fn test_denied_call_returns_to_idle_without_calling() {
    let (mut controller, _probe) = scripted(vec![call_son()]);
    skip_greeting(&mut controller);

    controller.press();
    controller.advance(Duration::from_secs(2));
    assert!(controller.confirm(false));

    assert_eq!(controller.phase(), Phase::Idle);
    assert!(controller.pending_action().is_none());
    assert!(controller.calls().is_empty());
    assert_eq!(controller.subtitle(), CALL_CANCELLED);

    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.subtitle(), "");

    // A late confirmation finds nothing pending
    assert!(!controller.confirm(true));
    assert!(controller.calls().is_empty());
}

#[test]
fn test_gestures_dropped_while_cycle_in_flight() {
    let (mut controller, _probe) = scripted(vec![pension(), pension()]);
    skip_greeting(&mut controller);

    assert!(controller.press());
    assert!(!controller.press());
    assert!(!controller.confirm(true));
    assert_eq!(controller.phase(), Phase::Listening);
    assert_eq!(controller.subtitle(), LISTENING);

    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.phase(), Phase::Informing);
    assert!(!controller.press());

    controller.advance(Duration::from_secs(4));
    assert_eq!(controller.phase(), Phase::Idle);
    assert!(controller.press());
}

#[test]
fn test_new_announcement_supersedes_current_speech() {
    let (mut controller, probe) = scripted(vec![pension()]);
    skip_greeting(&mut controller);

    controller.press();
    probe.start();
    controller.advance(Duration::from_millis(10));
    assert!(controller.tts().is_speaking());

    controller.advance(Duration::from_secs(2));
    controller.advance(Duration::from_millis(100));

    let calls = probe.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], EngineCall::Speak { text, .. } if text == LISTENING));
    assert_eq!(calls[1], EngineCall::Cancel);
    assert!(matches!(&calls[2], EngineCall::Speak { text, .. } if text == PENSION_TEXT));

    let session = controller.tts().session().unwrap();
    assert_eq!(session.text(), PENSION_TEXT);
    assert_eq!(Some(session.id()), probe.current());

    // The interruption of the first utterance stays invisible
    let snapshot = controller.snapshot();
    assert!(snapshot.last_voice_error.map_or(true, |kind| kind.is_benign()));
    assert_eq!(snapshot.permission_error, None);
    assert_eq!(snapshot.voice_notice, None);
    assert!(controller.voice_available());
}

#[test]
fn test_stop_voice_twice() {
    let (mut controller, probe) = scripted(vec![pension()]);
    skip_greeting(&mut controller);

    controller.press();
    probe.start();
    controller.advance(Duration::from_millis(10));
    controller.pause_voice();
    assert!(controller.snapshot().is_paused);

    controller.stop_voice();
    controller.stop_voice();

    let snapshot = controller.snapshot();
    assert!(!snapshot.is_speaking);
    assert!(!snapshot.is_paused);
    assert_eq!(snapshot.permission_error, None);
    // Stopping speech does not touch the interaction cycle
    assert_eq!(snapshot.phase, Phase::Listening);
}

#[test]
fn test_mark_taken_twice() {
    let (mut controller, _probe) = scripted(Vec::new());
    skip_greeting(&mut controller);

    assert_eq!(controller.mark_taken("2"), Ok(true));
    assert_eq!(controller.subtitle(), MEDICATION_TAKEN);

    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.subtitle(), "");

    assert_eq!(controller.mark_taken("2"), Ok(false));
    assert_eq!(controller.subtitle(), "");
    assert!(controller.data().reminder("2").unwrap().taken);
    assert_eq!(
        controller.data().reminders.iter().filter(|r| r.taken).count(),
        1
    );

    assert!(controller.mark_taken("99").is_err());
}

#[test]
fn test_help_request_connects_independently_of_phase() {
    let (mut controller, _probe) = scripted(vec![call_son()]);
    skip_greeting(&mut controller);

    controller.press();
    let id = controller.request_help("Consulta general");
    assert_eq!(controller.help_request(id).unwrap().status, HelpStatus::Pending);
    assert!(controller.help_request(id).unwrap().volunteer.is_none());
    // Help notices never hide the cycle's own prompts
    assert_eq!(controller.subtitle(), LISTENING);

    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.phase(), Phase::AwaitingConfirmation);

    controller.advance(Duration::from_secs(1));
    let request = controller.help_request(id).unwrap();
    assert_eq!(request.status, HelpStatus::Connected);
    assert_eq!(request.volunteer.as_deref(), Some("Juan Pérez"));

    // The main cycle is untouched
    assert_eq!(controller.phase(), Phase::AwaitingConfirmation);
    assert_eq!(
        controller.pending_action(),
        Some(&ActionDescriptor::Call {
            contact_id: "1".to_string()
        })
    );
    assert_eq!(
        controller.subtitle(),
        "¿Quieres llamar a Carlos Quispe? Sí o No"
    );
}

#[test]
fn test_help_connecting_during_informing_keeps_answer() {
    let (mut controller, probe) = scripted(vec![pension()]);
    skip_greeting(&mut controller);

    controller.press();
    controller.advance(Duration::from_secs(1));
    let id = controller.request_help("Consulta general");

    controller.advance(Duration::from_secs(3));
    assert_eq!(controller.help_request(id).unwrap().status, HelpStatus::Connected);
    assert_eq!(controller.phase(), Phase::Informing);
    assert_eq!(controller.subtitle(), PENSION_TEXT);

    controller.advance(Duration::from_millis(1500));
    assert_eq!(controller.phase(), Phase::Informing);
    assert_eq!(controller.subtitle(), PENSION_TEXT);
    assert_eq!(
        probe.spoken_texts(),
        vec![LISTENING.to_string(), PENSION_TEXT.to_string()]
    );

    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.subtitle(), "");
}

#[test]
fn test_help_request_while_idle_shows_progress() {
    let (mut controller, _probe) = scripted(Vec::new());
    skip_greeting(&mut controller);

    let id = controller.request_help("Consulta general");
    assert_eq!(controller.subtitle(), "Buscando Nieto Digital disponible...");

    controller.advance(Duration::from_secs(3));
    assert_eq!(controller.subtitle(), "Conectado con Juan Pérez");
    assert_eq!(controller.snapshot().help_requests[0].id, id);

    controller.advance(Duration::from_secs(3));
    assert_eq!(controller.subtitle(), "");
}

#[test]
fn test_voice_failure_degrades_to_subtitles() {
    let (mut controller, probe) = scripted(vec![pension()]);
    skip_greeting(&mut controller);

    controller.press();
    probe.fail(codes::NOT_ALLOWED);
    controller.advance(Duration::from_secs(2));

    // The action is carried out, on screen only
    assert_eq!(controller.phase(), Phase::Informing);
    assert_eq!(controller.subtitle(), PENSION_TEXT);
    assert_eq!(probe.spoken_texts(), vec![LISTENING.to_string()]);

    let snapshot = controller.snapshot();
    assert_eq!(
        snapshot.permission_error.as_deref(),
        Some("Se requiere permiso del usuario para reproducir audio")
    );
    assert!(snapshot
        .voice_notice
        .as_deref()
        .unwrap()
        .contains("Repetir"));

    // Longer on-screen time without voice
    controller.advance(Duration::from_secs(4));
    assert_eq!(controller.phase(), Phase::Informing);
    controller.advance(Duration::from_secs(2));
    assert_eq!(controller.phase(), Phase::Idle);

    // Retry re-speaks the latest announcement and a successful start clears the error
    assert!(controller.retry_voice());
    assert_eq!(
        probe.spoken_texts(),
        vec![LISTENING.to_string(), PENSION_TEXT.to_string()]
    );
    probe.start();
    controller.advance(Duration::from_millis(10));
    assert!(controller.voice_available());
    assert_eq!(controller.snapshot().permission_error, None);
}

#[test]
fn test_random_interpreter_end_to_end() {
    for seed in 0..16 {
        let (engine, _probe) = ScriptedEngine::new();
        let mut controller = VoiceController::new(
            AssistantConfig::default(),
            ReferenceData::fixtures(),
            TtsWrapper::new(Box::new(engine), DEFAULT_SETTLE_DELAY),
            Box::new(RandomInterpreter::with_seed(default_commands(), seed)),
        );
        skip_greeting(&mut controller);

        assert!(controller.press());
        controller.advance(Duration::from_secs(2));

        match controller.phase() {
            Phase::AwaitingConfirmation => {
                assert!(controller.pending_action().is_some());
                assert!(controller.confirm(false));
            }
            Phase::Informing => assert!(controller.pending_action().is_none()),
            other => panic!("unexpected phase {} for seed {}", other, seed),
        }

        // Back to Idle within the longest display time
        controller.advance(Duration::from_secs(4));
        assert_eq!(controller.phase(), Phase::Idle, "seed {}", seed);
        assert!(controller.pending_action().is_none());
        assert!(controller.calls().is_empty());
    }
}

#[test]
fn test_snapshot_reflects_controller() {
    let (mut controller, _probe) = scripted(Vec::new());
    controller.set_online(false);
    controller.open_feature(kusi_voz::data::Feature::Health);

    let snapshot = controller.snapshot();
    assert!(!snapshot.is_online);
    assert_eq!(snapshot.feature, Some(kusi_voz::data::Feature::Health));
    assert!(snapshot.voice_supported);
    assert_eq!(snapshot.reminders.len(), 3);

    controller.close_feature();
    assert_eq!(controller.snapshot().feature, None);
}
