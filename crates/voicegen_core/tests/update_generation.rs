use std::sync::Once;

use pretty_assertions::assert_eq;
use voicegen_core::{
    update, AppState, ConsoleSeverity, ConsoleSignal, Effect, GenerationId, GenerationOutcome,
    GenerationStatus, Msg, NoticeSeverity, Phase, ProgressPolicy, CANCEL_WAIT, SETTLE_INTERVAL,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn started(policy: ProgressPolicy) -> (AppState, GenerationId) {
    let (state, _) = update(AppState::new(), Msg::ProgressPolicyChanged(policy));
    let (state, _) = update(state, Msg::TextChanged("Hello there".to_string()));
    let (state, _) = update(state, Msg::GenerateClicked);
    let generation = state.active_generation().expect("generation started");
    (state, generation)
}

fn console(
    state: AppState,
    generation: GenerationId,
    signal: ConsoleSignal,
) -> (AppState, Vec<Effect>) {
    update(state, Msg::Console { generation, signal })
}

fn sampling(percent: u8) -> ConsoleSignal {
    ConsoleSignal::Progress {
        phase: Phase::Sampling,
        percent,
        label: format!("Generating speech: {percent}%"),
    }
}

fn percent(state: &AppState) -> u8 {
    state.view().progress.expect("progress").percent
}

#[test]
fn console_progress_is_remapped_per_phase() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);

    let (state, _) = console(
        state,
        generation,
        ConsoleSignal::Progress {
            phase: Phase::Fetching,
            percent: 100,
            label: "Downloading files: 100%".to_string(),
        },
    );
    assert_eq!(percent(&state), 25);
    assert_eq!(
        state.view().progress.unwrap().text,
        "Downloading files: 100% (25%)"
    );

    let (state, _) = console(state, generation, sampling(12));
    assert_eq!(percent(&state), 32);

    let (state, _) = console(
        state,
        generation,
        ConsoleSignal::Progress {
            phase: Phase::Other,
            percent: 7,
            label: "Processing: 7%".to_string(),
        },
    );
    assert_eq!(percent(&state), 7);
}

#[test]
fn worker_milestones_and_console_progress_share_last_write() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, generation, sampling(100));
    assert_eq!(percent(&state), 85);

    let (state, _) = update(
        state,
        Msg::WorkerProgress {
            generation,
            percent: 25,
            label: "Preparing text...".to_string(),
        },
    );
    assert_eq!(percent(&state), 25);
}

#[test]
fn monotonic_policy_never_moves_backward() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::Monotonic);
    let (state, _) = console(state, generation, sampling(100));
    let (state, _) = update(
        state,
        Msg::WorkerProgress {
            generation,
            percent: 25,
            label: "Preparing text...".to_string(),
        },
    );
    assert_eq!(percent(&state), 85);

    let (state, effects) = console(state, generation, ConsoleSignal::Complete);
    assert_eq!(percent(&state), 85);
    assert_eq!(
        effects,
        vec![Effect::StartSettlingTicker {
            generation,
            interval: SETTLE_INTERVAL,
        }]
    );
}

#[test]
fn completion_settles_from_80_to_100_then_halts() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, generation, sampling(40));

    let (mut state, effects) = console(state, generation, ConsoleSignal::Complete);
    assert_eq!(
        effects,
        vec![Effect::StartSettlingTicker {
            generation,
            interval: SETTLE_INTERVAL,
        }]
    );
    assert_eq!(percent(&state), 80);
    assert!(state.is_settling());
    assert_eq!(
        state.view().progress.unwrap().text,
        "Preparing playback... (80%)"
    );

    let mut expected = 80;
    let mut stop_effects = Vec::new();
    for _ in 0..20 {
        let (next, effects) = update(state, Msg::SettlingTick { generation });
        state = next;
        expected += 1;
        assert_eq!(percent(&state), expected);
        stop_effects.extend(effects);
    }
    assert_eq!(percent(&state), 100);
    assert_eq!(stop_effects, vec![Effect::StopSettlingTicker { generation }]);
    assert!(!state.is_settling());

    // A late tick neither exceeds 100 nor restarts anything.
    let (state, effects) = update(state, Msg::SettlingTick { generation });
    assert!(effects.is_empty());
    assert_eq!(percent(&state), 100);
}

#[test]
fn ticks_without_completion_are_ignored() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, generation, sampling(50));
    let before = percent(&state);
    let (state, effects) = update(state, Msg::SettlingTick { generation });
    assert!(effects.is_empty());
    assert_eq!(percent(&state), before);
}

#[test]
fn fresh_completion_restarts_settling_at_80() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, generation, ConsoleSignal::Complete);
    let (state, _) = update(state, Msg::SettlingTick { generation });
    let (state, _) = update(state, Msg::SettlingTick { generation });
    assert_eq!(percent(&state), 82);

    let (state, effects) = console(state, generation, ConsoleSignal::Complete);
    assert_eq!(percent(&state), 80);
    assert_eq!(effects.len(), 1);
}

#[test]
fn console_lines_are_collected_by_severity() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, generation, ConsoleSignal::Warning("UserWarning: x".into()));
    let (state, _) = console(state, generation, ConsoleSignal::Error("Error: y".into()));
    let (state, _) = console(state, generation, ConsoleSignal::Log("Loading model".into()));

    let severities: Vec<_> = state.view().console.iter().map(|l| l.severity).collect();
    assert_eq!(
        severities,
        vec![
            ConsoleSeverity::Warning,
            ConsoleSeverity::Error,
            ConsoleSeverity::Info
        ]
    );
}

#[test]
fn success_finishes_and_reenables_controls() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, generation, ConsoleSignal::Complete);

    let (state, effects) = update(
        state,
        Msg::GenerationFinished {
            generation,
            outcome: GenerationOutcome::Succeeded {
                summary: "Audio played.".to_string(),
                output_path: None,
            },
        },
    );
    assert_eq!(
        effects,
        vec![
            Effect::StopSettlingTicker { generation },
            Effect::ShowNotice {
                severity: NoticeSeverity::Information,
                message: "Audio played.".to_string(),
            },
        ]
    );
    let view = state.view();
    assert!(view.generate_enabled);
    assert!(view.controls_enabled);
    assert_eq!(view.progress.unwrap().text, "Done");
    assert_eq!(
        view.status,
        GenerationStatus::Succeeded {
            summary: "Audio played.".to_string(),
            output_path: None,
        }
    );

    // Events after the terminal event are not applied.
    let before = state.clone();
    let (state, effects) = console(state, generation, sampling(10));
    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn failure_shows_error_notice() {
    init_logging();
    let (state, generation) = started(ProgressPolicy::LastWriteWins);
    let (state, effects) = update(
        state,
        Msg::GenerationFinished {
            generation,
            outcome: GenerationOutcome::Failed {
                message: "Generation failed: boom".to_string(),
            },
        },
    );
    assert_eq!(
        effects,
        vec![Effect::ShowNotice {
            severity: NoticeSeverity::Error,
            message: "Generation failed: boom".to_string(),
        }]
    );
    let view = state.view();
    let progress = view.progress.unwrap();
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.text, "Error");
}

#[test]
fn cancel_then_restart_ignores_stray_events_from_cancelled_worker() {
    init_logging();
    let (state, first) = started(ProgressPolicy::LastWriteWins);
    let (state, _) = console(state, first, ConsoleSignal::Complete);

    let (state, effects) = update(state, Msg::CancelClicked);
    assert_eq!(
        effects,
        vec![
            Effect::StopSettlingTicker { generation: first },
            Effect::CancelGeneration {
                generation: first,
                wait: CANCEL_WAIT,
            },
        ]
    );
    assert_eq!(state.status(), &GenerationStatus::Cancelled);
    assert!(state.view().generate_enabled);

    let (state, effects) = update(state, Msg::GenerateClicked);
    let second = state.active_generation().expect("second generation");
    assert_ne!(first, second);
    assert!(matches!(
        effects.as_slice(),
        [Effect::StartGeneration { generation, .. }] if *generation == second
    ));
    assert_eq!(percent(&state), 0);

    let before = state.clone();
    let (state, _) = console(state, first, sampling(90));
    let (state, _) = update(state, Msg::SettlingTick { generation: first });
    let (state, _) = update(
        state,
        Msg::WorkerProgress {
            generation: first,
            percent: 95,
            label: "Saving file...".to_string(),
        },
    );
    let (state, _) = update(
        state,
        Msg::GenerationFinished {
            generation: first,
            outcome: GenerationOutcome::Failed {
                message: "late".to_string(),
            },
        },
    );
    assert_eq!(state, before);
    assert_eq!(state.active_generation(), Some(second));
}

#[test]
fn cancel_when_idle_does_nothing() {
    init_logging();
    let (state, effects) = update(AppState::new(), Msg::CancelClicked);
    assert!(effects.is_empty());
    assert_eq!(state, AppState::new());
}
