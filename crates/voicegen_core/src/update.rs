use crate::{
    remap, AppState, ConsoleSeverity, ConsoleSignal, Effect, GenerationId, GenerationOutcome,
    GenerationStatus, Msg, Notice, NoticeSeverity, ProgressState, RequestForm, CANCEL_WAIT,
    SETTLE_INTERVAL,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::TextChanged(text) => edit_form(&mut state, |form| form.set_text(text)),
        Msg::ReferenceSelected(reference) => {
            edit_form(&mut state, |form| form.set_reference(reference))
        }
        Msg::PlayToggled(on) => edit_form(&mut state, |form| form.set_play(on)),
        Msg::SaveToggled(on) => edit_form(&mut state, |form| form.set_save(on)),
        Msg::FilenameChanged(name) => edit_form(&mut state, |form| form.set_filename(name)),
        Msg::SettingsChanged { device, language } => edit_form(&mut state, |form| {
            form.device = device;
            form.language = language;
        }),
        Msg::ProgressPolicyChanged(policy) => {
            if state.active.is_none() {
                state.policy = policy;
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::GenerateClicked => start_generation(&mut state),
        Msg::CancelClicked => match state.end_generation() {
            Some((generation, settling)) => {
                state.status = GenerationStatus::Cancelled;
                if let Some(progress) = state.progress.as_mut() {
                    progress.label = "Cancelled".to_string();
                }
                let mut effects = Vec::with_capacity(2);
                if settling {
                    effects.push(Effect::StopSettlingTicker { generation });
                }
                effects.push(Effect::CancelGeneration {
                    generation,
                    wait: CANCEL_WAIT,
                });
                effects
            }
            None => Vec::new(),
        },
        Msg::WorkerProgress {
            generation,
            percent,
            label,
        } => {
            if state.is_active(generation) {
                let policy = state.policy;
                progress_mut(&mut state).apply(policy, percent, label);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Console { generation, signal } => {
            if state.is_active(generation) {
                apply_console(&mut state, generation, signal)
            } else {
                Vec::new()
            }
        }
        Msg::SettlingTick { generation } => {
            if state.is_active(generation) && state.is_settling() {
                let reached_end = progress_mut(&mut state).settle_step();
                state.mark_dirty();
                if reached_end {
                    state.set_settling(false);
                    vec![Effect::StopSettlingTicker { generation }]
                } else {
                    Vec::new()
                }
            } else {
                Vec::new()
            }
        }
        Msg::GenerationFinished {
            generation,
            outcome,
        } => {
            if state.is_active(generation) {
                finish_generation(&mut state, outcome)
            } else {
                Vec::new()
            }
        }
        Msg::Tick => Vec::new(),
    };

    (state, effects)
}

/// Form edits are ignored while a generation runs; the controls are disabled.
fn edit_form(state: &mut AppState, edit: impl FnOnce(&mut RequestForm)) -> Vec<Effect> {
    if state.active.is_none() {
        edit(&mut state.form);
        state.mark_dirty();
    }
    Vec::new()
}

fn start_generation(state: &mut AppState) -> Vec<Effect> {
    if state.active.is_some() {
        return Vec::new();
    }
    match state.form.validate() {
        Ok(request) => {
            let generation = state.start_generation();
            vec![Effect::StartGeneration {
                generation,
                request,
            }]
        }
        Err(err) => {
            let message = err.to_string();
            state.notice = Some(Notice {
                severity: NoticeSeverity::Warning,
                message: message.clone(),
            });
            state.mark_dirty();
            vec![Effect::ShowNotice {
                severity: NoticeSeverity::Warning,
                message,
            }]
        }
    }
}

fn apply_console(
    state: &mut AppState,
    generation: GenerationId,
    signal: ConsoleSignal,
) -> Vec<Effect> {
    match signal {
        ConsoleSignal::Progress {
            phase,
            percent,
            label,
        } => {
            let policy = state.policy;
            progress_mut(state).apply(policy, remap(phase, percent), label);
            state.mark_dirty();
            Vec::new()
        }
        ConsoleSignal::Complete => {
            let policy = state.policy;
            let start = progress_mut(state).begin_settling(policy);
            state.mark_dirty();
            if start < 100 {
                state.set_settling(true);
                vec![Effect::StartSettlingTicker {
                    generation,
                    interval: SETTLE_INTERVAL,
                }]
            } else {
                Vec::new()
            }
        }
        ConsoleSignal::Warning(text) => {
            state.push_console(ConsoleSeverity::Warning, text);
            Vec::new()
        }
        ConsoleSignal::Error(text) => {
            state.push_console(ConsoleSeverity::Error, text);
            Vec::new()
        }
        ConsoleSignal::Log(text) => {
            state.push_console(ConsoleSeverity::Info, text);
            Vec::new()
        }
    }
}

fn finish_generation(state: &mut AppState, outcome: GenerationOutcome) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(2);
    if let Some((generation, settling)) = state.end_generation() {
        if settling {
            effects.push(Effect::StopSettlingTicker { generation });
        }
    }

    let (label, status, notice) = match outcome {
        GenerationOutcome::Succeeded {
            summary,
            output_path,
        } => (
            "Done",
            GenerationStatus::Succeeded {
                summary: summary.clone(),
                output_path,
            },
            Notice {
                severity: NoticeSeverity::Information,
                message: summary,
            },
        ),
        GenerationOutcome::Failed { message } => (
            "Error",
            GenerationStatus::Failed {
                message: message.clone(),
            },
            Notice {
                severity: NoticeSeverity::Error,
                message,
            },
        ),
    };
    state.progress = Some(ProgressState::new(100, label));
    state.status = status;
    effects.push(Effect::ShowNotice {
        severity: notice.severity,
        message: notice.message.clone(),
    });
    state.notice = Some(notice);
    effects
}

fn progress_mut(state: &mut AppState) -> &mut ProgressState {
    state.progress.get_or_insert_with(ProgressState::default)
}
