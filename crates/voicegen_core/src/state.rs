use std::collections::VecDeque;
use std::path::PathBuf;

use crate::view_model::{AppViewModel, ProgressView};
use crate::{NoticeSeverity, ProgressPolicy, ProgressState, RequestForm, CONSOLE_LOG_LIMIT};

pub type GenerationId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationStatus {
    #[default]
    Idle,
    Running,
    Succeeded {
        summary: String,
        output_path: Option<PathBuf>,
    },
    Failed {
        message: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub severity: ConsoleSeverity,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub message: String,
}

/// The one generation currently subscribed to worker and console events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveGeneration {
    pub(crate) id: GenerationId,
    pub(crate) settling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub(crate) form: RequestForm,
    pub(crate) policy: ProgressPolicy,
    pub(crate) active: Option<ActiveGeneration>,
    last_generation: GenerationId,
    pub(crate) progress: Option<ProgressState>,
    pub(crate) status: GenerationStatus,
    console: VecDeque<ConsoleLine>,
    pub(crate) notice: Option<Notice>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn form(&self) -> &RequestForm {
        &self.form
    }

    pub fn policy(&self) -> ProgressPolicy {
        self.policy
    }

    /// Id of the generation currently in flight, if any.
    pub fn active_generation(&self) -> Option<GenerationId> {
        self.active.map(|active| active.id)
    }

    pub fn is_settling(&self) -> bool {
        self.active.is_some_and(|active| active.settling)
    }

    pub fn status(&self) -> &GenerationStatus {
        &self.status
    }

    pub fn view(&self) -> AppViewModel {
        let idle = self.active.is_none();
        let progress = self.progress.as_ref().map(|progress| ProgressView {
            percent: progress.percent,
            text: if self.status == GenerationStatus::Running {
                format!("{} ({}%)", progress.label, progress.percent)
            } else {
                progress.label.clone()
            },
        });
        AppViewModel {
            status: self.status.clone(),
            controls_enabled: idle,
            generate_enabled: idle,
            filename_enabled: idle && self.form.save_to_file(),
            play_after: self.form.play_after(),
            save_to_file: self.form.save_to_file(),
            progress,
            console: self.console.iter().cloned().collect(),
            notice: self.notice.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn is_active(&self, generation: GenerationId) -> bool {
        self.active_generation() == Some(generation)
    }

    pub(crate) fn start_generation(&mut self) -> GenerationId {
        self.last_generation += 1;
        let id = self.last_generation;
        self.active = Some(ActiveGeneration {
            id,
            settling: false,
        });
        self.progress = Some(ProgressState::new(0, "Preparing..."));
        self.status = GenerationStatus::Running;
        self.console.clear();
        self.notice = None;
        self.mark_dirty();
        id
    }

    /// Drops the subscription. Returns the id and whether a settling ticker was running.
    pub(crate) fn end_generation(&mut self) -> Option<(GenerationId, bool)> {
        let active = self.active.take()?;
        self.mark_dirty();
        Some((active.id, active.settling))
    }

    pub(crate) fn set_settling(&mut self, settling: bool) {
        if let Some(active) = self.active.as_mut() {
            active.settling = settling;
        }
    }

    pub(crate) fn push_console(&mut self, severity: ConsoleSeverity, text: String) {
        if self.console.len() == CONSOLE_LOG_LIMIT {
            self.console.pop_front();
        }
        self.console.push_back(ConsoleLine { severity, text });
        self.mark_dirty();
    }
}
