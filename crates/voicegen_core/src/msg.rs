use std::path::PathBuf;

use crate::{Device, GenerationId, Language, Phase, ProgressPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User edited the text to synthesize.
    TextChanged(String),
    /// User picked (or cleared) the voice reference sample.
    ReferenceSelected(Option<PathBuf>),
    /// "Play after generation" checkbox toggled.
    PlayToggled(bool),
    /// "Save to file" checkbox toggled.
    SaveToggled(bool),
    /// User edited the output filename box.
    FilenameChanged(String),
    /// Settings dialog accepted.
    SettingsChanged { device: Device, language: Language },
    ProgressPolicyChanged(ProgressPolicy),
    /// User clicked Generate.
    GenerateClicked,
    /// User aborted the running generation (Back / Cancel).
    CancelClicked,
    /// Coarse lifecycle milestone reported by the worker.
    WorkerProgress {
        generation: GenerationId,
        percent: u8,
        label: String,
    },
    /// Event classified from the engine's console output.
    Console {
        generation: GenerationId,
        signal: ConsoleSignal,
    },
    /// Settling ticker fired.
    SettlingTick { generation: GenerationId },
    /// Terminal event for a generation.
    GenerationFinished {
        generation: GenerationId,
        outcome: GenerationOutcome,
    },
    /// UI/render tick to coalesce rendering.
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleSignal {
    Progress {
        phase: Phase,
        percent: u8,
        label: String,
    },
    Warning(String),
    Error(String),
    Log(String),
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Succeeded {
        summary: String,
        output_path: Option<PathBuf>,
    },
    Failed {
        message: String,
    },
}
