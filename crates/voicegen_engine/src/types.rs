use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;

use crate::ClassifiedEvent;

pub type GenerationId = u64;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    Idle,
    Initializing,
    LoadingModel,
    PreparingText,
    Generating,
    PostProcessing,
    Playing,
    Saving,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStage {
    /// Coarse milestone reported when the stage is entered, if any.
    pub fn milestone(self) -> Option<(u8, &'static str)> {
        match self {
            GenerationStage::Initializing => Some((5, "Starting...")),
            GenerationStage::LoadingModel => Some((15, "Loading TTS model...")),
            GenerationStage::PreparingText => Some((25, "Preparing text...")),
            GenerationStage::PostProcessing => Some((85, "Processing results...")),
            GenerationStage::Playing => Some((90, "Playing audio...")),
            GenerationStage::Saving => Some((95, "Saving file...")),
            GenerationStage::Completed => Some((100, "Generation complete!")),
            GenerationStage::Idle
            | GenerationStage::Generating
            | GenerationStage::Failed
            | GenerationStage::Cancelled => None,
        }
    }
}

/// Immutable input of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    pub id: GenerationId,
    pub text: String,
    pub reference_audio: Option<PathBuf>,
    pub play_after: bool,
    /// Output file name without extension; `None` when not saving.
    pub save_as: Option<String>,
    pub device: String,
    pub language: String,
}

/// Side effects a successful run completed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationSummary {
    pub played: bool,
    pub saved_path: Option<PathBuf>,
}

impl fmt::Display for GenerationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(2);
        if self.played {
            parts.push("Audio played.".to_string());
        }
        if let Some(name) = self.saved_path.as_ref().and_then(|p| p.file_name()) {
            parts.push(format!("File saved as: {}", name.to_string_lossy()));
        }
        f.write_str(&parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Milestone {
        generation: GenerationId,
        stage: GenerationStage,
        percent: u8,
        label: String,
    },
    Console {
        generation: GenerationId,
        event: ClassifiedEvent,
    },
    Finished {
        generation: GenerationId,
        result: Result<GenerationSummary, String>,
    },
}

impl WorkerEvent {
    pub fn generation(&self) -> GenerationId {
        match self {
            WorkerEvent::Milestone { generation, .. }
            | WorkerEvent::Console { generation, .. }
            | WorkerEvent::Finished { generation, .. } => *generation,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkerEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<WorkerEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<WorkerEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }
}
