use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use engine_logging::{engine_error, engine_info, engine_warn, GenerationLogScope};
use thiserror::Error;

use crate::audio::Synthesis;
use crate::capture::{CaptureError, CaptureSession};
use crate::filename::wav_filename;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::playback::{AudioPlayer, PlaybackError};
use crate::synth::{EngineError, SpeechEngine, SynthesisOptions};
use crate::{EventSink, GenerationJob, GenerationStage, GenerationSummary, WorkerEvent};

/// Cooperative cancellation flag shared between the controller and one worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Engine(#[from] EngineError),
    #[error("Generation failed: the engine produced no audio")]
    EmptyAudio,
    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),
    #[error("Saving failed: {0}")]
    Save(#[from] PersistError),
    #[error("Console capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("Generation failed: worker panicked: {0}")]
    Panicked(String),
}

/// Runs one [`GenerationJob`] through the generation stages.
pub struct GenerationWorker {
    job: GenerationJob,
    engine: Box<dyn SpeechEngine>,
    player: Box<dyn AudioPlayer>,
    output_dir: PathBuf,
    capture_console: bool,
    cancel: CancelToken,
    sink: Arc<dyn EventSink>,
    stage: GenerationStage,
}

impl GenerationWorker {
    pub fn new(
        job: GenerationJob,
        engine: Box<dyn SpeechEngine>,
        player: Box<dyn AudioPlayer>,
        output_dir: PathBuf,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            job,
            engine,
            player,
            output_dir,
            capture_console: true,
            cancel: CancelToken::new(),
            sink,
            stage: GenerationStage::Idle,
        }
    }

    /// Disable process-wide console capture for this run.
    pub fn without_console_capture(mut self) -> Self {
        self.capture_console = false;
        self
    }

    /// Use a token created by the caller instead of a fresh one.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn job(&self) -> &GenerationJob {
        &self.job
    }

    /// Execute the job and return the final stage.
    ///
    /// Emits exactly one `Finished` event unless cancelled, in which case the
    /// worker stops silently. Console capture is released before `Finished`.
    pub fn run(mut self) -> GenerationStage {
        let generation = self.job.id;
        let _scope = GenerationLogScope::enter(generation);
        engine_info!("generation started");

        let outcome = match self.start_capture() {
            Ok(capture) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_steps()))
                    .unwrap_or_else(|payload| {
                        Err(GenerationError::Panicked(panic_text(&*payload)))
                    });
                if let Some(capture) = capture {
                    if let Err(err) = capture.stop() {
                        engine_warn!("failed to restore console streams: {}", err);
                    }
                }
                outcome
            }
            Err(err) => Err(err),
        };

        if self.cancel.is_cancelled() {
            engine_info!("generation cancelled during {:?}", self.stage);
            self.stage = GenerationStage::Cancelled;
            return self.stage;
        }

        let result = match outcome {
            Ok(Some(summary)) => {
                engine_info!("generation finished: {}", summary);
                self.stage = GenerationStage::Completed;
                Ok(summary)
            }
            Ok(None) => {
                self.stage = GenerationStage::Cancelled;
                return self.stage;
            }
            Err(err) => {
                engine_error!("generation failed during {:?}: {}", self.stage, err);
                self.stage = GenerationStage::Failed;
                Err(err.to_string())
            }
        };
        self.sink.emit(WorkerEvent::Finished { generation, result });
        self.stage
    }

    fn start_capture(&self) -> Result<Option<CaptureSession>, GenerationError> {
        if !self.capture_console {
            return Ok(None);
        }
        match CaptureSession::start(self.job.id, self.sink.clone()) {
            Ok(session) => Ok(Some(session)),
            Err(CaptureError::Unsupported) => {
                engine_warn!("console capture unsupported; progress will be coarse");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `Ok(None)` means the run was cancelled.
    fn run_steps(&mut self) -> Result<Option<GenerationSummary>, GenerationError> {
        if !self.enter(GenerationStage::Initializing) {
            return Ok(None);
        }

        if !self.enter(GenerationStage::LoadingModel) {
            return Ok(None);
        }
        self.engine.load_model(&self.job.device)?;

        if !self.enter(GenerationStage::PreparingText) {
            return Ok(None);
        }
        let reference = self.reference_audio();

        if !self.enter(GenerationStage::Generating) {
            return Ok(None);
        }
        let audio = self.engine.synthesize(
            &self.job.text,
            SynthesisOptions {
                reference: reference.as_deref(),
                language: &self.job.language,
                device: &self.job.device,
                cancel: &self.cancel,
            },
        )?;
        if audio.samples.is_empty() {
            return Err(GenerationError::EmptyAudio);
        }

        if !self.enter(GenerationStage::PostProcessing) {
            return Ok(None);
        }
        let mut summary = GenerationSummary::default();

        if self.job.play_after {
            if !self.enter(GenerationStage::Playing) {
                return Ok(None);
            }
            self.player.play(&audio)?;
            summary.played = true;
        }

        if let Some(name) = self.job.save_as.clone() {
            if !self.enter(GenerationStage::Saving) {
                return Ok(None);
            }
            summary.saved_path = Some(self.save(&audio, &name)?);
        }

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some((percent, label)) = GenerationStage::Completed.milestone() {
            self.emit_milestone(GenerationStage::Completed, percent, label);
        }
        Ok(Some(summary))
    }

    /// Cancellation check at a stage boundary; emits the stage milestone.
    fn enter(&mut self, stage: GenerationStage) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.stage = stage;
        if let Some((percent, label)) = stage.milestone() {
            self.emit_milestone(stage, percent, label);
        }
        true
    }

    fn emit_milestone(&self, stage: GenerationStage, percent: u8, label: &str) {
        self.sink.emit(WorkerEvent::Milestone {
            generation: self.job.id,
            stage,
            percent,
            label: label.to_string(),
        });
    }

    fn reference_audio(&self) -> Option<PathBuf> {
        let path = self.job.reference_audio.as_ref()?;
        if path.is_file() {
            Some(path.clone())
        } else {
            engine_warn!("reference audio {:?} missing; generating without it", path);
            None
        }
    }

    fn save(&self, audio: &Synthesis, name: &str) -> Result<PathBuf, GenerationError> {
        let writer = AtomicFileWriter::new(self.output_dir.clone());
        let path = writer.write_with(&wav_filename(name), |out| {
            audio.write_wav(out).map_err(|err| err.to_string())
        })?;
        engine_info!("saved {:?}", path);
        Ok(path)
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
