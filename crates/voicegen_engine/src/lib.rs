//! Voicegen engine: console capture, classification and the generation worker.
mod audio;
mod capture;
mod classify;
mod engine;
mod filename;
mod persist;
mod playback;
mod synth;
mod transcode;
mod types;
mod voices;
mod worker;

pub use audio::{
    voice_accuracy, wav_duration, AudioError, Synthesis, VoiceAccuracy, OPTIMAL_VOICE_SECS,
};
pub use capture::{
    terminal, CaptureError, CaptureSession, ConsoleTap, Terminal, DRAIN_LIMIT,
};
pub use classify::{
    ClassifiedEvent, ConsoleChannel, LineClassifier, Matcher, ProgressPhase, Rule, RuleKind,
};
pub use engine::GenerationHandle;
pub use filename::{sanitize_stem, wav_filename};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use playback::{AudioPlayer, CommandPlayer, PlaybackError};
pub use synth::{CommandSpeechEngine, EngineError, SpeechEngine, SynthesisOptions};
pub use transcode::{FfmpegTranscoder, TranscodeError, Transcoder};
pub use types::{
    ChannelEventSink, EventSink, GenerationId, GenerationJob, GenerationStage, GenerationSummary,
    WorkerEvent,
};
pub use voices::{ImportedVoice, VoiceEntry, VoiceError, VoiceLibrary};
pub use worker::{CancelToken, GenerationError, GenerationWorker};
