use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};

use crate::audio::{AudioError, Synthesis};
use crate::worker::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: String },
    #[error("cancelled")]
    Cancelled,
    #[error("could not read generated audio: {0}")]
    Audio(#[from] AudioError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Per-call generation settings.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisOptions<'a> {
    pub reference: Option<&'a Path>,
    pub language: &'a str,
    pub device: &'a str,
    /// Set when the controller gives up on this generation. Long-running
    /// engines should poll it and return [`EngineError::Cancelled`].
    pub cancel: &'a CancelToken,
}

/// Opaque text-to-speech model. Implementations may write free-form
/// diagnostics to stdout/stderr; those are captured and classified.
pub trait SpeechEngine: Send {
    /// Prepare the model. Called once per generation before `synthesize`.
    fn load_model(&mut self, device: &str) -> Result<(), EngineError>;

    fn synthesize(
        &mut self,
        text: &str,
        options: SynthesisOptions<'_>,
    ) -> Result<Synthesis, EngineError>;
}

/// Runs an external TTS program per request.
///
/// The program is invoked as
/// `PROGRAM [ARGS..] --text TEXT --language L --device D --output OUT.wav [--reference REF]`
/// with stdout and stderr inherited, and must write a WAV file to `OUT.wav`.
/// The program runs in its own process group; on cancellation the whole group
/// is killed so no helper keeps the captured console open.
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn load_model(&mut self, device: &str) -> Result<(), EngineError> {
        // The external program loads its model on every call.
        engine_debug!("using {} on {}", self.program_name(), device);
        Ok(())
    }

    fn synthesize(
        &mut self,
        text: &str,
        options: SynthesisOptions<'_>,
    ) -> Result<Synthesis, EngineError> {
        let output = tempfile::Builder::new()
            .prefix("voicegen_")
            .suffix(".wav")
            .tempfile()?;
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--text")
            .arg(text)
            .arg("--language")
            .arg(options.language)
            .arg("--device")
            .arg(options.device)
            .arg("--output")
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(reference) = options.reference {
            command.arg("--reference").arg(reference);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        engine_info!(
            "running {} ({} chars)",
            self.program_name(),
            text.chars().count()
        );
        let mut child = command.spawn().map_err(|source| EngineError::Launch {
            program: self.program_name(),
            source,
        })?;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    terminate(&mut child);
                    return Err(err.into());
                }
            }
            if options.cancel.is_cancelled() {
                engine_info!("stopping {}", self.program_name());
                terminate(&mut child);
                return Err(EngineError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        };
        if !status.success() {
            return Err(EngineError::Failed {
                program: self.program_name(),
                status: status.to_string(),
            });
        }
        Ok(Synthesis::read_wav(output.path())?)
    }
}

/// Kill the child and everything in its process group, then reap it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: kill() only sends a signal; a negative pid names the group.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    if let Err(err) = child.kill() {
        engine_warn!("failed to kill engine process: {}", err);
    }
    let _ = child.wait();
}
