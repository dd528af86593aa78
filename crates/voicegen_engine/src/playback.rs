use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::audio::{AudioError, Synthesis};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: String },
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Plays audio to completion.
pub trait AudioPlayer: Send {
    fn play(&mut self, audio: &Synthesis) -> Result<(), PlaybackError>;
}

/// Plays through an external program given a temporary WAV path as last argument.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for CommandPlayer {
    fn default() -> Self {
        Self::new(
            "ffplay",
            ["-autoexit", "-nodisp", "-loglevel", "error"]
                .map(String::from)
                .to_vec(),
        )
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&mut self, audio: &Synthesis) -> Result<(), PlaybackError> {
        let program = self.program.display().to_string();
        let mut tmp = tempfile::Builder::new()
            .prefix("voicegen_play_")
            .suffix(".wav")
            .tempfile()?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            audio.normalized().write_wav(&mut out)?;
            out.flush()?;
        }

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(tmp.path())
            .stdin(Stdio::null())
            .status()
            .map_err(|source| PlaybackError::Launch {
                program: program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(PlaybackError::Failed {
                program,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
