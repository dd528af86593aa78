use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_warn};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Characters of transcoder stderr kept in error messages.
const STDERR_TAIL: usize = 400;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts arbitrary audio into the reference format the engine expects.
pub trait Transcoder: Send + Sync {
    /// Produce a mono 24 kHz 16-bit PCM WAV at `output`.
    fn to_reference_wav(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(60),
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn to_reference_wav(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let program = self.program.display().to_string();
        let mut stderr_file = tempfile::tempfile()?;
        let mut child = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .args(["-ac", "1", "-ar", "24000", "-acodec", "pcm_s16le", "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()
            .map_err(|source| TranscodeError::Launch {
                program: program.clone(),
                source,
            })?;
        engine_debug!("transcoding {:?} -> {:?}", input, output);

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                if let Err(err) = child.kill() {
                    engine_warn!("failed to kill {}: {}", program, err);
                }
                let _ = child.wait();
                return Err(TranscodeError::Timeout {
                    program,
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        if status.success() {
            return Ok(());
        }
        let mut stderr = String::new();
        stderr_file.seek(SeekFrom::Start(0))?;
        let _ = stderr_file.read_to_string(&mut stderr);
        Err(TranscodeError::Failed {
            program,
            status: status.to_string(),
            stderr: tail(&stderr, STDERR_TAIL),
        })
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    trimmed.chars().skip(count.saturating_sub(max_chars)).collect()
}
