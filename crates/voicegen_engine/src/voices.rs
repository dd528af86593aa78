//! The `voices/` directory: one WAV per voice, the file stem is the display name.

use std::fs;
use std::path::{Path, PathBuf};

use engine_logging::{engine_info, engine_warn};
use thiserror::Error;

use crate::audio::{voice_accuracy, wav_duration, AudioError, VoiceAccuracy};
use crate::filename::sanitize_stem;
use crate::persist::{ensure_output_dir, PersistError};
use crate::transcode::{TranscodeError, Transcoder};

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("voice {0:?} not found")]
    NotFound(String),
    #[error("voice name is empty")]
    EmptyName,
    #[error("could not determine audio duration after conversion")]
    ZeroDuration,
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEntry {
    pub name: String,
    pub path: PathBuf,
    pub duration_secs: f64,
    pub accuracy: VoiceAccuracy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedVoice {
    pub entry: VoiceEntry,
}

#[derive(Debug, Clone)]
pub struct VoiceLibrary {
    dir: PathBuf,
    optimal_secs: f64,
}

impl VoiceLibrary {
    pub fn new(dir: PathBuf, optimal_secs: f64) -> Self {
        Self { dir, optimal_secs }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All voices sorted by name. Unreadable files are listed with zero duration.
    pub fn list(&self) -> Result<Vec<VoiceEntry>, VoiceError> {
        ensure_output_dir(&self.dir)?;
        let mut entries = Vec::new();
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            if !is_wav(&path) {
                continue;
            }
            let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            entries.push(self.describe(name, path));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Where voice `name` lives, whether or not it exists.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.wav"))
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf, VoiceError> {
        let path = self.path_for(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(VoiceError::NotFound(name.to_string()))
        }
    }

    pub fn delete(&self, name: &str) -> Result<(), VoiceError> {
        let path = self.resolve(name)?;
        fs::remove_file(&path)?;
        engine_info!("deleted voice {:?}", path);
        Ok(())
    }

    /// Import `source` as voice `name`, converting non-WAV input first.
    ///
    /// `progress` receives 10, 30, 50, 80 and 100 as the import advances.
    pub fn import(
        &self,
        source: &Path,
        name: &str,
        transcoder: &dyn Transcoder,
        mut progress: impl FnMut(u8),
    ) -> Result<ImportedVoice, VoiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VoiceError::EmptyName);
        }
        let stem = sanitize_stem(name);
        ensure_output_dir(&self.dir)?;

        progress(10);
        // Keeps the converted temp file alive until it has been copied.
        let converted = if is_wav(source) {
            None
        } else {
            let tmp = tempfile::Builder::new()
                .prefix(&format!("converted_{stem}_"))
                .suffix(".wav")
                .tempfile()?;
            transcoder.to_reference_wav(source, tmp.path())?;
            Some(tmp)
        };
        let wav_path = converted
            .as_ref()
            .map_or_else(|| source.to_path_buf(), |tmp| tmp.path().to_path_buf());

        progress(30);
        let duration = wav_duration(&wav_path)?;
        if duration == 0.0 {
            return Err(VoiceError::ZeroDuration);
        }

        progress(50);
        let accuracy = voice_accuracy(duration, self.optimal_secs);

        progress(80);
        let target = self.unique_target(&stem);
        fs::copy(&wav_path, &target)?;
        engine_info!(
            "imported voice {:?} ({:.1}s, accuracy {})",
            target,
            duration,
            accuracy.label
        );

        progress(100);
        let name = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(stem);
        Ok(ImportedVoice {
            entry: VoiceEntry {
                name,
                path: target,
                duration_secs: duration,
                accuracy,
            },
        })
    }

    fn describe(&self, name: String, path: PathBuf) -> VoiceEntry {
        let duration_secs = match wav_duration(&path) {
            Ok(duration) => duration,
            Err(err) => {
                engine_warn!("failed to read voice {:?}: {}", path, err);
                0.0
            }
        };
        VoiceEntry {
            name,
            path,
            duration_secs,
            accuracy: voice_accuracy(duration_secs, self.optimal_secs),
        }
    }

    /// `{stem}.wav`, or `{stem}_1.wav`, `{stem}_2.wav`, ... if taken.
    fn unique_target(&self, stem: &str) -> PathBuf {
        let mut target = self.dir.join(format!("{stem}.wav"));
        let mut counter = 1;
        while target.exists() {
            target = self.dir.join(format!("{stem}_{counter}.wav"));
            counter += 1;
        }
        target
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}
