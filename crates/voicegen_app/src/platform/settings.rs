use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use voicegen_core::{Device, Language, ProgressPolicy};
use voicegen_engine::{
    AtomicFileWriter, CommandPlayer, CommandSpeechEngine, FfmpegTranscoder, PersistError,
    OPTIMAL_VOICE_SECS,
};

pub(crate) const SETTINGS_FILENAME: &str = "voicegen_settings.ron";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize settings: {0}")]
    Encode(#[from] ron::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("unknown setting {0:?}")]
    UnknownKey(String),
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// External program plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscoderSpec {
    pub program: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub voices_dir: PathBuf,
    pub output_dir: PathBuf,
    pub device: Device,
    pub language: Language,
    pub engine: CommandSpec,
    pub player: CommandSpec,
    pub transcoder: TranscoderSpec,
    pub progress_policy: ProgressPolicy,
    pub optimal_voice_secs: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            voices_dir: PathBuf::from("voices"),
            output_dir: PathBuf::from("output"),
            device: Device::default(),
            language: Language::default(),
            engine: CommandSpec {
                program: "chatterbox-tts".to_string(),
                args: Vec::new(),
            },
            player: CommandSpec {
                program: "ffplay".to_string(),
                args: ["-autoexit", "-nodisp", "-loglevel", "error"]
                    .map(String::from)
                    .to_vec(),
            },
            transcoder: TranscoderSpec {
                program: "ffmpeg".to_string(),
                timeout_secs: 60,
            },
            progress_policy: ProgressPolicy::default(),
            optimal_voice_secs: OPTIMAL_VOICE_SECS,
        }
    }
}

pub(crate) const SETTING_KEYS: &[&str] = &[
    "voices_dir",
    "output_dir",
    "device",
    "language",
    "engine_program",
    "player_program",
    "transcoder_program",
    "transcoder_timeout_secs",
    "progress_policy",
    "optimal_voice_secs",
];

impl AppSettings {
    /// Update one setting from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = |expected| SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        };
        match key {
            "voices_dir" => self.voices_dir = PathBuf::from(value),
            "output_dir" => self.output_dir = PathBuf::from(value),
            "device" => {
                self.device = match value {
                    "cuda" => Device::Cuda,
                    "cpu" => Device::Cpu,
                    _ => return Err(invalid("cuda or cpu")),
                }
            }
            "language" => {
                self.language = match value {
                    "ru" => Language::Ru,
                    "en" => Language::En,
                    _ => return Err(invalid("ru or en")),
                }
            }
            "engine_program" => self.engine.program = value.to_string(),
            "player_program" => self.player.program = value.to_string(),
            "transcoder_program" => self.transcoder.program = value.to_string(),
            "transcoder_timeout_secs" => {
                self.transcoder.timeout_secs = value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| invalid("a positive number of seconds"))?;
            }
            "progress_policy" => {
                self.progress_policy = match value {
                    "last_write_wins" => ProgressPolicy::LastWriteWins,
                    "monotonic" => ProgressPolicy::Monotonic,
                    _ => return Err(invalid("last_write_wins or monotonic")),
                }
            }
            "optimal_voice_secs" => {
                self.optimal_voice_secs = value
                    .parse::<f64>()
                    .ok()
                    .filter(|secs| secs.is_finite() && *secs > 0.0)
                    .ok_or_else(|| invalid("a positive number of seconds"))?;
            }
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn command_engine(&self) -> CommandSpeechEngine {
        CommandSpeechEngine::new(&self.engine.program, self.engine.args.clone())
    }

    pub fn command_player(&self) -> CommandPlayer {
        CommandPlayer::new(&self.player.program, self.player.args.clone())
    }

    pub fn transcoder(&self) -> FfmpegTranscoder {
        FfmpegTranscoder {
            program: PathBuf::from(&self.transcoder.program),
            timeout: Duration::from_secs(self.transcoder.timeout_secs),
        }
    }
}

/// Read settings from `dir`, failing on unreadable or malformed files.
pub fn try_load(dir: &Path) -> Result<Option<AppSettings>, SettingsError> {
    let path = dir.join(SETTINGS_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(ron::from_str(&content)?))
}

/// Settings from `dir`; defaults when the file is missing or broken.
pub fn load(dir: &Path) -> AppSettings {
    match try_load(dir) {
        Ok(Some(settings)) => {
            engine_info!("Loaded settings from {:?}", dir.join(SETTINGS_FILENAME));
            settings
        }
        Ok(None) => AppSettings::default(),
        Err(err) => {
            engine_warn!("Using default settings: {}", err);
            AppSettings::default()
        }
    }
}

pub fn save(dir: &Path, settings: &AppSettings) -> Result<PathBuf, SettingsError> {
    let pretty = ron::ser::PrettyConfig::new();
    let content = ron::ser::to_string_pretty(settings, pretty)?;
    let writer = AtomicFileWriter::new(dir.to_path_buf());
    Ok(writer.write(SETTINGS_FILENAME, &content)?)
}
