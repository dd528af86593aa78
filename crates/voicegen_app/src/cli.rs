use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use voicegen_core::{Device, Language, ProgressPolicy};

#[derive(Debug, Parser)]
#[command(name = "voicegen", version)]
#[command(about = "Voice-cloning text-to-speech with live engine progress")]
pub struct Cli {
    /// Directory holding voicegen_settings.ron.
    #[arg(long, global = true, default_value = ".")]
    pub config_dir: PathBuf,
    /// Also write log records to the terminal.
    #[arg(long, global = true)]
    pub log_terminal: bool,
    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List imported voices with length and accuracy.
    Voices,
    /// Import an audio file as a voice sample.
    Import {
        file: PathBuf,
        /// Voice name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete an imported voice.
    Delete { name: String },
    /// Generate speech; type `q` and Enter to cancel.
    Generate(GenerateArgs),
    /// Show or change persisted settings.
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Voice to clone; the engine's default voice when omitted.
    #[arg(long)]
    pub voice: Option<String>,
    #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
    pub text: Option<String>,
    /// Read the text to speak from a file.
    #[arg(long)]
    pub text_file: Option<PathBuf>,
    /// Do not play the result.
    #[arg(long)]
    pub no_play: bool,
    /// Save the result as output/NAME.wav.
    #[arg(long, value_name = "NAME")]
    pub save: Option<String>,
    #[arg(long, value_enum)]
    pub device: Option<DeviceArg>,
    #[arg(long, value_enum)]
    pub language: Option<LanguageArg>,
    /// How progress updates from different sources are combined.
    #[arg(long, value_enum)]
    pub progress: Option<PolicyArg>,
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    Show,
    /// Persist one setting, e.g. `settings set device cpu`.
    Set { key: String, value: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeviceArg {
    Cuda,
    Cpu,
}

impl From<DeviceArg> for Device {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Cuda => Device::Cuda,
            DeviceArg::Cpu => Device::Cpu,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LanguageArg {
    Ru,
    En,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Self {
        match arg {
            LanguageArg::Ru => Language::Ru,
            LanguageArg::En => Language::En,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    LastWriteWins,
    Monotonic,
}

impl From<PolicyArg> for ProgressPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::LastWriteWins => ProgressPolicy::LastWriteWins,
            PolicyArg::Monotonic => ProgressPolicy::Monotonic,
        }
    }
}
