use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cuda,
    Cpu,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Immutable request handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub text: String,
    pub reference_audio: Option<PathBuf>,
    pub play_after: bool,
    pub save_to_file: bool,
    pub output_filename: String,
    pub device: Device,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Enter some text to generate.")]
    EmptyText,
    #[error("Enter a file name to save the audio.")]
    MissingFilename,
}

/// Editable form backing a request. At least one of play/save is always on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestForm {
    text: String,
    reference_audio: Option<PathBuf>,
    play_after: bool,
    save_to_file: bool,
    output_filename: String,
    pub(crate) device: Device,
    pub(crate) language: Language,
}

impl Default for RequestForm {
    fn default() -> Self {
        Self {
            text: String::new(),
            reference_audio: None,
            play_after: true,
            save_to_file: false,
            output_filename: String::new(),
            device: Device::default(),
            language: Language::default(),
        }
    }
}

impl RequestForm {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn play_after(&self) -> bool {
        self.play_after
    }

    pub fn save_to_file(&self) -> bool {
        self.save_to_file
    }

    pub fn output_filename(&self) -> &str {
        &self.output_filename
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub(crate) fn set_text(&mut self, text: String) {
        self.text = text;
    }

    pub(crate) fn set_reference(&mut self, reference: Option<PathBuf>) {
        self.reference_audio = reference;
    }

    pub(crate) fn set_filename(&mut self, filename: String) {
        self.output_filename = filename;
    }

    pub(crate) fn set_play(&mut self, on: bool) {
        self.play_after = on;
        if !on && !self.save_to_file {
            self.save_to_file = true;
        }
    }

    pub(crate) fn set_save(&mut self, on: bool) {
        self.save_to_file = on;
        if !on && !self.play_after {
            self.play_after = true;
        }
    }

    /// Validate the form into a request. Text and filename are trimmed.
    pub fn validate(&self) -> Result<GenerationRequest, RequestError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(RequestError::EmptyText);
        }
        let filename = self.output_filename.trim();
        if self.save_to_file && filename.is_empty() {
            return Err(RequestError::MissingFilename);
        }
        Ok(GenerationRequest {
            text: text.to_string(),
            reference_audio: self.reference_audio.clone(),
            play_after: self.play_after,
            save_to_file: self.save_to_file,
            output_filename: if self.save_to_file {
                filename.to_string()
            } else {
                String::new()
            },
            device: self.device,
            language: self.language,
        })
    }
}
