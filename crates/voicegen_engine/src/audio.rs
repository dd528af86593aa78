use std::fs;
use std::io::{Seek, Write};
use std::path::Path;

use thiserror::Error;

/// Reference length a voice sample should have for best cloning quality.
pub const OPTIMAL_VOICE_SECS: f64 = 15.0;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
    #[error("generated audio is empty")]
    Empty,
}

/// Mono audio produced by a speech engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Synthesis {
    /// Read a WAV file of any sample format, downmixing to mono.
    pub fn read_wav(path: &Path) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Write the audio as a 32-bit float WAV.
    pub fn write_wav<W: Write + Seek>(&self, writer: W) -> Result<(), AudioError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::new(writer, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Copy scaled so the loudest sample sits at full scale.
    pub fn normalized(&self) -> Self {
        let peak = self
            .samples
            .iter()
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()));
        let gain = 1.0 / (peak + 1e-9);
        Self {
            samples: self.samples.iter().map(|sample| sample * gain).collect(),
            sample_rate: self.sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Duration of a WAV file in seconds, rounded to milliseconds. Empty files are 0.
pub fn wav_duration(path: &Path) -> Result<f64, AudioError> {
    if fs::metadata(path)?.len() == 0 {
        return Ok(0.0);
    }
    let reader = hound::WavReader::open(path)?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Ok(0.0);
    }
    let secs = f64::from(reader.duration()) / f64::from(rate);
    Ok((secs * 1000.0).round() / 1000.0)
}

/// How well a voice sample's length matches the optimal reference length.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceAccuracy {
    /// 0..=100.
    pub percent: f64,
    /// `"X%"` below optimal, `"+X%"` excess above it.
    pub label: String,
    pub exceeds_optimal: bool,
}

pub fn voice_accuracy(duration: f64, optimal: f64) -> VoiceAccuracy {
    if optimal <= 0.0 {
        return VoiceAccuracy {
            percent: 100.0,
            label: "100%".to_string(),
            exceeds_optimal: false,
        };
    }
    if duration >= optimal {
        let excess = (duration - optimal) / optimal * 100.0;
        VoiceAccuracy {
            percent: 100.0,
            label: format!("+{excess:.0}%"),
            exceeds_optimal: true,
        }
    } else {
        let accuracy = (duration / optimal * 100.0).max(0.0);
        VoiceAccuracy {
            percent: accuracy.min(100.0),
            label: format!("{accuracy:.0}%"),
            exceeds_optimal: false,
        }
    }
}
