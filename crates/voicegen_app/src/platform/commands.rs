use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use engine_logging::{engine_info, engine_warn};
use voicegen_core::GenerationStatus;
use voicegen_engine::VoiceLibrary;

use super::app::{spawn_cancel_listener, GenerateOptions, GenerationSession};
use super::logging::{self, LogDestination};
use super::render;
use super::settings::{self, AppSettings, SETTINGS_FILENAME, SETTING_KEYS};
use crate::cli::{Cli, Command, GenerateArgs, SettingsAction};

pub fn run(cli: Cli) -> Result<()> {
    let destination = if cli.log_terminal {
        LogDestination::Both
    } else {
        LogDestination::File
    };
    logging::initialize(destination, cli.verbose);

    let settings = settings::load(&cli.config_dir);
    match cli.command {
        Command::Voices => list_voices(&settings),
        Command::Import { file, name } => import_voice(&settings, &file, name),
        Command::Delete { name } => {
            library(&settings)
                .delete(&name)
                .with_context(|| format!("could not delete voice {name:?}"))?;
            println!("Deleted voice {name}.");
            Ok(())
        }
        Command::Generate(args) => generate(settings, args),
        Command::Settings { action } => match action {
            None | Some(SettingsAction::Show) => show_settings(&settings),
            Some(SettingsAction::Set { key, value }) => {
                update_setting(&cli.config_dir, settings, &key, &value)
            }
        },
    }
}

fn library(settings: &AppSettings) -> VoiceLibrary {
    VoiceLibrary::new(settings.voices_dir.clone(), settings.optimal_voice_secs)
}

fn list_voices(settings: &AppSettings) -> Result<()> {
    let voices = library(settings)
        .list()
        .with_context(|| format!("could not list voices in {:?}", settings.voices_dir))?;
    print!("{}", render::voice_table(&voices));
    Ok(())
}

fn import_voice(settings: &AppSettings, file: &Path, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .context("cannot derive a voice name from the file name; pass --name")?,
    };
    let transcoder = settings.transcoder();
    let mut stdout = std::io::stdout();
    let imported = library(settings)
        .import(file, &name, &transcoder, |percent| {
            let _ = write!(stdout, "\rImporting voice... {percent:>3}%");
            let _ = stdout.flush();
        })
        .with_context(|| format!("could not import {file:?}"))?;
    println!();

    let entry = imported.entry;
    println!(
        "Imported voice {} ({:.1}s, accuracy {}).",
        entry.name, entry.duration_secs, entry.accuracy.label
    );
    if entry.duration_secs < settings.optimal_voice_secs {
        println!(
            "Tip: a sample of about {:.0}s gives the best cloning quality.",
            settings.optimal_voice_secs
        );
    }
    Ok(())
}

fn generate(settings: AppSettings, args: GenerateArgs) -> Result<()> {
    let text = match (args.text, &args.text_file) {
        (Some(text), _) => text,
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("could not read {path:?}"))?
        }
        (None, None) => bail!("pass --text or --text-file"),
    };
    let reference = args.voice.as_deref().map(|voice| {
        let mut out = voicegen_engine::terminal();
        voice_reference(&library(&settings), voice, &mut out)
    });

    let options = GenerateOptions {
        text,
        reference,
        play: !args.no_play,
        save_as: args.save,
        device: args.device.map_or(settings.device, Into::into),
        language: args.language.map_or(settings.language, Into::into),
        policy: args.progress.map_or(settings.progress_policy, Into::into),
    };
    engine_info!(
        "generate device={} language={} policy={:?}",
        options.device,
        options.language,
        options.policy
    );

    let session = GenerationSession::new(settings, voicegen_engine::terminal());
    spawn_cancel_listener(session.sender());
    match session.run(&options) {
        GenerationStatus::Succeeded { .. } | GenerationStatus::Cancelled => Ok(()),
        GenerationStatus::Failed { message } => bail!(message),
        GenerationStatus::Idle | GenerationStatus::Running => bail!("nothing was generated"),
    }
}

/// Reference sample for `voice`. An unknown voice is reported and handed on
/// as is; the worker then generates with the engine's default voice.
fn voice_reference(library: &VoiceLibrary, voice: &str, out: &mut impl Write) -> PathBuf {
    match library.resolve(voice) {
        Ok(path) => path,
        Err(err) => {
            engine_warn!("{}", err);
            let _ = writeln!(
                out,
                "Voice {voice:?} not found (see `voicegen voices`); using the default voice."
            );
            library.path_for(voice)
        }
    }
}

fn show_settings(settings: &AppSettings) -> Result<()> {
    let content = ron::ser::to_string_pretty(settings, ron::ser::PrettyConfig::new())
        .context("could not format settings")?;
    println!("{content}");
    println!();
    println!("Settable keys: {}", SETTING_KEYS.join(", "));
    Ok(())
}

fn update_setting(dir: &Path, mut settings: AppSettings, key: &str, value: &str) -> Result<()> {
    settings.set(key, value)?;
    let path = settings::save(dir, &settings)
        .with_context(|| format!("could not write {SETTINGS_FILENAME}"))?;
    println!("Saved {key} = {value} to {}.", path.display());
    Ok(())
}
