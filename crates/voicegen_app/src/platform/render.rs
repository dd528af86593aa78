use std::io::{self, Write};

use voicegen_core::{AppViewModel, GenerationStatus, NoticeSeverity};
use voicegen_engine::VoiceEntry;

const BAR_WIDTH: usize = 30;
const CLEAR_TO_EOL: &str = "\x1b[K";

/// One-line progress display: `[#####-----]  45% Generating speech: 33% (45%)`.
pub fn progress_line(view: &AppViewModel) -> Option<String> {
    let progress = view.progress.as_ref()?;
    let percent = usize::from(progress.percent.min(100));
    let filled = percent * BAR_WIDTH / 100;
    Some(format!(
        "[{}{}] {:>3}% {}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        percent,
        progress.text
    ))
}

/// Redraw the progress line in place.
pub fn render(out: &mut impl Write, view: &AppViewModel) -> io::Result<()> {
    if let Some(line) = progress_line(view) {
        write!(out, "\r{line}{CLEAR_TO_EOL}")?;
    }
    out.flush()
}

pub fn notice(out: &mut impl Write, severity: NoticeSeverity, message: &str) -> io::Result<()> {
    let tag = match severity {
        NoticeSeverity::Information => "info",
        NoticeSeverity::Warning => "warning",
        NoticeSeverity::Error => "error",
    };
    writeln!(out, "\n[{tag}] {message}")
}

/// Final line printed once a generation is over.
pub fn status_line(status: &GenerationStatus) -> Option<String> {
    match status {
        GenerationStatus::Idle | GenerationStatus::Running => None,
        GenerationStatus::Succeeded {
            summary,
            output_path,
        } => Some(match output_path {
            Some(path) => format!("Generation complete! {summary} ({})", path.display()),
            None => format!("Generation complete! {summary}"),
        }),
        GenerationStatus::Failed { message } => Some(message.clone()),
        GenerationStatus::Cancelled => Some("Generation cancelled.".to_string()),
    }
}

pub fn voice_table(entries: &[VoiceEntry]) -> String {
    if entries.is_empty() {
        return "No voices imported yet.\n".to_string();
    }
    let width = entries
        .iter()
        .map(|entry| entry.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut table = format!("{:<width$}  {:>8}  {:>8}\n", "NAME", "LENGTH", "ACCURACY");
    for entry in entries {
        table.push_str(&format!(
            "{:<width$}  {:>7.1}s  {:>8}\n",
            entry.name, entry.duration_secs, entry.accuracy.label
        ));
    }
    table
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use voicegen_core::ProgressView;
    use voicegen_engine::voice_accuracy;

    use super::*;

    fn view_at(percent: u8, text: &str) -> AppViewModel {
        AppViewModel {
            progress: Some(ProgressView {
                percent,
                text: text.to_string(),
            }),
            ..AppViewModel::default()
        }
    }

    #[test]
    fn bar_fills_proportionally() {
        let line = progress_line(&view_at(50, "Processing (50%)")).unwrap();
        assert_eq!(
            line,
            format!("[{}{}]  50% Processing (50%)", "#".repeat(15), "-".repeat(15))
        );
        let full = progress_line(&view_at(100, "Done")).unwrap();
        assert!(full.starts_with(&format!("[{}]", "#".repeat(30))));
    }

    #[test]
    fn no_progress_no_line() {
        assert_eq!(progress_line(&AppViewModel::default()), None);
    }

    #[test]
    fn status_lines() {
        assert_eq!(status_line(&GenerationStatus::Running), None);
        assert_eq!(
            status_line(&GenerationStatus::Succeeded {
                summary: "Audio played.".to_string(),
                output_path: None,
            })
            .as_deref(),
            Some("Generation complete! Audio played.")
        );
        assert_eq!(
            status_line(&GenerationStatus::Cancelled).as_deref(),
            Some("Generation cancelled.")
        );
    }

    #[test]
    fn table_lists_voices() {
        let entries = vec![VoiceEntry {
            name: "narrator".to_string(),
            path: PathBuf::from("voices/narrator.wav"),
            duration_secs: 7.5,
            accuracy: voice_accuracy(7.5, 15.0),
        }];
        let table = voice_table(&entries);
        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], "narrator      7.5s       50%");
    }
}
