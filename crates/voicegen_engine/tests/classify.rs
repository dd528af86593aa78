use pretty_assertions::assert_eq;
use voicegen_engine::{ClassifiedEvent, ConsoleChannel, LineClassifier, ProgressPhase};

fn classify(line: &str) -> Option<ClassifiedEvent> {
    LineClassifier::default().classify(line)
}

#[test]
fn fetch_progress_line_reports_download_phase() {
    let event = classify("Fetching 4 files: 100%|██████████| 4/4 [00:00<00:00, 12.3it/s]");
    assert_eq!(
        event,
        Some(ClassifiedEvent::Progress {
            phase: ProgressPhase::Fetching,
            percent: 100,
            label: "Downloading files: 100%".to_string(),
        })
    );
}

#[test]
fn sampling_line_reports_speech_phase() {
    let event = classify("Sampling:  12%|█▏        | 120/1000 [00:03<00:22, 39.1it/s]");
    assert_eq!(
        event,
        Some(ClassifiedEvent::Progress {
            phase: ProgressPhase::Sampling,
            percent: 12,
            label: "Generating speech: 12%".to_string(),
        })
    );
}

#[test]
fn generic_bar_needs_bar_glyph() {
    let event = classify(" 45%|████▌     | 45/100");
    assert_eq!(
        event,
        Some(ClassifiedEvent::Progress {
            phase: ProgressPhase::GenericBar,
            percent: 45,
            label: "Processing: 45%".to_string(),
        })
    );

    // A bare percentage is not a bar.
    assert_eq!(classify("battery at 45%"), None);
}

#[test]
fn completion_marker_wins_over_warning_keyword() {
    let event = classify(
        "WARNING:chatterbox.models.t3.inference.alignment_stream_analyzer:forcing EOS token",
    );
    assert_eq!(event, Some(ClassifiedEvent::GenerationComplete));
    assert_eq!(
        event.map(|e| e.channel()),
        Some(ConsoleChannel::Completion)
    );
}

#[test]
fn warning_checked_before_error() {
    let line = "WARNING: Error: something odd";
    assert_eq!(
        classify(line),
        Some(ClassifiedEvent::Warning {
            text: line.to_string()
        })
    );
}

#[test]
fn error_keywords_yield_error_events() {
    for line in ["Traceback (most recent call last):", "RuntimeError: Error: CUDA out of memory"] {
        assert_eq!(
            classify(line),
            Some(ClassifiedEvent::Error {
                text: line.to_string()
            }),
            "{line}"
        );
    }
}

#[test]
fn info_keywords_yield_log_events() {
    let event = classify("Loaded checkpoint; model ready");
    assert_eq!(
        event,
        Some(ClassifiedEvent::InfoLog {
            text: "Loaded checkpoint; model ready".to_string()
        })
    );
    assert_eq!(event.map(|e| e.channel()), Some(ConsoleChannel::Log));
}

#[test]
fn unmatched_and_blank_lines_are_dropped() {
    assert_eq!(classify("hello world"), None);
    assert_eq!(classify(""), None);
    assert_eq!(classify("   \t"), None);
}

#[test]
fn trailing_whitespace_is_trimmed_from_text() {
    assert_eq!(
        classify("UserWarning: torch.load is deprecated   \n"),
        Some(ClassifiedEvent::Warning {
            text: "UserWarning: torch.load is deprecated".to_string()
        })
    );
}

#[test]
fn percent_above_hundred_falls_through() {
    // Not a progress event; the line carries no other keyword either.
    assert_eq!(classify("Sampling: 250%|███"), None);
}
