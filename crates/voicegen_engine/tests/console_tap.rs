use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use voicegen_engine::{ClassifiedEvent, ConsoleTap, EventSink, ProgressPhase, WorkerEvent};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<WorkerEvent>>,
}

impl RecordingSink {
    fn console_events(&self) -> Vec<ClassifiedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::Console { event, .. } => Some(event.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: WorkerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn sampling(percent: u8) -> ClassifiedEvent {
    ClassifiedEvent::Progress {
        phase: ProgressPhase::Sampling,
        percent,
        label: format!("Generating speech: {percent}%"),
    }
}

#[test]
fn forwards_bytes_unchanged() {
    let sink = Arc::new(RecordingSink::default());
    let mut tap = ConsoleTap::new(1, sink.clone(), Vec::new());

    tap.feed(b"hello\r\nplain text\n").unwrap();
    tap.feed(b"partial").unwrap();

    let forwarded = tap.finish();
    assert_eq!(forwarded, b"hello\r\nplain text\npartial".to_vec());
    assert!(sink.console_events().is_empty());
}

#[test]
fn carriage_return_redraws_are_separate_lines() {
    let sink = Arc::new(RecordingSink::default());
    let mut tap = ConsoleTap::new(7, sink.clone(), Vec::new());

    tap.feed(b"Sampling:  10%|\r").unwrap();
    tap.feed("Sampling:  10%|█   \rSampling:  55%|█████ \r".as_bytes())
        .unwrap();
    tap.feed("Sampling: 100%|██████████|\n".as_bytes()).unwrap();
    tap.finish();

    let events = sink.console_events();
    assert_eq!(
        events,
        vec![sampling(10), sampling(10), sampling(55), sampling(100)]
    );
}

#[test]
fn line_split_across_writes_is_joined() {
    let sink = Arc::new(RecordingSink::default());
    let mut tap = ConsoleTap::new(3, sink.clone(), Vec::new());

    tap.feed(b"UserWarn").unwrap();
    tap.feed(b"ing: slow path\n").unwrap();

    assert_eq!(
        sink.console_events(),
        vec![ClassifiedEvent::Warning {
            text: "UserWarning: slow path".to_string()
        }]
    );
}

#[test]
fn unterminated_tail_is_classified_on_finish() {
    let sink = Arc::new(RecordingSink::default());
    let mut tap = ConsoleTap::new(3, sink.clone(), Vec::new());

    tap.feed(b"forcing EOS token").unwrap();
    assert!(sink.console_events().is_empty());

    tap.finish();
    assert_eq!(
        sink.console_events(),
        vec![ClassifiedEvent::GenerationComplete]
    );
}

#[test]
fn events_carry_generation_id() {
    let sink = Arc::new(RecordingSink::default());
    let mut tap = ConsoleTap::new(42, sink.clone(), Vec::new());

    tap.feed(b"Traceback (most recent call last):\n").unwrap();

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].generation(), 42);
}
