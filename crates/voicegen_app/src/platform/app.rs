use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use voicegen_core::{update, AppState, Device, GenerationStatus, Language, Msg, ProgressPolicy};

use super::effects::{EffectRunner, WorkerFactory};
use super::render;

/// Interval of the render tick.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// What the user filled in before pressing Generate.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub text: String,
    pub reference: Option<PathBuf>,
    pub play: bool,
    pub save_as: Option<String>,
    pub device: Device,
    pub language: Language,
    pub policy: ProgressPolicy,
}

impl GenerateOptions {
    /// Form edits in the order a user would make them.
    fn form_messages(&self) -> Vec<Msg> {
        vec![
            Msg::ProgressPolicyChanged(self.policy),
            Msg::SettingsChanged {
                device: self.device,
                language: self.language,
            },
            Msg::TextChanged(self.text.clone()),
            Msg::ReferenceSelected(self.reference.clone()),
            Msg::SaveToggled(self.save_as.is_some()),
            Msg::FilenameChanged(self.save_as.clone().unwrap_or_default()),
            Msg::PlayToggled(self.play),
        ]
    }
}

/// The UI thread of one generation: drains the message queue, applies
/// `update`, executes effects and redraws on the render tick.
pub struct GenerationSession<F: WorkerFactory, W: Write> {
    state: AppState,
    runner: EffectRunner<F>,
    msg_tx: mpsc::Sender<Msg>,
    msg_rx: mpsc::Receiver<Msg>,
    out: W,
}

impl<F: WorkerFactory, W: Write> GenerationSession<F, W> {
    pub fn new(factory: F, out: W) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel();
        Self {
            state: AppState::new(),
            runner: EffectRunner::new(factory, msg_tx.clone()),
            msg_tx,
            msg_rx,
            out,
        }
    }

    #[cfg(test)]
    pub fn without_console_capture(mut self) -> Self {
        self.runner = self.runner.without_console_capture();
        self
    }

    /// Queue for messages produced outside the UI thread.
    pub fn sender(&self) -> mpsc::Sender<Msg> {
        self.msg_tx.clone()
    }

    /// Run until the generation reaches a terminal status.
    pub fn run(mut self, options: &GenerateOptions) -> GenerationStatus {
        for msg in options.form_messages() {
            self.dispatch(msg);
        }
        self.dispatch(Msg::GenerateClicked);
        if self.state.active_generation().is_none() {
            // Rejected by validation; the notice has been shown.
            return self.state.status().clone();
        }
        spawn_ticker(self.msg_tx.clone());

        while let Ok(msg) = self.msg_rx.recv() {
            let tick = matches!(msg, Msg::Tick);
            self.dispatch(msg);
            if tick {
                self.render_if_dirty();
            }
            if self.state.active_generation().is_none() {
                break;
            }
        }

        self.render_if_dirty();
        if let Some(line) = render::status_line(self.state.status()) {
            let _ = writeln!(self.out, "\n{line}");
        }
        self.runner.shutdown();
        self.state.status().clone()
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        self.runner.enqueue(effects);
    }

    fn render_if_dirty(&mut self) {
        if !self.state.consume_dirty() {
            return;
        }
        let view = self.state.view();
        if let Err(err) = render::render(&mut self.out, &view) {
            engine_warn!("render failed: {}", err);
        }
    }
}

fn spawn_ticker(msg_tx: mpsc::Sender<Msg>) {
    thread::spawn(move || {
        while msg_tx.send(Msg::Tick).is_ok() {
            thread::sleep(TICK_INTERVAL);
        }
    });
}

/// Send `CancelClicked` when the user types `q` and Enter.
pub fn spawn_cancel_listener(msg_tx: mpsc::Sender<Msg>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if matches!(line.trim(), "q" | "quit") {
                engine_info!("cancel requested from terminal");
                let _ = msg_tx.send(Msg::CancelClicked);
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use voicegen_engine::{
        AudioPlayer, EngineError, PlaybackError, SpeechEngine, Synthesis, SynthesisOptions,
    };

    use super::*;

    struct FakeEngine {
        delay: Duration,
    }

    impl SpeechEngine for FakeEngine {
        fn load_model(&mut self, _device: &str) -> Result<(), EngineError> {
            thread::sleep(self.delay);
            Ok(())
        }

        fn synthesize(
            &mut self,
            _text: &str,
            _options: SynthesisOptions<'_>,
        ) -> Result<Synthesis, EngineError> {
            Ok(Synthesis {
                samples: vec![0.1, -0.1],
                sample_rate: 16_000,
            })
        }
    }

    #[derive(Clone, Default)]
    struct CountingPlayer(Arc<Mutex<usize>>);

    impl AudioPlayer for CountingPlayer {
        fn play(&mut self, _audio: &Synthesis) -> Result<(), PlaybackError> {
            *self.0.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct FakeFactory {
        output: PathBuf,
        delay: Duration,
        player: CountingPlayer,
    }

    impl WorkerFactory for FakeFactory {
        fn speech_engine(&self) -> Box<dyn SpeechEngine> {
            Box::new(FakeEngine { delay: self.delay })
        }

        fn player(&self) -> Box<dyn AudioPlayer> {
            Box::new(self.player.clone())
        }

        fn output_dir(&self) -> PathBuf {
            self.output.clone()
        }
    }

    fn options() -> GenerateOptions {
        GenerateOptions {
            text: "Hello".to_string(),
            reference: None,
            play: true,
            save_as: Some("hello".to_string()),
            device: Device::Cpu,
            language: Language::En,
            policy: ProgressPolicy::LastWriteWins,
        }
    }

    #[test]
    fn session_runs_to_success() {
        let temp = TempDir::new().unwrap();
        let player = CountingPlayer::default();
        let factory = FakeFactory {
            output: temp.path().to_path_buf(),
            delay: Duration::ZERO,
            player: player.clone(),
        };
        let mut out = Vec::new();

        let status = GenerationSession::new(factory, &mut out)
            .without_console_capture()
            .run(&options());

        let saved = temp.path().join("hello.wav");
        assert_eq!(
            status,
            GenerationStatus::Succeeded {
                summary: "Audio played. File saved as: hello.wav".to_string(),
                output_path: Some(saved.clone()),
            }
        );
        assert!(saved.is_file());
        assert_eq!(*player.0.lock().unwrap(), 1);
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Generation complete! Audio played."));
    }

    #[test]
    fn validation_rejects_without_starting() {
        let temp = TempDir::new().unwrap();
        let factory = FakeFactory {
            output: temp.path().to_path_buf(),
            delay: Duration::ZERO,
            player: CountingPlayer::default(),
        };
        let mut request = options();
        request.text = "   ".to_string();

        let status = GenerationSession::new(factory, Vec::new())
            .without_console_capture()
            .run(&request);

        assert_eq!(status, GenerationStatus::Idle);
        assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
    }

    #[test]
    fn queued_cancel_stops_the_run() {
        let temp = TempDir::new().unwrap();
        let player = CountingPlayer::default();
        let factory = FakeFactory {
            output: temp.path().to_path_buf(),
            delay: Duration::from_millis(200),
            player: player.clone(),
        };
        let session = GenerationSession::new(factory, Vec::new()).without_console_capture();
        session.sender().send(Msg::CancelClicked).unwrap();

        let status = session.run(&options());

        assert_eq!(status, GenerationStatus::Cancelled);
        assert_eq!(*player.0.lock().unwrap(), 0);
        assert!(!temp.path().join("hello.wav").exists());
    }
}
