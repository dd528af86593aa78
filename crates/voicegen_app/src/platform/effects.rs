use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use voicegen_core::{
    ConsoleSignal, Effect, GenerationId, GenerationOutcome, GenerationRequest, Msg, Phase,
    CANCEL_WAIT,
};
use voicegen_engine::{
    AudioPlayer, ChannelEventSink, ClassifiedEvent, GenerationHandle, GenerationJob,
    GenerationWorker, ProgressPhase, SpeechEngine, WorkerEvent,
};

use super::render;
use super::settings::AppSettings;

/// Builds the engine and player for each generation.
pub trait WorkerFactory {
    fn speech_engine(&self) -> Box<dyn SpeechEngine>;
    fn player(&self) -> Box<dyn AudioPlayer>;
    fn output_dir(&self) -> PathBuf;
}

impl WorkerFactory for AppSettings {
    fn speech_engine(&self) -> Box<dyn SpeechEngine> {
        Box::new(self.command_engine())
    }

    fn player(&self) -> Box<dyn AudioPlayer> {
        Box::new(self.command_player())
    }

    fn output_dir(&self) -> PathBuf {
        self.output_dir.clone()
    }
}

struct ActiveWorker {
    handle: GenerationHandle,
    /// Cleared to drop the worker's remaining events.
    connected: Arc<AtomicBool>,
}

struct SettlingTicker {
    generation: GenerationId,
    stop: Arc<AtomicBool>,
}

/// Executes core effects on behalf of the UI thread.
pub struct EffectRunner<F: WorkerFactory> {
    factory: F,
    msg_tx: mpsc::Sender<Msg>,
    capture_console: bool,
    worker: Option<ActiveWorker>,
    ticker: Option<SettlingTicker>,
}

impl<F: WorkerFactory> EffectRunner<F> {
    pub fn new(factory: F, msg_tx: mpsc::Sender<Msg>) -> Self {
        Self {
            factory,
            msg_tx,
            capture_console: true,
            worker: None,
            ticker: None,
        }
    }

    #[cfg(test)]
    pub fn without_console_capture(mut self) -> Self {
        self.capture_console = false;
        self
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartGeneration {
                    generation,
                    request,
                } => self.start_generation(generation, request),
                Effect::CancelGeneration { generation, wait } => {
                    self.cancel_generation(generation, wait)
                }
                Effect::StartSettlingTicker {
                    generation,
                    interval,
                } => self.start_ticker(generation, interval),
                Effect::StopSettlingTicker { generation } => self.stop_ticker(generation),
                Effect::ShowNotice { severity, message } => {
                    let mut out = voicegen_engine::terminal();
                    let _ = render::notice(&mut out, severity, &message);
                    let _ = out.flush();
                }
            }
        }
    }

    /// Stop tickers and give a finished or cancelled worker a moment to exit.
    pub fn shutdown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop.store(true, Ordering::Release);
        }
        if let Some(mut worker) = self.worker.take() {
            worker.connected.store(false, Ordering::Release);
            if worker.handle.wait_timeout(CANCEL_WAIT).is_none() {
                engine_warn!(
                    "generation {} still running at exit",
                    worker.handle.generation()
                );
            }
        }
    }

    fn start_generation(&mut self, generation: GenerationId, request: GenerationRequest) {
        if let Some(previous) = self.worker.take() {
            previous.connected.store(false, Ordering::Release);
        }
        let job = job_from_request(generation, request);
        engine_info!(
            "StartGeneration generation={} chars={} play={} save={:?}",
            generation,
            job.text.chars().count(),
            job.play_after,
            job.save_as
        );

        let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>();
        let connected = Arc::new(AtomicBool::new(true));
        let mut worker = GenerationWorker::new(
            job,
            self.factory.speech_engine(),
            self.factory.player(),
            self.factory.output_dir(),
            Arc::new(ChannelEventSink::new(event_tx)),
        );
        if !self.capture_console {
            worker = worker.without_console_capture();
        }

        let handle = match GenerationHandle::spawn(worker) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = self.msg_tx.send(Msg::GenerationFinished {
                    generation,
                    outcome: GenerationOutcome::Failed {
                        message: format!("Generation failed: could not start worker: {err}"),
                    },
                });
                return;
            }
        };
        self.spawn_forwarder(event_rx, connected.clone());
        self.worker = Some(ActiveWorker { handle, connected });
    }

    fn cancel_generation(&mut self, generation: GenerationId, wait: Duration) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        if worker.handle.generation() != generation {
            self.worker = Some(worker);
            return;
        }
        worker.connected.store(false, Ordering::Release);
        worker.handle.cancel();
        match worker.handle.wait_timeout(wait) {
            Some(stage) => engine_info!("generation {} stopped at {:?}", generation, stage),
            None => engine_warn!(
                "generation {} did not stop within {:?}; detaching",
                generation,
                wait
            ),
        }
    }

    fn spawn_forwarder(&self, event_rx: mpsc::Receiver<WorkerEvent>, connected: Arc<AtomicBool>) {
        let msg_tx = self.msg_tx.clone();
        thread::spawn(move || {
            for event in event_rx {
                if !connected.load(Ordering::Acquire) {
                    break;
                }
                if msg_tx.send(map_event(event)).is_err() {
                    break;
                }
            }
        });
    }

    fn start_ticker(&mut self, generation: GenerationId, interval: Duration) {
        if let Some(previous) = self.ticker.take() {
            previous.stop.store(true, Ordering::Release);
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let msg_tx = self.msg_tx.clone();
        thread::spawn(move || loop {
            thread::sleep(interval);
            if flag.load(Ordering::Acquire) {
                break;
            }
            if msg_tx.send(Msg::SettlingTick { generation }).is_err() {
                break;
            }
        });
        self.ticker = Some(SettlingTicker { generation, stop });
    }

    fn stop_ticker(&mut self, generation: GenerationId) {
        if self
            .ticker
            .as_ref()
            .is_some_and(|ticker| ticker.generation == generation)
        {
            if let Some(ticker) = self.ticker.take() {
                ticker.stop.store(true, Ordering::Release);
            }
        }
    }
}

fn job_from_request(generation: GenerationId, request: GenerationRequest) -> GenerationJob {
    GenerationJob {
        id: generation,
        text: request.text,
        reference_audio: request.reference_audio,
        play_after: request.play_after,
        save_as: request.save_to_file.then_some(request.output_filename),
        device: request.device.as_str().to_string(),
        language: request.language.code().to_string(),
    }
}

fn map_event(event: WorkerEvent) -> Msg {
    match event {
        WorkerEvent::Milestone {
            generation,
            percent,
            label,
            ..
        } => Msg::WorkerProgress {
            generation,
            percent,
            label,
        },
        WorkerEvent::Console { generation, event } => Msg::Console {
            generation,
            signal: map_signal(event),
        },
        WorkerEvent::Finished { generation, result } => Msg::GenerationFinished {
            generation,
            outcome: match result {
                Ok(summary) => GenerationOutcome::Succeeded {
                    summary: summary.to_string(),
                    output_path: summary.saved_path,
                },
                Err(message) => GenerationOutcome::Failed { message },
            },
        },
    }
}

fn map_signal(event: ClassifiedEvent) -> ConsoleSignal {
    match event {
        ClassifiedEvent::Progress {
            phase,
            percent,
            label,
        } => ConsoleSignal::Progress {
            phase: map_phase(phase),
            percent,
            label,
        },
        ClassifiedEvent::Warning { text } => ConsoleSignal::Warning(text),
        ClassifiedEvent::Error { text } => ConsoleSignal::Error(text),
        ClassifiedEvent::InfoLog { text } => ConsoleSignal::Log(text),
        ClassifiedEvent::GenerationComplete => ConsoleSignal::Complete,
    }
}

fn map_phase(phase: ProgressPhase) -> Phase {
    match phase {
        ProgressPhase::Fetching => Phase::Fetching,
        ProgressPhase::Sampling => Phase::Sampling,
        ProgressPhase::GenericBar => Phase::Other,
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use voicegen_core::{Device, Language};
    use voicegen_engine::{EngineError, PlaybackError, Synthesis, SynthesisOptions};

    use super::*;

    /// Blocks in `synthesize` until released, ignoring cancellation.
    struct GatedEngine {
        release: Option<mpsc::Receiver<()>>,
    }

    impl SpeechEngine for GatedEngine {
        fn load_model(&mut self, _device: &str) -> Result<(), EngineError> {
            Ok(())
        }

        fn synthesize(
            &mut self,
            _text: &str,
            _options: SynthesisOptions<'_>,
        ) -> Result<Synthesis, EngineError> {
            if let Some(release) = self.release.take() {
                let _ = release.recv();
            }
            Ok(Synthesis {
                samples: vec![0.2, -0.2],
                sample_rate: 16_000,
            })
        }
    }

    struct SilentPlayer;

    impl AudioPlayer for SilentPlayer {
        fn play(&mut self, _audio: &Synthesis) -> Result<(), PlaybackError> {
            Ok(())
        }
    }

    /// The first engine handed out waits for the gate; later ones run straight through.
    struct GatedFactory {
        output: PathBuf,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl GatedFactory {
        fn new(output: &TempDir) -> (Self, mpsc::Sender<()>) {
            let (release_tx, release_rx) = mpsc::channel();
            let factory = Self {
                output: output.path().to_path_buf(),
                gate: Mutex::new(Some(release_rx)),
            };
            (factory, release_tx)
        }
    }

    impl WorkerFactory for GatedFactory {
        fn speech_engine(&self) -> Box<dyn SpeechEngine> {
            Box::new(GatedEngine {
                release: self.gate.lock().unwrap().take(),
            })
        }

        fn player(&self) -> Box<dyn AudioPlayer> {
            Box::new(SilentPlayer)
        }

        fn output_dir(&self) -> PathBuf {
            self.output.clone()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            text: "Late events".to_string(),
            reference_audio: None,
            play_after: false,
            save_to_file: false,
            output_filename: String::new(),
            device: Device::Cpu,
            language: Language::En,
        }
    }

    fn start(generation: GenerationId) -> Effect {
        Effect::StartGeneration {
            generation,
            request: request(),
        }
    }

    fn generation_of(msg: &Msg) -> Option<GenerationId> {
        match msg {
            Msg::WorkerProgress { generation, .. }
            | Msg::Console { generation, .. }
            | Msg::SettlingTick { generation }
            | Msg::GenerationFinished { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    /// Wait for the milestone reported just before synthesis starts.
    fn wait_for_preparing(msg_rx: &mpsc::Receiver<Msg>, generation: GenerationId) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match msg_rx.recv_timeout(left) {
                Ok(Msg::WorkerProgress {
                    generation: seen,
                    percent: 25,
                    ..
                }) if seen == generation => return,
                Ok(_) => {}
                Err(err) => panic!("generation {generation} never reached synthesis: {err}"),
            }
        }
    }

    fn drain(msg_rx: &mpsc::Receiver<Msg>, quiet: Duration) -> Vec<Msg> {
        let mut seen = Vec::new();
        while let Ok(msg) = msg_rx.recv_timeout(quiet) {
            seen.push(msg);
        }
        seen
    }

    #[test]
    fn superseded_worker_events_are_dropped() {
        let temp = TempDir::new().unwrap();
        let (factory, release) = GatedFactory::new(&temp);
        let (msg_tx, msg_rx) = mpsc::channel();
        let mut runner = EffectRunner::new(factory, msg_tx).without_console_capture();

        runner.enqueue(vec![start(1)]);
        wait_for_preparing(&msg_rx, 1);
        runner.enqueue(vec![start(2)]);
        release.send(()).unwrap();

        let seen = drain(&msg_rx, Duration::from_millis(300));
        runner.shutdown();

        assert!(seen.iter().all(|msg| generation_of(msg) == Some(2)), "{seen:?}");
        assert!(seen.iter().any(|msg| matches!(
            msg,
            Msg::GenerationFinished {
                generation: 2,
                outcome: GenerationOutcome::Succeeded { .. },
            }
        )));
    }

    #[test]
    fn cancelled_worker_stays_silent_after_detach() {
        let temp = TempDir::new().unwrap();
        let (factory, release) = GatedFactory::new(&temp);
        let (msg_tx, msg_rx) = mpsc::channel();
        let mut runner = EffectRunner::new(factory, msg_tx).without_console_capture();

        runner.enqueue(vec![start(3)]);
        wait_for_preparing(&msg_rx, 3);
        runner.enqueue(vec![Effect::CancelGeneration {
            generation: 3,
            wait: Duration::from_millis(50),
        }]);
        release.send(()).unwrap();

        let seen = drain(&msg_rx, Duration::from_millis(300));
        runner.shutdown();
        assert_eq!(seen, Vec::new());
    }

    #[test]
    fn settling_ticker_stops_on_request() {
        let temp = TempDir::new().unwrap();
        let (factory, _release) = GatedFactory::new(&temp);
        let (msg_tx, msg_rx) = mpsc::channel();
        let mut runner = EffectRunner::new(factory, msg_tx);

        runner.enqueue(vec![Effect::StartSettlingTicker {
            generation: 4,
            interval: Duration::from_millis(10),
        }]);
        assert_eq!(
            msg_rx.recv_timeout(Duration::from_secs(5)),
            Ok(Msg::SettlingTick { generation: 4 })
        );

        // A stop for another generation leaves the ticker running.
        runner.enqueue(vec![Effect::StopSettlingTicker { generation: 5 }]);
        assert_eq!(
            msg_rx.recv_timeout(Duration::from_secs(5)),
            Ok(Msg::SettlingTick { generation: 4 })
        );

        runner.enqueue(vec![Effect::StopSettlingTicker { generation: 4 }]);
        drain(&msg_rx, Duration::from_millis(50));
        assert!(drain(&msg_rx, Duration::from_millis(100)).is_empty());
    }
}
