use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::worker::{CancelToken, GenerationWorker};
use crate::{GenerationId, GenerationStage};

/// Controller-side handle of one worker thread.
pub struct GenerationHandle {
    generation: GenerationId,
    cancel: CancelToken,
    done_rx: mpsc::Receiver<GenerationStage>,
    final_stage: Option<GenerationStage>,
    thread: Option<thread::JoinHandle<()>>,
}

impl GenerationHandle {
    pub fn spawn(worker: GenerationWorker) -> io::Result<Self> {
        let generation = worker.job().id;
        let cancel = worker.cancel_token();
        let (done_tx, done_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("generation-{generation}"))
            .spawn(move || {
                let stage = worker.run();
                let _ = done_tx.send(stage);
            })?;
        Ok(Self {
            generation,
            cancel,
            done_rx,
            final_stage: None,
            thread: Some(thread),
        })
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Request cooperative cancellation; the worker stops at its next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait up to `timeout` for the worker to exit; `None` if it is still running.
    ///
    /// A worker stuck inside a long engine call keeps running detached; the
    /// handle can be dropped without joining it.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<GenerationStage> {
        if self.final_stage.is_none() {
            match self.done_rx.recv_timeout(timeout) {
                Ok(stage) => self.final_stage = Some(stage),
                Err(mpsc::RecvTimeoutError::Timeout) => return None,
                // Worker thread exited without reporting, i.e. it panicked.
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.final_stage = Some(GenerationStage::Failed)
                }
            }
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
        self.final_stage
    }

    pub fn is_finished(&mut self) -> bool {
        self.wait_timeout(Duration::ZERO).is_some()
    }
}
