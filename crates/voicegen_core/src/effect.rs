use std::time::Duration;

use crate::{GenerationId, GenerationRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Spawn a worker for the request and connect its event channels.
    StartGeneration {
        generation: GenerationId,
        request: GenerationRequest,
    },
    /// Request cooperative cancellation and wait at most `wait` for the worker.
    CancelGeneration {
        generation: GenerationId,
        wait: Duration,
    },
    StartSettlingTicker {
        generation: GenerationId,
        interval: Duration,
    },
    StopSettlingTicker { generation: GenerationId },
    /// Blocking notice shown to the user.
    ShowNotice {
        severity: NoticeSeverity,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Information,
    Warning,
    Error,
}
