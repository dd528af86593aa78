//! Voicegen core: pure generation controller state machine and view-model helpers.
mod effect;
mod msg;
mod progress;
mod request;
mod state;
mod update;
mod view_model;

pub use effect::{Effect, NoticeSeverity};
pub use msg::{ConsoleSignal, GenerationOutcome, Msg};
pub use progress::{
    remap, Phase, ProgressPolicy, ProgressState, CANCEL_WAIT, CONSOLE_LOG_LIMIT, SETTLE_INTERVAL,
    SETTLE_LABEL, SETTLE_START_PERCENT,
};
pub use request::{Device, GenerationRequest, Language, RequestError, RequestForm};
pub use state::{AppState, ConsoleLine, ConsoleSeverity, GenerationId, GenerationStatus, Notice};
pub use update::update;
pub use view_model::{AppViewModel, ProgressView};
