use crate::{ConsoleLine, GenerationStatus, Notice};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub status: GenerationStatus,
    /// Text box, checkboxes and navigation are usable.
    pub controls_enabled: bool,
    pub generate_enabled: bool,
    pub filename_enabled: bool,
    pub play_after: bool,
    pub save_to_file: bool,
    pub progress: Option<ProgressView>,
    pub console: Vec<ConsoleLine>,
    pub notice: Option<Notice>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub percent: u8,
    pub text: String,
}
