use thiserror::Error;

/// Everything the engine can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("accelerator {0} is already in use")]
    AcceleratorAlreadyBound(String),

    #[error("invalid accelerator: {0}")]
    InvalidAccelerator(String),

    #[error("screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("no template captured")]
    NoTemplateCaptured,

    #[error("unknown macro: {0}")]
    UnknownMacro(String),

    #[error("invalid macro {0}: {1}")]
    InvalidMacro(String, String),

    #[error("input synthesis failed: {0}")]
    InputFailed(String),

    #[error("hotkey backend error: {0}")]
    HotkeyBackend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings format error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
