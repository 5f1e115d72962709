#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid envelope: {0}")]
    Envelope(#[from] crate::envelope::EnvelopeError),

    #[error("Invalid settings: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    #[error("Context document is not a mapping (found {0})")]
    NotAMapping(&'static str),
}
