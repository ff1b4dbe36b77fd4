//! Error taxonomy shared by the detector, pipeline and overlay.

/// Errors raised by the selection assistant core.
///
/// Detector-level variants (`DeviceRead`, `NoSelection`) never leave a tick.
/// Pipeline-level variants are always delivered to the overlay and rendered
/// as panel text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssistError {
    // ─────────────────────────────────────────────────────────────────────
    // Device errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("device read failed: {0}")]
    DeviceRead(String),

    #[error("no new selection")]
    NoSelection,

    #[error("clipboard write failed: {0}")]
    ClipboardWrite(String),

    // ─────────────────────────────────────────────────────────────────────
    // Request errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("API key is not configured")]
    MissingCredential,

    #[error("another request is already in progress")]
    AlreadyInFlight,

    #[error("network error: {0}")]
    Transport(String),

    #[error("service error: {0}")]
    Service(String),
}

impl AssistError {
    /// Whether the overlay should surface this error to the user.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            AssistError::MissingCredential
                | AssistError::AlreadyInFlight
                | AssistError::Transport(_)
                | AssistError::Service(_)
        )
    }
}

pub type Result<T, E = AssistError> = std::result::Result<T, E>;
