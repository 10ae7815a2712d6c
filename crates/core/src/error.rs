/// Result alias that carries the custom [`BeatCutError`] type.
pub type Result<T> = std::result::Result<T, BeatCutError>;

/// Common error type for the core crate.
///
/// The first four variants are the scheduling and effect validation failures.
/// They are always fatal: no partial schedule is ever handed to a render
/// pipeline once one of them has been raised.
#[derive(Debug, thiserror::Error)]
pub enum BeatCutError {
    /// Pacing bounds or output format are unusable.
    #[error("invalid pacing: {0}")]
    InvalidPacing(String),
    /// The requested output duration is not a positive, finite number.
    #[error("invalid duration: total output duration must be > 0, got {0}")]
    InvalidDuration(f64),
    /// No event falls inside the output window.
    #[error("insufficient events: no usable event in (0, {window}] out of {provided} provided")]
    InsufficientEvents { provided: usize, window: f64 },
    /// An effect toggle or gain is out of range.
    #[error("invalid effect config: {0}")]
    InvalidEffectConfig(String),
    /// The event list violates ordering or range requirements.
    #[error("invalid events: {0}")]
    InvalidEvents(String),
    /// Source media could not be probed or decoded.
    #[error("media error: {0}")]
    Media(String),
    /// The render pipeline failed.
    #[error("render error: {0}")]
    Render(String),
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl BeatCutError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn pacing<T: Into<String>>(msg: T) -> Self {
        Self::InvalidPacing(msg.into())
    }

    pub(crate) fn effect<T: Into<String>>(msg: T) -> Self {
        Self::InvalidEffectConfig(msg.into())
    }

    pub(crate) fn media<T: Into<String>>(msg: T) -> Self {
        Self::Media(msg.into())
    }

    pub(crate) fn render<T: Into<String>>(msg: T) -> Self {
        Self::Render(msg.into())
    }
}

impl From<&str> for BeatCutError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatCutError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
