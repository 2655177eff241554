use thiserror::Error;

/// Errors surfaced by panel operations.
///
/// Analyze-path errors are terminal for that attempt: they render as the
/// single-line error state and the panel returns to an interactive state.
/// Chat errors are scoped to the one pending turn — they never clear the
/// history and never block subsequent sends. No variant is fatal to the
/// process.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoachError {
    /// No API key configured. The panel routes the user to settings.
    #[error("Please set your API key in settings")]
    MissingCredential,

    /// The active tab is not on the game domain.
    #[error("Not on a GeoGuessr page")]
    IneligiblePage,

    /// The active tab is on a multiplayer sub-route.
    #[error("Disabled on multiplayer games")]
    MultiplayerDisabled,

    /// Screenshot capture failed. The underlying message is surfaced verbatim.
    #[error("{0}")]
    CaptureFailure(String),

    /// The inference call failed — transport error, non-success status, or a
    /// response that does not match the expected shape.
    #[error("{0}")]
    Provider(String),

    /// Chat send with blank text. Silently ignored, never rendered.
    #[error("empty input")]
    EmptyInput,

    /// A request of the same category is already in flight.
    #[error("A request is already in progress")]
    Busy,
}
