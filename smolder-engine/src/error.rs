use smolder_core::CoreError;
use smolder_gen::GenError;

/// Engine-level errors that end a route before (or instead of) its trials.
///
/// These are fatal for the affected route only and never poison the rest of
/// the run. Transport and validator failures are *not* errors: they are
/// failing trials, carried in `RunResult`s.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Generator resolution failed for one of the route's parameters.
    Unsupported(GenError),

    /// An auth token source resolved to nothing (e.g. unset environment
    /// variable). Detected before the first trial.
    MissingCredential(String),

    /// The route spec itself is structurally invalid.
    InvalidRoute(CoreError),

    /// A link-extraction expression could not be parsed.
    InvalidLinkExpr(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unsupported(err) => write!(f, "{err}"),
            EngineError::MissingCredential(source) => {
                write!(f, "missing credential: {source}")
            }
            EngineError::InvalidRoute(err) => write!(f, "{err}"),
            EngineError::InvalidLinkExpr(expr) => {
                write!(f, "invalid link extraction expression `{expr}`")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GenError> for EngineError {
    fn from(err: GenError) -> Self {
        EngineError::Unsupported(err)
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        EngineError::InvalidRoute(err)
    }
}
