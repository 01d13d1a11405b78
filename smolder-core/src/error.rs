/// Errors raised while constructing or inspecting the core data model.
///
/// These are structural integrity violations of inputs: they bubble to the
/// caller and are never converted into failing trials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A route pattern could not be parsed.
    PatternSyntax { pattern: String, reason: String },

    /// A `RouteSpec` violates an invariant (duplicate placeholder, missing
    /// type binding, name collision, body on a bodiless method, ...).
    InvalidRouteSpec { route: String, reason: String },

    /// A path parameter rendered to an empty segment, which would collapse
    /// the path.
    EmptyPathSegment { name: String },

    /// A path parameter named by the pattern has no value in the values map.
    MissingPathValue { name: String },

    /// A JSON Schema fragment could not be lowered into a `TypeRef`.
    SchemaLowering(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::PatternSyntax { pattern, reason } => {
                write!(f, "invalid route pattern `{pattern}`: {reason}")
            }
            CoreError::InvalidRouteSpec { route, reason } => {
                write!(f, "invalid route spec `{route}`: {reason}")
            }
            CoreError::EmptyPathSegment { name } => {
                write!(f, "path parameter `{name}` rendered to an empty segment")
            }
            CoreError::MissingPathValue { name } => {
                write!(f, "no value supplied for path parameter `{name}`")
            }
            CoreError::SchemaLowering(msg) => write!(f, "unsupported JSON schema: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}
