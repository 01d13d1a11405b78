use smolder_core::TypeRef;

/// Errors raised while resolving or registering generators.
///
/// These are fatal for the affected route only; they never poison a run.
#[derive(Debug, Clone, PartialEq)]
pub enum GenError {
    /// `register` was called for a type that already has a generator and the
    /// override flag was not set.
    AlreadyRegistered(TypeRef),

    /// Generator resolution reached a leaf it cannot synthesize and no user
    /// generator is registered for it.
    UnsupportedType(TypeRef),

    /// A `Ref` names a schema absent from the schema table.
    UnresolvedRef(String),

    /// A recursive schema has no finite expansion (no optional to drop, no
    /// non-recursive variant to pick).
    NoFiniteExpansion(String),
}

impl std::fmt::Display for GenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenError::AlreadyRegistered(ty) => {
                write!(f, "a generator is already registered for {ty}")
            }
            GenError::UnsupportedType(ty) => write!(f, "no generator available for {ty}"),
            GenError::UnresolvedRef(name) => write!(f, "unresolved schema ref `{name}`"),
            GenError::NoFiniteExpansion(name) => {
                write!(f, "recursive schema `{name}` has no finite expansion")
            }
        }
    }
}

impl std::error::Error for GenError {}

/// Why a draw tree could not be replayed into a value.
///
/// Replay failures are expected during shrinking - an edited tree may no
/// longer fit the generator that produced it - and simply discard the
/// candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// The tree node does not have the shape this generator draws.
    Structure(&'static str),

    /// A leaf value fell outside the generator's configured range.
    OutOfRange,
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Structure(what) => write!(f, "tree shape mismatch: {what}"),
            ReplayError::OutOfRange => write!(f, "leaf value out of range"),
        }
    }
}

impl std::error::Error for ReplayError {}
