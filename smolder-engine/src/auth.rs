//! Credential injection for outgoing requests.
//!
//! Auth is applied after every other header so generated header parameters
//! can never mask a credential. Missing credentials fail the route before
//! its first trial rather than once per trial.

use smolder_core::{Glob, RequestPlan};

use crate::error::EngineError;

/// Where a concrete token string comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Static(String),
    /// Read from the named environment variable at request time.
    Env(String),
}

impl TokenSource {
    pub fn resolve(&self) -> Result<String, EngineError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Env(name) => std::env::var(name)
                .map_err(|_| EngineError::MissingCredential(format!("environment `${name}`"))),
        }
    }
}

/// Where an API key parameter goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
}

/// The credential scheme for a route.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecorator {
    None,
    Bearer(TokenSource),
    ApiKey { name: String, location: ApiKeyLocation, source: TokenSource },
    Composite(Vec<AuthDecorator>),
}

impl AuthDecorator {
    pub fn bearer_env(name: impl Into<String>) -> Self {
        AuthDecorator::Bearer(TokenSource::Env(name.into()))
    }

    pub fn bearer_static(token: impl Into<String>) -> Self {
        AuthDecorator::Bearer(TokenSource::Static(token.into()))
    }

    /// Resolve every token source once, without building a request. Called
    /// before the first trial so a missing credential fails the route fast.
    pub fn preflight(&self) -> Result<(), EngineError> {
        match self {
            AuthDecorator::None => Ok(()),
            AuthDecorator::Bearer(source) => source.resolve().map(|_| ()),
            AuthDecorator::ApiKey { source, .. } => source.resolve().map(|_| ()),
            AuthDecorator::Composite(children) => {
                children.iter().try_for_each(AuthDecorator::preflight)
            }
        }
    }

    /// Inject credentials into an outgoing request.
    pub fn apply(&self, plan: &mut RequestPlan) -> Result<(), EngineError> {
        match self {
            AuthDecorator::None => Ok(()),
            AuthDecorator::Bearer(source) => {
                let token = source.resolve()?;
                let value = format!("Bearer {token}")
                    .parse()
                    .map_err(|_| EngineError::MissingCredential("unprintable token".into()))?;
                plan.headers.insert(http::header::AUTHORIZATION, value);
                Ok(())
            }
            AuthDecorator::ApiKey { name, location, source } => {
                let token = source.resolve()?;
                match location {
                    ApiKeyLocation::Header => {
                        let header_name: http::HeaderName = name.parse().map_err(|_| {
                            EngineError::MissingCredential(format!("invalid header `{name}`"))
                        })?;
                        let value = token.parse().map_err(|_| {
                            EngineError::MissingCredential("unprintable token".into())
                        })?;
                        plan.headers.insert(header_name, value);
                    }
                    ApiKeyLocation::Query => {
                        plan.query.push((name.clone(), token));
                    }
                }
                Ok(())
            }
            AuthDecorator::Composite(children) => {
                children.iter().try_for_each(|child| child.apply(plan))
            }
        }
    }
}

/// Route-level auth resolution: a default plus glob-pattern overrides,
/// resolved by longest match before the first trial.
#[derive(Debug, Clone)]
pub struct AuthTable {
    default: AuthDecorator,
    overrides: Vec<(Glob, AuthDecorator)>,
}

impl AuthTable {
    pub fn none() -> Self {
        Self { default: AuthDecorator::None, overrides: Vec::new() }
    }

    pub fn with_default(default: AuthDecorator) -> Self {
        Self { default, overrides: Vec::new() }
    }

    pub fn add_override(mut self, pattern: &str, auth: AuthDecorator) -> Self {
        self.overrides.push((Glob::new(pattern), auth));
        self
    }

    /// The decorator for a route path: the matching override with the most
    /// literal characters, ties broken by declaration order; otherwise the
    /// default.
    pub fn for_path(&self, path: &str) -> &AuthDecorator {
        let mut best: Option<(usize, &AuthDecorator)> = None;
        for (glob, auth) in &self.overrides {
            if !glob.matches(path) {
                continue;
            }
            let len = glob.literal_len();
            // Strict comparison keeps the first of equally-specific entries.
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, auth));
            }
        }
        best.map(|(_, auth)| auth).unwrap_or(&self.default)
    }
}
