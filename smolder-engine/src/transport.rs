//! The abstract in-process request/response driver.
//!
//! The engine depends on no particular HTTP client; anything that can turn a
//! [`RequestPlan`] into a [`ResponseData`] works, including plain closures
//! via [`FnTransport`] for deterministic tests.

use async_trait::async_trait;

use smolder_core::{RequestPlan, ResponseData};

/// Why a request never produced a response.
///
/// Transport errors are returned to the runner as data - they count as
/// failing trials of kind `server_unreachable`, they are never thrown
/// through the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The per-trial timeout elapsed.
    Timeout,
    /// Connection-level failure.
    Unreachable(String),
    /// The server answered with something that could not be parsed as an
    /// HTTP response.
    Malformed(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "request timed out"),
            TransportError::Unreachable(msg) => write!(f, "server unreachable: {msg}"),
            TransportError::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Async request/response driver.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, plan: &RequestPlan) -> Result<ResponseData, TransportError>;
}

/// A transport backed by a synchronous closure; the workhorse of
/// deterministic tests.
pub struct FnTransport<F>
where
    F: Fn(&RequestPlan) -> Result<ResponseData, TransportError> + Send + Sync,
{
    f: F,
}

impl<F> FnTransport<F>
where
    F: Fn(&RequestPlan) -> Result<ResponseData, TransportError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(&RequestPlan) -> Result<ResponseData, TransportError> + Send + Sync,
{
    async fn send(&self, plan: &RequestPlan) -> Result<ResponseData, TransportError> {
        (self.f)(plan)
    }
}
