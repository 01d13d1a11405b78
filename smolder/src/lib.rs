//! Smolder - property-based smoke testing for HTTP(S) APIs.
//!
//! Smolder drives a target server with large numbers of randomly-generated,
//! type-constrained requests and asserts that responses obey a configured
//! contract (at minimum: no 5xx). When a route misbehaves, the failing
//! input is shrunk to a locally minimal reproducer before it is reported.
//!
//! This facade crate re-exports the sub-crates through a single dependency:
//!
//! | Feature | Default | Crate           |
//! |---------|---------|-----------------|
//! | `tower` | **yes** | `smolder-tower` |
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use smolder::prelude::*;
//!
//! #[tokio::test]
//! async fn api_survives_random_requests() {
//!     let app: axum::Router = my_app();
//!     let routes = vec![
//!         RouteSpec::builder("/items/{id:int}").method(Method::GET).build()?,
//!     ];
//!     let engine = Engine::new(Arc::new(TowerTransport::new(app)));
//!     let report = engine.run(&routes, &RouteFilter::all()).await;
//!     assert!(report.all_passed(), "{:#?}", report);
//! }
//! ```

pub use smolder_core;
pub use smolder_engine;
pub use smolder_gen;

#[cfg(feature = "tower")]
pub use smolder_tower;

// Re-export everything from the core and engine at the top level for
// convenience.
pub use smolder_core::*;
pub use smolder_engine::{
    AllowedStatus, ApiKeyLocation, AuthDecorator, AuthTable, CompositeValidator,
    ContentTypeValidator, Coverage, Engine, EngineError, ExtractExpr, FailureKind,
    FailureReport, FnTransport, Link, LinkGraph, OpId, ParamSlot, RenderedRequest,
    RenderedResponse, RouteReport, RunReport, RunResult, RunSettings, SchemaValidator,
    StateMachineRunner, StatefulReport, StatefulSettings, StatusValidator, StepReport,
    Transport, TransportError, ValidationIssue, Validator, Verdict,
};
pub use smolder_gen::{
    DrawCtx, DrawTree, GenError, GeneratorHandle, RegistrySnapshot, TypeRegistry,
    ValueGenerator,
};

#[cfg(feature = "tower")]
pub use smolder_tower::TowerTransport;

pub mod prelude {
    //! Re-exports of the types almost every embedding needs.
    pub use smolder_core::{Field, GenValue, Method, RouteFilter, RouteSpec, TypeRef};
    pub use smolder_engine::{
        AuthDecorator, AuthTable, Engine, FailureKind, RunSettings, StatusValidator,
    };
    pub use smolder_gen::TypeRegistry;

    #[cfg(feature = "tower")]
    pub use smolder_tower::TowerTransport;
}
