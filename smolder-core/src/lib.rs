//! Core data model for Smolder, the property-based HTTP smoke tester.
//!
//! This crate owns everything the engine and the generators agree on:
//! the [`RouteSpec`] endpoint descriptor, the [`TypeRef`] schema AST, the
//! dynamic [`GenValue`] produced by generators, path/query encoding, glob
//! route filtering, and the request/response wire contracts a transport
//! speaks. It has no async code and no I/O.

pub mod encode;
pub mod error;
pub mod filter;
pub mod openapi;
pub mod request;
pub mod route;
pub mod typeref;
pub mod value;

pub use encode::{decode_segment, encode_path, encode_query, encode_segment};
pub use error::CoreError;
pub use filter::{Glob, RouteFilter};
pub use openapi::{routes_from_openapi, ExtractedRoutes};
pub use request::{canonical_headers, RequestBody, RequestPlan, ResponseData};
pub use route::{
    method_allows_body, PathPattern, QueryParam, ResponseContract, RouteSpec, RouteSpecBuilder,
    Segment,
};
pub use typeref::{Field, Primitive, SchemaTable, TypeRef};
pub use value::GenValue;

// Re-export the HTTP vocabulary types used throughout the public API.
pub use http::{HeaderMap, Method, StatusCode};
