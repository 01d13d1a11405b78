//! Typed value generation for Smolder.
//!
//! A [`ValueGenerator`] is a pure, seeded, shrinkable producer of values of
//! one [`TypeRef`](smolder_core::TypeRef). The [`TypeRegistry`] binds types
//! to generators with registration, override and scoped-override semantics;
//! a run freezes it into a [`RegistrySnapshot`]. Every draw records its
//! decisions in a [`DrawTree`], and the [`shrink`] module minimizes failing
//! trees without knowing anything about the values they encode.

pub mod builtin;
pub mod combine;
pub mod error;
pub mod generator;
pub mod registry;
pub mod rng;
pub mod shrink;
pub mod tree;

pub use builtin::{
    BoolGen, BytesGen, ConstGen, DateGen, DateTimeGen, EnumGen, FloatGen, IntGen, StrGen, UuidGen,
};
pub use combine::{MapGen, OneOfGen, OptionalGen, RecordField, RecordGen, SeqGen};
pub use error::{GenError, ReplayError};
pub use generator::{DrawCtx, GeneratorHandle, ValueGenerator};
pub use registry::{RegistrySnapshot, ScopeGuard, TypeRegistry};
pub use rng::{child_seed, rng_for, splitmix64};
pub use tree::{DrawTree, NodeKind, TreeMetric};
