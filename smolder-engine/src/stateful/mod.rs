//! Stateful mode: rule-based state machines derived from response→request
//! data dependencies.

mod links;
mod machine;

pub use links::{ExtractExpr, Link, LinkGraph, OpId, ParamSlot};
pub use machine::StateMachineRunner;
