//! Vantage Flags - Feature Flag Dependencies
//!
//! Flags may require other flags to evaluate to true. This crate resolves
//! those requirements into ordered dependency chains for SDK local
//! evaluation, and rejects writes that would leave a live flag depending on a
//! flag that is off, missing, or part of a cycle.

pub mod graph;
pub mod local_eval;
pub mod service;
pub mod validation;

pub use graph::DependencyGraph;
pub use local_eval::{build_local_evaluation, LocalEvaluation};
pub use service::FlagWriteService;
pub use validation::{validate_create, validate_update};
