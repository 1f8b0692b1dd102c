//! examscore-core: Item model, validation, grading, and score rollup.
//!
//! This crate defines the gradable item model, the three graders, the
//! aggregation tree, and the session engine that the rest of examscore
//! builds on.

pub mod aggregate;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod grade;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod report;
pub mod traits;
pub mod validate;
