//! Runtime machinery: scheduler, lists, host functions, passages.
//!
//! The four components are independent of one another; the embedding
//! interpreter composes them per script step.

pub mod external;
pub mod list;
pub mod passage;
pub mod registry;
pub mod scheduler;
