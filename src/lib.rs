//! Storyloom — runtime substrate for interactive fiction engines.
//!
//! Provides the machinery that drives simultaneous narrative branches
//! (cooperative thread scheduling), persistent multi-valued story state
//! (lists with bounded history), typed host function calls, and
//! reusable parameterized passages. The story graph itself and script
//! expression evaluation belong to the embedding interpreter.

pub mod core;
pub mod schema;
