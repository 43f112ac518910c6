//! Shared data types crossing the script/host boundary.

pub mod thread;
pub mod value;
