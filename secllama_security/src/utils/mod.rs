//! Process-level utilities.

pub mod logging;
