//! Shared building blocks for the SecLlama security layer.
//!
//! - **`env`**: boolean environment toggles.
//! - **`key_state`**: observable key lifecycle state machine.

pub mod env;
pub mod key_state;
