//! # Shell Module
//!
//! Entry point and command-line interface for the `secllama-security` binary,
//! an operator tool over the security layer: inspect the platform backends,
//! encrypt and decrypt with the stored key, rotate it, render sandbox
//! profiles and launch a program under the runner sandbox.

pub mod cli;

pub use cli::{Cli, Command, PolicyArgs, run};
