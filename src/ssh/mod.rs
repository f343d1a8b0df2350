// ABOUTME: SSH client module for remote deploy targets.
// ABOUTME: Supports SSH agent and key-based authentication with known_hosts verification.

mod client;
mod error;

pub use client::{ExecOutput, Session, SessionConfig};
pub use error::{Error, Result};
