// ABOUTME: Library root for hal-agent - exposes public types for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod aws;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod exec;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod platforms;
pub mod ssh;
pub mod types;
pub mod waiter;
