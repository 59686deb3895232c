//! Common utilities for usb-host-rs
//!
//! Shared plumbing for the workspace: logging setup, a small shared error
//! type, and the scripted in-memory transport plus descriptor fixture
//! builders used by tests across crates.

pub mod error;
pub mod logging;
pub mod test_support;

pub use error::{Error, Result};
pub use logging::setup_logging;
