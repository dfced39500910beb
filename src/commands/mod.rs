//! Command implementations for the CLI
//!
//! This module contains the implementation of all CLI commands:
//! - serve: Start the standalone server
//! - check: Test configuration validity
//! - stats: Per-endpoint statistics table
//! - keys: Read-API key management

pub mod check;
pub mod keys;
pub mod serve;
pub mod stats;
