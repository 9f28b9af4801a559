//! Shared test utilities for snapex integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp mount root
//! - Builders for job specs plus scripted mount providers and extractors

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{TestHarness, BACKUP_ID};
