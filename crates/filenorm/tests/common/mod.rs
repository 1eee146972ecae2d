//! Shared test utilities for filenorm integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs against a temp storage root and database
//! - Scripted renderers that record every call

pub mod harness;
pub mod renderers;

pub use harness::{wait_for_status, wait_until, TestHarness};
pub use renderers::*;
