//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the migration tools:
//! - Logging and tracing infrastructure
//! - Typed, validated configuration for both migration modes
//! - Configuration fingerprinting used to guard resumed runs
//!
//! ## Overview
//!
//! Everything here runs once at startup, before any engine component is
//! constructed. A configuration that fails validation never reaches the engine.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{MigrateConfig, PullUploadConfig};
pub use error::{Error, Result};
