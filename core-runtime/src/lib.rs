//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync engine:
//! - Logging and tracing infrastructure
//! - Configuration management (environment, env file, builder validation)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the configuration surface and logging conventions used
//! throughout the workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AppConfig, SyncMode};
pub use error::{Error, Result};
