//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Generation-checked handle types
//! - Time sources
//! - Logging utilities

pub mod collections;
pub mod time;
pub mod logging;
