//! State management module
//!
//! This module handles all application state, including:
//! - Crop geometry and the active edit session (edit.rs)
//! - Shared data structures (data.rs)
//! - The ordered image collection and file import (library.rs)
//! - Persistent presets and settings (presets.rs)

pub mod data;
pub mod edit;
pub mod library;
pub mod presets;
