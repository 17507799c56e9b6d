//! # Sitrep Application
//!
//! This library exposes the sitrep app modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod collect;
pub mod config;

// Re-export sitrep_core for convenience
pub use sitrep_core;
