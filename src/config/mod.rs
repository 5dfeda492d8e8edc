//! Configuration module
//!
//! Persisted settings: saved connection credentials and export
//! preferences, stored as TOML in the platform config directory.

pub mod config;
