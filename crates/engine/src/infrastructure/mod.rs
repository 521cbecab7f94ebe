//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod app_settings;
pub mod clock;
pub mod image_local;
pub mod image_remote;
pub mod json_repair;
pub mod lifecycle;
pub mod memory_store;
pub mod ollama;
pub mod ports;
