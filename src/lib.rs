//! Dial code service
//!
//! Fronts an external dial code registry and adds batch QR image generation:
//! minted or reserved codes are rendered with bounded concurrency, described by
//! a manifest, and tracked as a batch job that callers poll by process id. A
//! separate worker archives each manifest to R2 object storage.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
