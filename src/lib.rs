//! SnapLens: snip a screen region, get a model's analysis back.
//!
//! This crate wires together:
//! - Screen capture domain (capture/)
//! - Upload and analysis providers (providers/)
//! - Single-capture and batch pipelines (pipeline/)
//! - Settings, credentials and shortcut bindings (settings.rs, shortcuts.rs)
//! - The event coordinator the window shell talks to (app.rs)

pub mod app;
pub mod capture;
pub mod config;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod safety;
pub mod settings;
pub mod shortcuts;
