#![forbid(unsafe_code)]

//! Shared building blocks for the mediagrab binaries.
//!
//! The `server` binary renders the paste-a-URL form and manages fetch jobs;
//! the `fetch_media` binary does the actual extraction work. Everything the
//! two sides agree on (URL classification, the fallback chain, progress and
//! outcome files, configuration) lives here.

pub mod classify;
pub mod config;
pub mod extract;
pub mod options;
pub mod progress;
pub mod security;
