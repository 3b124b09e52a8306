//! Core engine for LikeLater: the deep-link capture queue, the playback
//! history reconciliation engine, and the Spotify OAuth/PKCE token
//! lifecycle.  Rendering front-ends (the daemon HTTP API, the CLI) sit on
//! top of this crate and only ever observe its published snapshots.

pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod queue;
pub mod reconcile;
pub mod spotify;
