//! Credential issuance and validation service.
//!
//! The binary in `main.rs` wires these modules into an Axum server. The
//! credential store, token validator and orchestrator are usable on their own
//! by seed and admin tooling.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod repositories;
pub mod utils;
