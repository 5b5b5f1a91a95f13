//! Authentication module: registration, sessions, token validation and the
//! HTTP surface over them.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
