//! Shared HTTP plumbing: the JSON response envelope and error mapping.

pub mod common;
