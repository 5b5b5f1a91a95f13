//! Small building blocks shared by the database, repository and auth layers.

pub mod context;
pub mod crypto;
pub mod jwt;
