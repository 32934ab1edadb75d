//! # Catty Application Library
//!
//! The HTTP API, CLI, configuration and federation layers of the `catty`
//! binary, exposed as a library so integration tests can drive them.

pub mod api;
pub mod cli;
pub mod config;
pub mod federation;
