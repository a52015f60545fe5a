//! Core types: errors, configuration, shared path and file helpers.

pub mod config;
pub mod errors;
pub mod fsio;
pub mod paths;
