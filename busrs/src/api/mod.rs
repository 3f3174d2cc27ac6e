//! Public API module.
//!
//! The [`Session`](session::Session) façade together with the configuration
//! and event models it works with.

pub mod config;
pub mod models;
pub mod session;
