//! Type definitions and constants.
//!
//! The cached value model and the bus names the bundled service bindings use.

pub mod constants;
pub mod value;
