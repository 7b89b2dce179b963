//! Core services for roversign-rs.
//!
//! Event multiplexing between the messaging substrate and observer modules,
//! activity coalescing, the persistence write gate and routing resolution.

pub mod services;

pub use services::*;
