//! Common utilities and shared types for roversign-rs.
//!
//! This crate provides foundational components used across all roversign-rs crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Metrics**: Process counters via [`Metrics`]
//!
//! # Example
//!
//! ```no_run
//! use rover_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {} (flush every {:?})", id, config.timing.activity_flush_interval());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod metrics;

pub use config::{Config, DatabaseConfig, ScheduleConfig, StateConfig, TimingConfig};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use metrics::{Metrics, MetricsSnapshot};
