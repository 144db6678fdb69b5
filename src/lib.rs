//! Replica-aware MongoDB connection manager.
//!
//! Reads prefer secondaries and fall back to the primary, writes can retry
//! once over a fresh connection after a transient fault, and every attempt is
//! counted in daily-rolling metrics per operation kind.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod reconnect;
pub mod uri;

pub use connection::Connection;
pub use driver::{ClientSettings, Driver, ReadTarget, Session};
pub use error::{DbError, Result};
pub use metrics::{MetricSnapshot, Metrics, OperationKind, OperationMetric};
