//! The database driver as seen by the connection manager.
//!
//! The manager never speaks the wire protocol itself. It needs four things from
//! a driver: open a session, ping a replica role, hand out a database handle
//! and tear the session down. [`Driver`] and [`Session`] are that contract;
//! [`mongo::MongoDriver`] is the production implementation.

pub mod mongo;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Replica role a ping or a database handle is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadTarget {
    Primary,
    Secondary,
}

/// Everything a driver needs to open one session.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub uri: String,
    pub app_name: String,
    pub connect_timeout: Duration,
    /// Bias reads towards secondaries when no preference is given per handle.
    pub secondary_preferred: bool,
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Session: Session;

    async fn connect(&self, settings: &ClientSettings) -> Result<Self::Session>;
}

#[async_trait]
pub trait Session: Send + Sync + 'static {
    type Database: Clone + Send + Sync + 'static;

    async fn ping(&self, target: ReadTarget) -> Result<()>;

    /// Handle on `name`. `None` leaves the read preference to the session default.
    fn database(&self, name: &str, target: Option<ReadTarget>) -> Self::Database;

    async fn disconnect(&self) -> Result<()>;
}

/// Database handle type produced by a driver's sessions.
pub type DatabaseOf<D> = <<D as Driver>::Session as Session>::Database;
