//! The replica-aware connection manager.
//!
//! One [`Connection`] owns one driver session and is meant to be shared
//! (usually behind an `Arc`) by every task that talks to the database. Reads go
//! to a secondary first and fall back to the primary; writes go wherever the
//! driver sends them and can opt into a single reconnect-and-retry.
//!
//! Every attempt is counted in [`Metrics`], not every logical call: a `read`
//! that falls back to the primary shows up once under `ReadSecondary` and
//! once under `ReadPrimary`.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Settings;
use crate::driver::mongo::MongoDriver;
use crate::driver::{ClientSettings, DatabaseOf, Driver, ReadTarget, Session};
use crate::error::{DbError, Result};
use crate::metrics::{Metrics, OperationKind};
use crate::reconnect::RetryReconnector;
use crate::uri;

pub struct Connection<D: Driver = MongoDriver> {
    driver: D,
    settings: ClientSettings,
    session: RwLock<Option<Arc<D::Session>>>,
    replica_set: bool,
    db_name: String,
    metrics: Metrics,
}

impl Connection<MongoDriver> {
    /// Connect with settings from the environment (`APP_NAME`,
    /// `MONGODB_CONNECT_TIMEOUT_SECS`, ...), optionally overriding the URI.
    pub async fn new(uri: Option<&str>) -> Result<Self> {
        let mut settings = Settings::from_env();
        if let Some(uri) = uri {
            settings = settings.with_uri(uri);
        }
        Self::connect(MongoDriver, &settings).await
    }
}

impl<D: Driver> Connection<D> {
    /// Open a session and check both replica roles.
    ///
    /// Fails only when neither the primary nor a secondary answers a ping; one
    /// unreachable role is tolerated. A connection string that resolves to no
    /// database name is rejected before any I/O.
    pub async fn connect(driver: D, settings: &Settings) -> Result<Self> {
        let client_settings = settings.client_settings();
        let replica_set = client_settings.secondary_preferred;
        let db_name = uri::database_name(&client_settings.uri);
        if db_name.is_empty() {
            return Err(DbError::Config(
                "connection string names no database and no authSource".to_string(),
            ));
        }

        let session = driver.connect(&client_settings).await?;
        let primary = session.ping(ReadTarget::Primary).await;
        if let Err(err) = &primary {
            warn!(error = %err, "primary ping failed");
        }
        let secondary = session.ping(ReadTarget::Secondary).await;
        if let Err(err) = &secondary {
            warn!(error = %err, "secondary ping failed");
        }

        if let (Err(primary), Err(secondary)) = (primary, secondary) {
            if let Err(err) = session.disconnect().await {
                warn!(error = %err, "failed to release unreachable session");
            }
            return Err(DbError::Connectivity {
                primary: primary.to_string(),
                secondary: secondary.to_string(),
            });
        }

        info!(
            database = %db_name,
            replica_set,
            app_name = %client_settings.app_name,
            "connected to MongoDB"
        );

        let metrics = Metrics::new();
        metrics.init(&[]);

        Ok(Self {
            driver,
            settings: client_settings,
            session: RwLock::new(Some(Arc::new(session))),
            replica_set,
            db_name,
            metrics,
        })
    }

    pub fn replica_set(&self) -> bool {
        self.replica_set
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn session(&self) -> Result<Arc<D::Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DbError::NotConnected)
    }

    /// Point the manager at another database and restart the metrics day.
    ///
    /// Takes `&mut self`, so it cannot overlap with in-flight reads or writes.
    pub fn with_database(&mut self, name: impl Into<String>) -> Result<()> {
        if !self.is_connected() {
            return Err(DbError::NotConnected);
        }
        self.db_name = name.into();
        self.metrics.reset_period();
        self.metrics.init(&[]);
        Ok(())
    }

    /// Release the session. Every later operation fails with `NotConnected`.
    pub async fn close(&self) -> Result<()> {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DbError::NotConnected)?;
        session.disconnect().await?;
        info!(database = %self.db_name, "MongoDB connection closed");
        Ok(())
    }

    /// Handle on the working database, bound to the primary.
    pub fn database(&self) -> Result<DatabaseOf<D>> {
        Ok(self
            .session()?
            .database(&self.db_name, Some(ReadTarget::Primary)))
    }

    pub async fn ping(&self, target: ReadTarget) -> Result<()> {
        self.session()?.ping(target).await
    }

    /// Read from a secondary, falling back to the primary on any error.
    pub async fn read<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn(DatabaseOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.read_secondary(&op).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(error = %err, "secondary read failed, trying the primary");
                self.read_primary(&op).await
            }
        }
    }

    pub async fn read_primary<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn(DatabaseOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = match self.session() {
            Ok(session) => op(session.database(&self.db_name, Some(ReadTarget::Primary))).await,
            Err(err) => Err(err),
        };
        self.observe_read(OperationKind::ReadPrimary, started, &result);
        result
    }

    /// Ping a secondary, then run `op` with the session's default preference.
    /// A failed ping is returned without running `op`.
    pub async fn read_secondary<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn(DatabaseOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = self.try_secondary(&op).await;
        self.observe_read(OperationKind::ReadSecondary, started, &result);
        result
    }

    async fn try_secondary<F, Fut, T>(&self, op: &F) -> Result<T>
    where
        F: Fn(DatabaseOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.session()?;
        session.ping(ReadTarget::Secondary).await?;
        op(session.database(&self.db_name, None)).await
    }

    /// Single write attempt, no retry.
    pub async fn write<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(DatabaseOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = match self.session() {
            Ok(session) => op(session.database(&self.db_name, None)).await,
            Err(err) => Err(err),
        };
        self.metrics
            .inc_write(OperationKind::Write, result.as_ref().err());
        self.metrics.print(started, OperationKind::Write);
        result
    }

    /// Write with one reconnect-and-retry on a transient failure. When the
    /// retry succeeds the fresh session replaces the current one.
    pub async fn write_with_retry<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: Fn(DatabaseOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let current = self.session()?;
        let retried = RetryReconnector::new(&self.driver, &self.settings, &self.metrics)
            .run(current.as_ref(), &self.db_name, op)
            .await;

        if let Some(renewed) = retried.renewed {
            let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
            // a concurrent close wins; drop the renewed session with it
            if slot.is_some() {
                *slot = Some(Arc::new(renewed));
                info!("adopted renewed MongoDB connection");
            }
        }
        retried.result
    }

    fn observe_read<T>(&self, kind: OperationKind, started: Instant, result: &Result<T>) {
        self.metrics.inc_read(kind, result.as_ref().err());
        self.metrics.print(started, kind);
    }
}
