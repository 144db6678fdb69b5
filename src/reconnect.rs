//! One-shot reconnect for writes that hit a connection-level fault.

use std::future::Future;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::driver::{ClientSettings, Driver, ReadTarget, Session};
use crate::error::Result;
use crate::metrics::{Metrics, OperationKind};

/// Result of a retried write, plus the replacement session when the retry won.
pub struct Retried<S, T> {
    pub result: Result<T>,
    pub renewed: Option<S>,
}

pub struct RetryReconnector<'a, D: Driver> {
    driver: &'a D,
    settings: &'a ClientSettings,
    metrics: &'a Metrics,
}

impl<'a, D: Driver> RetryReconnector<'a, D> {
    pub fn new(driver: &'a D, settings: &'a ClientSettings, metrics: &'a Metrics) -> Self {
        Self {
            driver,
            settings,
            metrics,
        }
    }

    /// Run `op` against `current`. A transient failure buys exactly one more
    /// attempt on a brand-new session; anything else is returned as is.
    pub async fn run<F, Fut, T>(
        &self,
        current: &D::Session,
        db_name: &str,
        op: F,
    ) -> Retried<D::Session, T>
    where
        F: Fn(<D::Session as Session>::Database) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first = self.attempt(current, db_name, &op).await;
        let cause = match first {
            Err(err) if err.is_transient() => err,
            other => {
                return Retried {
                    result: other,
                    renewed: None,
                };
            }
        };
        warn!(error = %cause, "retrying write after transient error, reconnecting");

        let session = match self.driver.connect(self.settings).await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "reconnect failed, keeping current connection");
                return Retried {
                    result: Err(cause),
                    renewed: None,
                };
            }
        };
        // unlike construction, two failed pings do not stop the retry
        for target in [ReadTarget::Primary, ReadTarget::Secondary] {
            if let Err(err) = session.ping(target).await {
                warn!(?target, error = %err, "ping failed on renewed connection");
            }
        }

        match self.attempt(&session, db_name, &op).await {
            Ok(value) => {
                info!("write succeeded after reconnection");
                Retried {
                    result: Ok(value),
                    renewed: Some(session),
                }
            }
            Err(err) => {
                warn!(error = %err, "write failed again after reconnection, keeping current connection");
                if let Err(close_err) = session.disconnect().await {
                    warn!(error = %close_err, "failed to release discarded connection");
                }
                Retried {
                    result: Err(err),
                    renewed: None,
                }
            }
        }
    }

    async fn attempt<F, Fut, T>(&self, session: &D::Session, db_name: &str, op: &F) -> Result<T>
    where
        F: Fn(<D::Session as Session>::Database) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = op(session.database(db_name, None)).await;
        self.metrics
            .inc_write(OperationKind::Write, result.as_ref().err());
        self.metrics.print(started, OperationKind::Write);
        result
    }
}
