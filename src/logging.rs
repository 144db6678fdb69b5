//! Process-wide tracing setup.
//!
//! [`init`] installs the subscriber once; later calls are no-ops. The level
//! filter sits behind a reload layer so [`set_filter`] can swap it at runtime.

use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// `APP_ENV=development` (or `dev`) gets human-readable output, anything else JSON.
fn is_development() -> bool {
    matches!(
        std::env::var("APP_ENV").as_deref(),
        Ok("development") | Ok("dev")
    )
}

pub fn init() {
    FILTER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, handle) = reload::Layer::new(filter);
        let registry = tracing_subscriber::registry().with(filter);

        let installed = if is_development() {
            registry.with(fmt::layer().pretty()).try_init()
        } else {
            registry.with(fmt::layer().json()).try_init()
        };
        if let Err(err) = installed {
            // someone else owns the global subscriber; keep theirs
            tracing::debug!(error = %err, "global subscriber already set");
        }
        handle
    });
}

/// Replace the active filter, e.g. `set_filter("replica_link=debug")`.
pub fn set_filter(directives: &str) -> Result<()> {
    let handle = FILTER
        .get()
        .ok_or_else(|| anyhow!("logging has not been initialised"))?;
    let filter = EnvFilter::try_new(directives)
        .with_context(|| format!("invalid log filter `{}`", directives))?;
    handle
        .reload(filter)
        .context("failed to swap the log filter")?;
    Ok(())
}
