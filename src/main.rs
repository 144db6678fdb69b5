use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use replica_link::{
    config::Settings,
    connection::Connection,
    driver::mongo::MongoDriver,
    health, logging,
    uri::{self, TerminalPrompt},
};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let mut settings = Settings::from_env();
    if settings.prompt_credentials {
        let prepared = uri::prepare_uri(&settings.mongodb_uri, &mut TerminalPrompt)
            .context("failed to prepare MongoDB credentials")?;
        settings = settings.with_uri(prepared);
    }

    let conn = Connection::connect(MongoDriver, &settings)
        .await
        .context("failed to connect to MongoDB")?;
    let conn = Arc::new(conn);

    let app = health::router(Arc::clone(&conn)).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    conn.close().await.context("failed to close MongoDB connection")?;
    Ok(())
}
