use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use sitechat::config::AppConfig;
use sitechat::logging;
use sitechat::server::router;
use sitechat::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Startup problems leave the service degraded rather than killing the
    // process, so the HTTP surface stays up to report the failure.
    let state = match AppConfig::from_env() {
        Ok(config) => {
            logging::init(&config.log_dir);
            AppState::initialize(config).await
        }
        Err(err) => {
            let config = AppConfig::default();
            logging::init(&config.log_dir);
            tracing::error!("invalid configuration, service degraded: {}", err);
            AppState::degraded(config, err)
        }
    };

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(0);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("SITECHAT_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = router::router(state);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
