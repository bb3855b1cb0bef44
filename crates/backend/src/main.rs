pub mod api;
pub mod domain;
pub mod routes;
pub mod shared;
pub mod system;
pub mod usecases;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use axum::http::{header, Method};
    use axum::middleware;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tower_http::cors::{Any, CorsLayer};

    system::tracing::initialize()?;

    // Конфигурация и клиент Google: ошибка здесь фатальна
    let config = shared::config::load_config().context("failed to load configuration")?;
    shared::google_sheets::initialize(&config.google)
        .context("failed to initialize Google Sheets client")?;
    let bind = config.server.bind.clone();
    let max_upload_bytes = config.server.max_upload_bytes();
    shared::config::initialize(config)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let app = routes::configure_routes(max_upload_bytes)
        .layer(middleware::from_fn(system::middleware::request_logger))
        .layer(cors);

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid server.bind address '{}'", bind))?;

    tracing::info!("Attempting to bind server to http://{}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!("Server successfully bound to {}", addr);
            listener
        }
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(
                    "Error: {} is already in use. Please ensure no other process is using this port.",
                    addr
                );
            } else {
                tracing::error!("Failed to bind to {}. Error: {}", addr, e);
            }
            return Err(e.into());
        }
    };

    axum::serve(listener, app).await?;

    Ok(())
}
