use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("PORTALGATE_HTTP_PORT").unwrap_or_else(|_| "3000".to_string());
    let token_file = std::env::var("PORTALGATE_TOKEN_FILE").unwrap_or_else(|_| "token.json".to_string());
    let verifier = std::env::var("PORTALGATE_VERIFIER").unwrap_or_else(|_| "portal".to_string());
    info!(
        target: "portalgate",
        "portalgate starting: RUST_LOG='{}', http_port={}, token_file='{}', verifier='{}'",
        rust_log, http_port, token_file, verifier
    );

    portalgate::server::run().await
}
