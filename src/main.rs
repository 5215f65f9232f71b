use hookdeploy::AppState;
use hookdeploy::config::Config;
use hookdeploy::handlers;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/projects.json";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path = PathBuf::from(
        std::env::var("HOOKDEPLOY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    );

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt::init();

    let bind_address = format!("0.0.0.0:{}", config.webhook.port);
    let webhook_path = config.webhook.path.clone();
    let state = Arc::new(AppState::new(config_path.clone(), config));
    let app = handlers::router(state);

    info!("Listening on {}, webhook path {}", bind_address, webhook_path);
    info!("Using config at {:?}", config_path);
    let listener = tokio::net::TcpListener::bind(&bind_address).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
