use std::sync::Arc;

use chatgpt_share_api::browser::ChromeLauncher;
use chatgpt_share_api::config::Config;
use chatgpt_share_api::routes::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let launcher = Arc::new(ChromeLauncher::new(
        config.chrome_bin.clone(),
        config.headless,
        config.user_agent.clone(),
    ));

    let addr = format!("0.0.0.0:{}", config.port);
    let app = build_router(AppState { config, launcher });

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
