use std::sync::Arc;

mod app;
mod config;
mod db;
mod error;
mod extract;
mod mailer;
mod state;
mod users;

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accounts=debug,sqlx=warn,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Err(e) = dotenv {
        tracing::warn!(error = %e, ".env not loaded, using process environment");
    }

    let config = Arc::new(config::AppConfig::from_env()?);

    let pool = match db::connect(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect database");
            return Err(e.into());
        }
    };

    let state = state::AppState::new(pool.clone(), &config);
    let app = app::build_app(state);
    let served = app::serve(app, &config).await;

    pool.close().await;
    tracing::info!("database pool closed");
    served
}
