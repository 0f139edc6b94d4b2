use std::sync::Arc;

use tracing::{info, warn};

use lobby_api::auth::{AppState, AppStateInner};
use lobby_db::Database;
use lobby_gateway::Hub;
use lobby_gateway::identity::TokenKeys;
use lobby_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lobby_server=debug,lobby_gateway=debug,lobby_api=debug,lobby_db=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        warn!("LOBBY_JWT_SECRET is not set; using the development secret");
    }

    // Init database
    let db = Database::open(&config.db_path)?;
    let promoted = db.promote_admins(&config.admins)?;
    if promoted > 0 {
        info!("Promoted {} existing user(s) to admin", promoted);
    }

    let hub = Hub::new(
        Arc::new(db),
        TokenKeys::new(&config.jwt_secret, config.token_ttl_days),
        config.gateway.clone(),
    );
    let state: AppState = Arc::new(AppStateInner {
        hub,
        admins: config.admins.clone(),
    });

    let app = lobby_server::app(state);

    let addr = config.addr()?;
    info!("Lobby server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
