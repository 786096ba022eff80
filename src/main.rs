mod config;
mod constants;
mod dispatcher;
mod domain;
mod routes;
mod services;
mod storage;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::constants::{MAX_UPLOAD_SIZE, MEDIA_KEY_PREFIX};
use crate::dispatcher::DispatchContext;
use crate::domain::accounts::CredentialCipher;
use crate::domain::posts::store::PgPostStore;
use crate::services::PostContext;
use crate::services::clock::SystemClock;
use crate::services::cookies::CookiePolicy;
use crate::services::db;
use crate::services::twitter::TwitterClient;

pub struct AppState {
    pub db: PgPool,
    pub core: PostContext,
    pub jwt_secret: Vec<u8>,
    pub jwt_cron_secret: Vec<u8>,
    pub cipher: CredentialCipher,
    pub cookies: CookiePolicy,
}

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;

    let cipher = CredentialCipher {
        key: config.credentials_key.clone(),
        options: config.credentials_cipher.clone(),
    };

    let core = PostContext {
        store: Arc::new(PgPostStore::new(pool.clone(), cipher.clone())),
        objects: storage::from_config(&config.object_store).await,
        publisher: Arc::new(TwitterClient::new(&config.twitter_api_key, &config.twitter_api_secret)),
        clock: Arc::new(SystemClock),
        media_prefix: MEDIA_KEY_PREFIX.to_string(),
    };

    let dispatch_ctx = DispatchContext {
        core: core.clone(),
        batch_size: config.dispatch_batch_size,
    };
    let worker_pool = pool.clone();
    let cron = config.dispatch_cron.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatcher::run_dispatch_worker(worker_pool, dispatch_ctx, &cron).await {
            tracing::error!(error = %e, "Dispatch worker stopped");
        }
    });

    let state = Arc::new(AppState {
        db: pool,
        core,
        jwt_secret: config.jwt_secret.clone(),
        jwt_cron_secret: config.jwt_cron_secret.clone(),
        cipher,
        cookies: CookiePolicy {
            secure: config.secure_cookies,
            same_site: config.cookie_same_site,
        },
    });

    let app = Router::new()
        .route("/health", get(health))
        .merge(routes::build_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);
    // the login rate limiter keys on the peer address
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
