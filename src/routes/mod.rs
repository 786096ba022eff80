pub mod auth;
pub mod categories;
pub mod connect;
pub mod dispatch;
pub mod drafts;
pub mod error;
pub mod plugs;
pub mod posts;
pub mod profile;
pub mod users;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(users::routes())
        .merge(profile::routes())
        .merge(connect::routes())
        .merge(posts::routes())
        .merge(drafts::routes())
        .merge(plugs::routes())
        .merge(categories::routes())
        .merge(dispatch::routes())
}
