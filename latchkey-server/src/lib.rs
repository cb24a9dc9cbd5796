//! # Latchkey Server
//!
//! An axum host for Latchkey session scopes.
//!
//! Every configured scope gets three routes:
//!
//! - `POST /{scope}/session`: log in with a `login`/`password` form
//! - `GET /{scope}/session`: the session restored from the request
//! - `DELETE /{scope}/session`: log out
//!
//! Records live in a [`MemoryUserStore`](latchkey_core::MemoryUserStore)
//! seeded from the command line.

pub mod errors;
pub mod handlers;
pub mod host;
pub mod state;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub use errors::{AppError, AppResult};
pub use host::{HostMedia, SESSION_ID_COOKIE};
pub use state::{AppState, NativeSessionStore};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/{scope}/session",
            get(handlers::current_session)
                .post(handlers::create_session)
                .delete(handlers::destroy_session),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
