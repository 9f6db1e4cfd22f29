//! # an-api
//!
//! HTTP surface of the annotation engine. Every endpoint lives under
//! [`API_PREFIX`]; the invite layer wraps the whole router so that an invite
//! link to any page establishes a collaborator session.

pub mod error;
pub mod handlers;
pub mod middleware;

use an_core::{AnnotationService, PrimaryAuth};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

pub const API_PREFIX: &str = "/annotate/v1";
pub const NONCE_HEADER: &str = "x-annotate-nonce";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnnotationService>,
    pub auth: Arc<dyn PrimaryAuth>,
    /// Sets `Secure` on the collaborator cookie.
    pub cookie_secure: bool,
}

/// Mounts the endpoints under [`API_PREFIX`].
///
/// Hosts that serve their own pages can `merge` more routes into the result;
/// the invite layer applies to those as well.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/threads/query", post(handlers::list_threads))
        .route("/threads", post(handlers::create_thread))
        .route("/threads/{id}", axum::routing::delete(handlers::delete_thread))
        .route("/threads/{id}/close", post(handlers::close_thread))
        .route("/comments/query", post(handlers::list_comments))
        .route("/comments", post(handlers::post_comment))
        .route("/users/search", post(handlers::search_people))
        .route("/session/nonce", get(handlers::nonce))
        .route("/session/disconnect", post(handlers::disconnect))
        .route("/notifications", get(handlers::notifications))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_nonce,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_actor,
        ));

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::accept_invite,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
