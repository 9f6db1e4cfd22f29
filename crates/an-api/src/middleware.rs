//! # Request middleware
//!
//! Actor resolution, the anti-forgery nonce check and invite-link handling.

use crate::{ApiError, AppState, NONCE_HEADER};
use an_core::invite::{query_param, strip_query_param_from_path, INVITE_PARAM};
use an_core::session::COOKIE_NAME;
use an_core::{ActorRef, AppError, Identity, RequestContext};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use tracing::{debug, warn};

/// Subject a nonce is bound to: the user id, or the negated collaborator id.
pub fn nonce_subject(actor: &ActorRef) -> i64 {
    match actor {
        ActorRef::User(user) => user.id,
        ActorRef::Collaborator(c) => -c.id,
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// A bearer credential wins over a collaborator cookie. Neither is an error:
/// the request simply has no actor.
async fn actor_for(state: &AppState, headers: &HeaderMap) -> Result<Option<ActorRef>, AppError> {
    if let Some(token) = bearer(headers) {
        if let Some(user_id) = state.auth.authenticate(token).await? {
            if let Some(actor) = state.service.user_actor(user_id).await? {
                return Ok(Some(actor));
            }
        }
        debug!("bearer credential did not resolve to a user");
    }
    let jar = CookieJar::from_headers(headers);
    match jar.get(COOKIE_NAME) {
        Some(cookie) => state.service.session_actor(cookie.value(), Utc::now()).await,
        None => Ok(None),
    }
}

pub async fn resolve_actor(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let ctx = match actor_for(&state, request.headers()).await {
        Ok(Some(actor)) => RequestContext::for_actor(actor),
        Ok(None) => RequestContext::anonymous(),
        Err(err) => return ApiError(err).into_response(),
    };
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

/// Rejects state-changing requests from an actor without a valid nonce.
/// Anonymous requests pass through and fail on the actor requirement instead.
pub async fn require_nonce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(request).await;
    }
    let actor = request
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.actor().cloned());
    if let Some(actor) = actor {
        let nonce = request
            .headers()
            .get(NONCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !state.auth.verify_nonce(nonce_subject(&actor), nonce) {
            warn!(actor = %actor.key(), path = %request.uri().path(), "rejected request with a bad nonce");
            return ApiError(AppError::Forbidden("invalid nonce".into())).into_response();
        }
    }
    next.run(request).await
}

pub(crate) fn session_cookie(value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub(crate) fn expired_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// `GET` of any page carrying an invite token: exchange the token for a
/// session cookie and redirect to the same URL without the token. Invalid
/// tokens still redirect, without a cookie.
pub async fn accept_invite(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }
    let Some(path_and_query) = request.uri().path_and_query().map(|pq| pq.as_str().to_string()) else {
        return next.run(request).await;
    };
    let Some(token) = query_param(&format!("http://localhost{path_and_query}"), INVITE_PARAM) else {
        return next.run(request).await;
    };

    let target = strip_query_param_from_path(&path_and_query, INVITE_PARAM);
    let jar = CookieJar::from_headers(request.headers());
    let now = Utc::now();
    match state.service.establish_session(&token, now).await {
        Ok(Some((value, session))) => {
            let max_age = (session.expires - now).num_seconds().max(0);
            let jar = jar.add(session_cookie(value, max_age, state.cookie_secure));
            (jar, Redirect::to(&target)).into_response()
        }
        Ok(None) => {
            debug!("invite token rejected");
            Redirect::to(&target).into_response()
        }
        Err(err) => {
            warn!(error = %err, "could not establish collaborator session");
            Redirect::to(&target).into_response()
        }
    }
}
