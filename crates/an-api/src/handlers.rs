//! # an-api Handlers
//!
//! Decode the body, hand the request context to the service, encode the
//! result. No handler makes an access decision of its own.

use crate::middleware::{expired_session_cookie, nonce_subject};
use crate::{ApiError, AppState};
use an_core::{
    AppError, CommentQuery, CommentView, CreateThreadRequest, Created, PersonMatch, PostCommentRequest,
    RequestContext, SearchRequest, ThreadQuery, ThreadSummary,
};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};

type ApiResult<T> = Result<T, ApiError>;

pub async fn list_threads(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(query): Json<ThreadQuery>,
) -> ApiResult<Json<Vec<ThreadSummary>>> {
    Ok(Json(state.service.list_threads(&ctx, &query.url).await?))
}

pub async fn create_thread(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateThreadRequest>,
) -> ApiResult<Json<Created>> {
    Ok(Json(state.service.create_thread(&ctx, request).await?))
}

pub async fn close_thread(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.service.close_thread(&ctx, id).await?;
    Ok(Json(json!({ "closed": true })))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.service.delete_thread(&ctx, id).await?;
    Ok(Json(json!({ "deleted": true })))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(query): Json<CommentQuery>,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.service.list_comments(&ctx, query.thread_id).await?))
}

pub async fn post_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<PostCommentRequest>,
) -> ApiResult<Json<Created>> {
    Ok(Json(state.service.post_comment(&ctx, request).await?))
}

pub async fn search_people(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Vec<PersonMatch>>> {
    Ok(Json(state.service.search_people(&ctx, &request.term).await?))
}

/// Nonce the client attaches to its mutating calls.
pub async fn nonce(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Value>> {
    let actor = ctx
        .actor()
        .ok_or_else(|| AppError::Forbidden("no active actor".into()))?;
    let nonce = state.auth.issue_nonce(nonce_subject(actor));
    Ok(Json(json!({ "nonce": nonce, "is_collaborator": actor.is_collaborator() })))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<Value>)> {
    if !ctx.is_collaborator() {
        return Err(AppError::Forbidden("not a collaborator session".into()).into());
    }
    let jar = jar.remove(expired_session_cookie(state.cookie_secure));
    Ok((jar, Json(json!({ "disconnected": true }))))
}

pub async fn notifications(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.service.drain_notifications(&ctx).await?))
}

/// Anything outside the API, including pages that only carried an invite.
pub async fn not_found() -> ApiError {
    ApiError(AppError::not_found("route", "unknown"))
}
