//! Sign-in, sign-out and the bearer-token gate in front of `/admin`.

use crate::{
    errors::AppError,
    services::session::{Session, User},
    state::AppState,
};
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim().to_string())
    } else {
        None
    }
}

/// `POST /auth/sign-in`
pub async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<SignInRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.sessions.sign_in(&body.email, &body.password).await?;
    Ok(Json(session))
}

/// `POST /auth/sign-out`
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token =
        bearer_token(&headers).ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
    state.sessions.sign_out(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rejects requests without a live session and attaches the [`User`] to the
/// request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::unauthorized("sign in required"))?;
    let user: User = state.sessions.authenticate(&token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
