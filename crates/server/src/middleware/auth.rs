use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use db::models::user::User;
use tracing::warn;

use crate::{AppState, error::ApiError};

/// The authenticated caller, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = match req.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(token)) => token.token().to_owned(),
        None => return ApiError::Unauthorized.into_response(),
    };

    let user = match User::find_by_token(state.pool(), &bearer).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("rejected unknown api token");
            return ApiError::Unauthorized.into_response();
        }
        Err(error) => {
            warn!(?error, "failed to resolve api token");
            return ApiError::Database(error).into_response();
        }
    };

    req.extensions_mut().insert(RequestContext { user });
    next.run(req).await
}
