use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use super::repo_types::Role;
use crate::error::AuthError;
use crate::state::AppState;

/// Caller identified by a valid access token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub token_version: i32,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::InvalidToken)?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AuthError::InvalidToken)?;

        let claims = state.sessions.keys().verify_access(token.trim()).map_err(|e| {
            warn!(error = %e, "access token rejected");
            e
        })?;

        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
            token_version: claims.ver,
        })
    }
}

/// Caller whose access token carries the ADMIN role and whose stored account
/// is still an admin on the same token version.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            warn!(user_id = %user.id, "admin route denied");
            return Err(AuthError::Forbidden);
        }
        let id = state
            .sessions
            .authorize_admin(user.id, user.token_version)
            .await?;
        Ok(AdminUser(id))
    }
}

/// `Json<T>` whose rejections use the error envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                let rejection: JsonRejection = rejection;
                warn!(error = %rejection.body_text(), "malformed request body");
                Err(AuthError::validation(rejection.body_text()))
            }
        }
    }
}

/// `Path<T>` whose rejections use the error envelope.
pub struct PathParam<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParam<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParam(value)),
            Err(rejection) => {
                let rejection: PathRejection = rejection;
                warn!(error = %rejection.body_text(), "malformed path parameter");
                Err(AuthError::validation(rejection.body_text()))
            }
        }
    }
}
