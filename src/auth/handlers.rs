use axum::{
    extract::State,
    routing::{delete, get, patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            ApiResponse, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest,
            LoginRequest, PublicUser, RefreshRequest, RegisterRequest, ResetPasswordRequest,
            SetRoleRequest, UpdateProfileRequest,
        },
        extractors::{AdminUser, AuthUser, JsonBody, PathParam},
    },
    error::AuthResult,
    state::AppState,
};

type ApiResult<T> = AuthResult<Json<ApiResponse<T>>>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/change-password", post(change_password))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me).patch(update_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users/:id/role", patch(set_role))
        .route("/admin/users/:id", delete(delete_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let res = state.sessions.register(payload).await?;
    Ok(Json(ApiResponse::success("Account created", res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let res = state.sessions.login(payload).await?;
    Ok(Json(ApiResponse::success("Logged in", res)))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshRequest>,
) -> ApiResult<AuthResponse> {
    let res = state.sessions.refresh(&payload.refresh_token).await?;
    Ok(Json(ApiResponse::success("Token refreshed", res)))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> ApiResult<()> {
    state.sessions.logout(user.id).await?;
    Ok(Json(ApiResponse::ok("Logged out")))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> ApiResult<AuthResponse> {
    let res = state.sessions.change_password(user.id, payload).await?;
    Ok(Json(ApiResponse::success("Password changed", res)))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<()> {
    state.sessions.forgot_password(&payload.email).await?;
    Ok(Json(ApiResponse::ok(
        "If the email is registered, a reset link has been sent",
    )))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> ApiResult<()> {
    state.sessions.reset_password(payload).await?;
    Ok(Json(ApiResponse::ok("Password reset")))
}

#[instrument(skip(state))]
pub async fn get_me(State(state): State<AppState>, user: AuthUser) -> ApiResult<PublicUser> {
    let me = state.sessions.me(user.id).await?;
    Ok(Json(ApiResponse::success("Profile", me)))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> ApiResult<PublicUser> {
    let me = state.sessions.update_profile(user.id, payload).await?;
    Ok(Json(ApiResponse::success("Profile updated", me)))
}

#[instrument(skip(state, payload))]
pub async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<SetRoleRequest>,
) -> ApiResult<PublicUser> {
    let user = state.sessions.set_role(admin_id, id, payload.role).await?;
    Ok(Json(ApiResponse::success("Role updated", user)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<()> {
    state.sessions.delete_user(admin_id, id).await?;
    Ok(Json(ApiResponse::ok("User deleted")))
}
