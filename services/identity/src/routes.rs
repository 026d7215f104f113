//! Identity service routes

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    response::{IntoResponse, Redirect},
    routing::{delete, get, patch, post, put},
};
use axum_extra::extract::WithRejection;
use common::response::ApiResponse;
use reqwest::Url;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::{ClientIp, require_access_token, require_admin, require_verified},
    models::{
        AdminUpdateUserRequest, ChangePasswordRequest, EmailVerification, ForgotPasswordRequest,
        LoginRequest, LogoutOutcome, OAuthCallbackQuery, RefreshTokenRequest, RegisterRequest,
        ResendOutcome, ResetPasswordRequest, UpdateProfileRequest, VerifyEmailQuery,
        VerifyForgotPasswordQuery,
    },
    service::Principal,
    validation::FieldError,
};

type JsonBody<T> = WithRejection<Json<T>, AuthError>;
type QueryParams<T> = WithRejection<Query<T>, AuthError>;
type UserId = WithRejection<Path<Uuid>, AuthError>;

/// Create the router for the identity service
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/meAll", get(list_users))
        .route("/updateUserByID/:id", put(admin_update_user))
        .route("/deleteUser/:id", delete(delete_user))
        .route_layer(middleware::from_fn(require_admin));

    let authenticated = Router::new()
        .route("/logout", post(logout))
        .route("/resend-verify-email", post(resend_verify_email))
        .route(
            "/me",
            get(get_me).merge(patch(update_me).route_layer(middleware::from_fn(require_verified))),
        )
        .route(
            "/change-password",
            put(change_password).route_layer(middleware::from_fn(require_verified)),
        )
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_access_token,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google", get(google_callback))
        .route("/google/authorize", get(google_authorize))
        .route("/refresh-token", post(refresh_token))
        .route("/verify-email", get(verify_email))
        .route("/forgot-password", post(forgot_password))
        .route("/verify-forgot-password", get(verify_forgot_password))
        .route("/reset-password", post(reset_password))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Append query parameters to a configured redirect target
fn redirect_with(base: &str, params: &[(&str, String)]) -> AuthResult<Redirect> {
    let url = Url::parse_with_params(base, params)
        .map_err(|e| anyhow!("Invalid redirect URL {}: {}", base, e))?;
    Ok(Redirect::to(url.as_str()))
}

fn already_verified() -> ApiResponse<Value> {
    ApiResponse {
        status: false,
        message: "Email already verified".to_string(),
        result: Some(json!({ "alreadyVerified": true })),
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "identity"
    }))
}

pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    WithRejection(Json(payload), _): JsonBody<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate(&state.policy)?;
    info!("Registration attempt for {}", payload.email);

    let tokens = state.auth.register(payload, &ip).await?;
    Ok(ApiResponse::ok("Register success", tokens))
}

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    WithRejection(Json(payload), _): JsonBody<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate()?;
    info!("Login attempt for {}", payload.email);

    let tokens = state
        .auth
        .login(&payload.email, &payload.password, &ip)
        .await?;
    Ok(ApiResponse::ok("Login success", tokens))
}

/// Send the browser to the provider's consent screen
pub async fn google_authorize(State(state): State<AppState>) -> AuthResult<Redirect> {
    let url = state
        .auth
        .provider_authorize_url()
        .ok_or_else(|| AuthError::Upstream("Google login is not configured".to_string()))?;
    Ok(Redirect::to(&url))
}

/// Provider callback: log in and hand the tokens to the front end
pub async fn google_callback(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    WithRejection(Query(query), _): QueryParams<OAuthCallbackQuery>,
) -> AuthResult<Redirect> {
    let login = state.auth.login_with_provider(&query.code, &ip).await?;

    redirect_with(
        &state.settings.redirect_google_login,
        &[
            ("accessToken", login.tokens.access_token),
            ("refreshToken", login.tokens.refresh_token),
            ("newUser", u8::from(login.new_user).to_string()),
            ("verify", login.verify.code().to_string()),
        ],
    )
}

pub async fn logout(
    State(state): State<AppState>,
    principal: Principal,
    WithRejection(Json(payload), _): JsonBody<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate()?;

    let claims = state.auth.verify_refresh_token(&payload.refresh_token)?;
    if claims.sub != principal.user_id {
        return Err(AuthError::Unauthorized(
            "Refresh token belongs to another user".to_string(),
        ));
    }

    Ok(match state.auth.logout(&payload.refresh_token).await? {
        LogoutOutcome::LoggedOut => ApiResponse::message("Logout success"),
        LogoutOutcome::NotLoggedIn => {
            ApiResponse::soft_failure("Logout failed, refresh token is not active")
        }
    })
}

pub async fn refresh_token(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): JsonBody<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate()?;

    let claims = state.auth.verify_refresh_token(&payload.refresh_token)?;
    let tokens = state.auth.refresh(&claims, &payload.refresh_token).await?;
    Ok(ApiResponse::ok("Refresh token success", tokens))
}

pub async fn verify_email(
    State(state): State<AppState>,
    WithRejection(Query(query), _): QueryParams<VerifyEmailQuery>,
) -> AuthResult<axum::response::Response> {
    let claims = state
        .auth
        .check_email_verify_token(&query.email_verify_token)?;

    match state.auth.verify_email(claims.sub).await? {
        EmailVerification::Verified(tokens) => Ok(redirect_with(
            &state.settings.redirect_verify_email,
            &[
                ("accessToken", tokens.access_token),
                ("refreshToken", tokens.refresh_token),
            ],
        )?
        .into_response()),
        EmailVerification::AlreadyVerified => Ok(already_verified().into_response()),
    }
}

pub async fn resend_verify_email(
    State(state): State<AppState>,
    principal: Principal,
) -> AuthResult<impl IntoResponse> {
    Ok(match state.auth.resend_verify_email(principal.user_id).await? {
        ResendOutcome::Sent => ApiResponse::message("Verification email sent"),
        ResendOutcome::AlreadyVerified => already_verified(),
    })
}

pub async fn forgot_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): JsonBody<ForgotPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate()?;

    state.auth.forgot_password(&payload.email).await?;
    Ok(ApiResponse::message(
        "Check your email to reset your password",
    ))
}

/// Landing point of the reset link; forwards a still-valid token to the
/// front end's reset form
pub async fn verify_forgot_password(
    State(state): State<AppState>,
    WithRejection(Query(query), _): QueryParams<VerifyForgotPasswordQuery>,
) -> AuthResult<Redirect> {
    state.auth.check_forgot_password_token(&query.token).await?;

    redirect_with(
        &state.settings.redirect_reset_password,
        &[("forgot_password_token", query.token)],
    )
}

pub async fn reset_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    WithRejection(Json(payload), _): JsonBody<ResetPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate(&state.policy)?;

    let claims = state
        .auth
        .check_forgot_password_token(&payload.forgot_password_token)
        .await?;
    state
        .auth
        .reset_password(
            claims.sub,
            &payload.forgot_password_token,
            &payload.password,
            &ip,
        )
        .await?;
    Ok(ApiResponse::message("Reset password success"))
}

pub async fn get_me(
    State(state): State<AppState>,
    principal: Principal,
) -> AuthResult<impl IntoResponse> {
    let profile = state.auth.get_profile(principal.user_id).await?;
    Ok(ApiResponse::ok("Get my profile success", profile))
}

pub async fn list_users(State(state): State<AppState>) -> AuthResult<impl IntoResponse> {
    let profiles = state.auth.list_profiles().await?;
    Ok(ApiResponse::ok("Get all users success", profiles))
}

pub async fn update_me(
    State(state): State<AppState>,
    principal: Principal,
    WithRejection(Json(payload), _): JsonBody<UpdateProfileRequest>,
) -> AuthResult<impl IntoResponse> {
    if payload.is_empty() {
        return Err(AuthError::Validation(vec![FieldError {
            field: "body",
            message: "Nothing to update".to_string(),
        }]));
    }
    payload.validate()?;

    let profile = state
        .auth
        .update_profile(principal.user_id, payload)
        .await?;
    Ok(ApiResponse::ok("Update my profile success", profile))
}

pub async fn admin_update_user(
    State(state): State<AppState>,
    WithRejection(Path(id), _): UserId,
    WithRejection(Json(payload), _): JsonBody<AdminUpdateUserRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate()?;

    let updated = state.auth.admin_update_user(id, payload).await?;
    Ok(ApiResponse::ok("Update user success", updated))
}

pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    ClientIp(ip): ClientIp,
    WithRejection(Json(payload), _): JsonBody<ChangePasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    payload.validate(&state.policy)?;

    state
        .auth
        .change_password(
            principal.user_id,
            &payload.old_password,
            &payload.password,
            &ip,
        )
        .await?;
    Ok(ApiResponse::message("Change password success"))
}

pub async fn delete_user(
    State(state): State<AppState>,
    WithRejection(Path(id), _): UserId,
) -> AuthResult<impl IntoResponse> {
    state.auth.delete_user(id).await?;
    Ok(ApiResponse::message("Delete user success"))
}
