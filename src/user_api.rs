use crate::auth::CurrentUser;
use crate::error::{ApiError, FieldErrors, JsonBody};
use crate::user_models::{
    is_valid_email, ProfileResponse, ProfileUpdateRequest, RegisterRequest, RegisterResponse,
    TokenRequest, TokenResponse,
};
use crate::user_storage::{UserChanges, UserStoreError};
use crate::AppState;
use anyhow::Context;
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 5;

fn check_email(errors: &mut FieldErrors, email: &str) {
    if !is_valid_email(email) {
        errors
            .entry("email".to_string())
            .or_default()
            .push("Enter a valid email address.".to_string());
    }
}

fn check_password(errors: &mut FieldErrors, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.entry("password".to_string()).or_default().push(format!(
            "Ensure this field has at least {} characters.",
            MIN_PASSWORD_LEN
        ));
    }
}

fn require<'a>(errors: &mut FieldErrors, field: &str, value: &'a Option<String>) -> Option<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Some(v),
        Some(_) => {
            errors
                .entry(field.to_string())
                .or_default()
                .push("This field may not be blank.".to_string());
            None
        }
        None => {
            errors
                .entry(field.to_string())
                .or_default()
                .push("This field is required.".to_string());
            None
        }
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST).context("Failed to hash password")?;
    Ok(hash)
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let mut errors = FieldErrors::new();
    let email = require(&mut errors, "email", &payload.email);
    let password = require(&mut errors, "password", &payload.password);
    let name = require(&mut errors, "name", &payload.name);

    if let Some(email) = email {
        check_email(&mut errors, email);
    }
    if let Some(password) = password {
        check_password(&mut errors, password);
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let (email, password, name) = (email.unwrap(), password.unwrap(), name.unwrap());

    let user = state
        .users
        .create_user(email, name, hash_password(password)?)
        .await
        .map_err(|e| match e {
            UserStoreError::DuplicateEmail => {
                ApiError::field("email", "user with this email already exists.")
            }
            UserStoreError::Other(err) => ApiError::Internal(err),
        })?;

    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { id: user.id, email: user.email, name: user.name }),
    ))
}

pub async fn create_token(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let mut errors = FieldErrors::new();
    let email = require(&mut errors, "email", &payload.email);
    let password = require(&mut errors, "password", &payload.password);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    let (email, password) = (email.unwrap(), password.unwrap());

    let bad_credentials =
        || ApiError::field("non_field_errors", "Unable to authenticate with provided credentials.");

    let user = state.users.get_user_by_email(email).await.ok_or_else(bad_credentials)?;

    let valid = bcrypt::verify(password, &user.password_hash)
        .context("Failed to verify password")?;
    if !valid {
        return Err(bad_credentials());
    }

    let token = state.users.issue_token(user.id).await?;
    Ok(Json(TokenResponse { token: token.token }))
}

pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse { email: user.email, name: user.name })
}

pub async fn update_profile(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    apply_profile_update(user.id, state, payload, true).await
}

pub async fn patch_profile(
    CurrentUser(user): CurrentUser,
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    apply_profile_update(user.id, state, payload, false).await
}

async fn apply_profile_update(
    user_id: u64,
    state: Arc<AppState>,
    payload: ProfileUpdateRequest,
    full: bool,
) -> Result<Json<ProfileResponse>, ApiError> {
    let mut errors = FieldErrors::new();

    if full {
        require(&mut errors, "email", &payload.email);
        require(&mut errors, "name", &payload.name);
    }
    if let Some(email) = payload.email.as_deref() {
        check_email(&mut errors, email);
    }
    if let Some(password) = payload.password.as_deref() {
        check_password(&mut errors, password);
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let password_hash = match payload.password.as_deref() {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let updated = state
        .users
        .update_user(
            user_id,
            UserChanges { email: payload.email, name: payload.name, password_hash },
        )
        .await
        .map_err(|e| match e {
            UserStoreError::DuplicateEmail => {
                ApiError::field("email", "user with this email already exists.")
            }
            UserStoreError::Other(err) => ApiError::Internal(err),
        })?;

    Ok(Json(ProfileResponse { email: updated.email, name: updated.name }))
}
