use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name → list of messages, serialized as the 400 response body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Single-field validation error, the common case.
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        ApiError::Validation(errors)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::field(field, "This field is required.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(errors)).into_response()
            }
            ApiError::Unauthorized(detail) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
            }
            ApiError::Internal(err) => {
                tracing::error!("request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal server error." })),
                )
                    .into_response()
            }
        }
    }
}

/// Request-body extractor: like `axum::Json`, but deserialization
/// failures come back as a 400 field-error map instead of axum's
/// plain-text 422.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(field_error_from_rejection(rejection)),
        }
    }
}

/// axum prefixes data errors with the serde path of the failing field
/// ("...: price: Ensure that there are no more than 2 decimal places.
/// at line 1 column 44"), which maps straight onto the field-error body.
fn field_error_from_rejection(rejection: JsonRejection) -> ApiError {
    let detail = rejection.body_text();
    if matches!(rejection, JsonRejection::JsonDataError(_)) {
        if let Some(rest) =
            detail.strip_prefix("Failed to deserialize the JSON body into the target type: ")
        {
            if let Some((path, message)) = rest.split_once(": ") {
                let field = path.split(['.', '[']).next().unwrap_or(path);
                if !field.is_empty() && !field.contains(' ') {
                    let message =
                        message.rsplit_once(" at line ").map(|(m, _)| m).unwrap_or(message);
                    return ApiError::field(field, message);
                }
            }
        }
    }
    ApiError::field("non_field_errors", &detail)
}
