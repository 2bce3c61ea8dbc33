use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{CreateUserRequest, DataResponse, ErrorBody, PublicUser, SignInRequest},
        errors::ServiceError,
    },
    error::ErrorKind,
    state::AppState,
};

const ERR_BAD_REQUEST: &str = "errors/bad-request";
const ERR_UNAUTHORIZED: &str = "errors/unauthorized";
const ERR_UNAVAILABLE: &str = "errors/unavailable";
const ERR_INTERNAL: &str = "errors/internal";
const ERR_USER_ID_INVALID: &str = "users/user-id-invalid";
const ERR_USER_NOT_FOUND: &str = "users/not-found";
const ERR_EMAIL_EXISTS: &str = "users/email-exists";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_user_id(user_id: &str) -> bool {
    lazy_static! {
        static ref USER_ID_RE: Regex = Regex::new(r"^[A-HJ-NP-Za-km-z1-9]{22}$").unwrap();
    }
    USER_ID_RE.is_match(user_id)
}

pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ERR_BAD_REQUEST, message)
    }

    // Same body for unknown email and wrong password.
    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED, "invalid credentials")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status.as_u16(),
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Status for failures a handler has no special meaning for.
impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err.kind() {
            ErrorKind::Validation => ApiError::bad_request(err.to_string()),
            ErrorKind::NotFound | ErrorKind::WrongPassword => ApiError::unauthorized(),
            ErrorKind::Conflict => ApiError::new(
                StatusCode::CONFLICT,
                ERR_EMAIL_EXISTS,
                "email already registered",
            ),
            ErrorKind::Transient | ErrorKind::Cancelled => {
                warn!(error = %err, "request not completed");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    ERR_UNAVAILABLE,
                    "service unavailable, try again",
                )
            }
            ErrorKind::CorruptData | ErrorKind::Internal => {
                error!(error = %err, "unexpected service error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ERR_INTERNAL,
                    "internal server error",
                )
            }
        }
    }
}

type Created = (StatusCode, Json<DataResponse<PublicUser>>);

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:user_id", get(get_user))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/signin", post(sign_in))
}

// Trims and lowercases the email, then checks both fields are usable.
fn credentials(email: Option<String>, password: Option<String>) -> Result<(String, String), ApiError> {
    let email = email
        .ok_or_else(|| ApiError::bad_request("email attribute not set"))?
        .trim()
        .to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request(
            "email attribute must be a valid email address",
        ));
    }
    let password = password.ok_or_else(|| ApiError::bad_request("password attribute not set"))?;
    Ok((email, password))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<Created, ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "create user body decode failed");
        ApiError::bad_request(e.body_text())
    })?;
    let (email, password) = credentials(req.email, req.password).map_err(|e| {
        warn!(reason = %e.message, "create user validation failed");
        e
    })?;

    let ctx = state.request_ctx();
    match state.service.create_user(&ctx, &email, &password).await {
        Ok(user) => {
            info!(user_id = %user.user_id, email = %user.email, "created new user");
            Ok((StatusCode::CREATED, Json(DataResponse { data: user })))
        }
        Err(ServiceError::PasswordTooShort) => {
            warn!(%email, "password too short");
            Err(ApiError::bad_request("password must be at least 8 characters"))
        }
        Err(e) => {
            if e.kind() == ErrorKind::Conflict {
                warn!(%email, "email already registered");
            }
            Err(e.into())
        }
    }
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<DataResponse<PublicUser>>, ApiError> {
    if !is_valid_user_id(&user_id) {
        warn!(%user_id, "path parameter is not a valid user id");
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ERR_USER_ID_INVALID,
            "user_id url path parameter is not a valid user id",
        ));
    }

    let ctx = state.request_ctx();
    match state.service.get_user(&ctx, &user_id).await {
        Ok(user) => Ok(Json(DataResponse { data: user })),
        Err(ServiceError::UserNotFound) => {
            info!(%user_id, "user not found");
            Err(ApiError::new(
                StatusCode::NOT_FOUND,
                ERR_USER_NOT_FOUND,
                "user not found",
            ))
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<DataResponse<PublicUser>>, ApiError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "sign-in body decode failed");
        ApiError::bad_request(e.body_text())
    })?;
    let (email, password) = credentials(req.email, req.password)?;

    let ctx = state.request_ctx();
    match state
        .service
        .verify_user_password(&ctx, &email, &password)
        .await
    {
        Ok(user) => {
            info!(user_id = %user.user_id, email = %user.email, "successful sign-in");
            Ok(Json(DataResponse { data: user }))
        }
        Err(e @ (ServiceError::UserNotFound | ServiceError::WrongPassword)) => {
            info!(%email, reason = %e, "sign-in rejected");
            Err(ApiError::unauthorized())
        }
        Err(e) => Err(e.into()),
    }
}
