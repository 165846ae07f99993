use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

const AUTHENTICATE_CHALLENGE: &str = "Basic realm=\"Enter username and password.\"";

#[derive(Debug)]
pub struct GatewayAPIError {
    status_code: StatusCode,
    message: String,
}

impl GatewayAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_str())
    }

    pub fn internal_error_str(e: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    /// The single observable response for every authentication failure,
    /// format and mismatch alike.
    pub fn not_authenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Not Authenticated")
    }
}

impl IntoResponse for GatewayAPIError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        if self.status_code == StatusCode::UNAUTHORIZED {
            return (
                self.status_code,
                [(header::WWW_AUTHENTICATE, AUTHENTICATE_CHALLENGE)],
                self.message,
            )
                .into_response();
        }
        (self.status_code, self.message).into_response()
    }
}
