use std::fmt::Display;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use serde_repr::*;
use tracing::{error, warn};

use super::network::FetchError;

#[derive(thiserror::Error, Debug)]
pub enum RouteError {
    #[error("{0}")]
    Any(#[from] anyhow::Error),
    #[error("bad request")]
    BadRequest(),
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] FetchError),
    #[error("offline and nothing cached")]
    Offline(),
}

#[derive(Serialize_repr, Deserialize_repr, PartialEq, Debug)]
#[repr(u16)]
pub enum ErrorCode {
    InternalError = 1000,
    BadRequest = 1001,
    Upstream = 1002,
    Offline = 1003,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ErrorCode::*;

        let res = match self {
            InternalError => "服务器内部错误",
            BadRequest => "请求错误",
            Upstream => "上游服务器不可用",
            Offline => "网络不可用且没有缓存",
        };
        f.write_str(res)?;
        Ok(())
    }
}

/// Log and return INTERNAL_SERVER_ERROR
fn log_internal_error<T: Display>(err: T) -> (StatusCode, ErrorCode, String) {
    use ErrorCode::*;

    error!("{err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        InternalError,
        "internal server error".to_string(),
    )
}

// Tell axum how to convert `RouteError` into a response.
impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        use RouteError::*;

        let (status_code, code, err_message) = match self {
            Any(err) => log_internal_error(err),
            BadRequest() => (
                StatusCode::BAD_REQUEST,
                ErrorCode::BadRequest,
                "bad request".to_string(),
            ),
            Upstream(err) => {
                warn!("Upstream fetch failed: {err}");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::Upstream,
                    err.to_string(),
                )
            }
            Offline() => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::Offline,
                "offline".to_string(),
            ),
        };
        let body = Json(json!({
            "code": code,
            "message": code.to_string(),
            "error": err_message
        }));
        (status_code, body).into_response()
    }
}

pub type RouteResult<T, E = RouteError> = Result<T, E>;
