//! Response envelope shared by every API endpoint.
//!
//! Success is `{ "data": T, "meta": {...} }`, failure is
//! `{ "error": { "code", "message" }, "meta": {...} }`. Link refusals map
//! onto status codes here so every handler reports them the same way.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::link::LinkError;

pub const API_VERSION: &str = "1";

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self { timestamp: Utc::now(), version: API_VERSION }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        Json(Self { data, meta: ResponseMeta::now() }).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn reject(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail { code, message: msg.into() },
            meta: ResponseMeta::now(),
        };
        (status, Json(body)).into_response()
    }

    /// Malformed or out-of-range request input.
    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::reject(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    /// Request is valid but the link is not in a state to honour it.
    pub fn conflict(msg: impl Into<String>) -> Response {
        Self::reject(StatusCode::CONFLICT, "CONFLICT", msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Response {
        Self::reject(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        match self {
            Self::Unavailable => ApiErrorResponse::service_unavailable(self.to_string()),
            Self::NotConnected | Self::ProbeNotReady => ApiErrorResponse::conflict(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_shape() {
        let resp = ApiResponse::ok(serde_json::json!({"rms": 12.5}));
        assert_eq!(resp.status(), StatusCode::OK);

        let v = body(resp).await;
        assert_eq!(v["data"]["rms"], 12.5);
        assert_eq!(v["meta"]["version"], API_VERSION);
        assert!(v["meta"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_link_errors_map_to_status_codes() {
        let resp = LinkError::NotConnected.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let v = body(resp).await;
        assert_eq!(v["error"]["code"], "CONFLICT");
        assert_eq!(v["error"]["message"], "not connected to a peripheral");

        assert_eq!(LinkError::ProbeNotReady.into_response().status(), StatusCode::CONFLICT);
        assert_eq!(
            LinkError::Unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
