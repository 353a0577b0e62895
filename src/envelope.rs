//! Response envelope & wrapper middleware.
//!
//! Every public response conforms to either the success or error envelope
//! shape. Handlers build these through [`RequestContext`] rather than
//! constructing the envelope themselves, the same way request tracing and
//! CORS are applied once at the router layer instead of in every handler.

use crate::error::retry::{RetryContext, derive as derive_retry, suggested_actions};
use crate::error::{ApiError, ErrorCategory};
use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Instant;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: String,
    pub processing_time_ms: u128,
    pub api_version: &'static str,
    pub environment: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessEnvelope<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub meta: ResponseMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_actions: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub message: String,
    pub details: Value,
    pub suggested_actions: Value,
    pub retry: Value,
    pub documentation_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
    pub request_id: String,
    pub timestamp: String,
}

/// Carries per-request bookkeeping (start time, request id) through to
/// wherever the envelope is finally assembled.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub environment: String,
    started_at: Instant,
}

impl RequestContext {
    pub fn new(request_id: String, environment: String) -> Self {
        Self {
            request_id,
            environment,
            started_at: Instant::now(),
        }
    }

    fn meta(&self, partial: bool) -> ResponseMeta {
        ResponseMeta {
            request_id: self.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            processing_time_ms: self.started_at.elapsed().as_millis(),
            api_version: API_VERSION,
            environment: self.environment.clone(),
            partial,
        }
    }

    /// Wraps a successful payload in the success envelope.
    pub fn success<T: Serialize>(&self, data: T) -> Response {
        self.success_with(data, false, None, None)
    }

    pub fn success_partial<T: Serialize>(&self, data: T) -> Response {
        self.success_with(data, true, None, None)
    }

    pub fn success_with<T: Serialize>(
        &self,
        data: T,
        partial: bool,
        links: Option<Value>,
        next_actions: Option<Value>,
    ) -> Response {
        let envelope = SuccessEnvelope {
            success: true,
            data,
            meta: self.meta(partial),
            links,
            next_actions,
        };
        (StatusCode::OK, Json(envelope)).into_response()
    }

    pub fn success_with_status<T: Serialize>(&self, status: StatusCode, data: T) -> Response {
        let envelope = SuccessEnvelope {
            success: true,
            data,
            meta: self.meta(false),
            links: None,
            next_actions: None,
        };
        (status, Json(envelope)).into_response()
    }

    /// Wraps a typed error. Never called twice for the same
    /// response — handlers propagate a single `ApiError` via `?`.
    pub fn error(&self, err: ApiError) -> Response {
        let meta = err.kind.meta();
        let retry_ctx = RetryContext::default();
        let retry = derive_retry(err.kind, &retry_ctx);
        let actions = suggested_actions(err.kind, &err.details);
        let body = ErrorBody {
            code: err.kind.code(),
            category: meta.category,
            message: err.message,
            details: err.details,
            suggested_actions: json!(actions),
            retry: json!(retry),
            documentation_url: err.kind.documentation_url(),
        };
        let envelope = ErrorEnvelope {
            success: false,
            error: body,
            request_id: self.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        let status = StatusCode::from_u16(meta.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(envelope)).into_response();
        if matches!(err.kind, crate::error::ErrorKind::RateLimited) {
            if let Some(seconds) = retry.retry_after_seconds {
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    response.headers_mut().insert("Retry-After", value);
                }
            }
        }
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !matches!(self.kind.meta().http_status, 500..=599) {
            tracing::warn!(code = self.kind.code(), message = %self.message, "request failed");
        } else {
            tracing::error!(code = self.kind.code(), message = %self.message, "internal error");
        }
        RequestContext::new(crate::ids::request_id(), "unknown".to_string()).error(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn success_envelope_round_trips_through_json() {
        let ctx = RequestContext::new("req_1".into(), "mock".into());
        let response = ctx.success(json!({"hello": "world"}));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn error_envelope_uses_kind_http_status() {
        let ctx = RequestContext::new("req_2".into(), "mock".into());
        let err = ApiError::new(ErrorKind::AccountNotFound, "no such account");
        let response = ctx.error(err);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
