// SPDX-License-Identifier: Apache-2.0

use caseline_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Closed set of error codes the API can return. Clients branch on the code;
/// the message is for humans and carries no stable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    ValidationFailed,
    InvalidQueryParameter,
    InvalidCursor,
    NotFound,
    Conflict,
    PayloadTooLarge,
    RateLimited,
    ServiceUnavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
    pub request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(
        code: ApiErrorCode,
        message: impl Into<String>,
        details: Value,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            request_id: request_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidQueryParameter,
            format!("invalid query parameter: {name}"),
            json!({"field_errors":[{"parameter": name, "reason": "invalid", "value": value}]}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn validation_failed(field_errors: Value) -> Self {
        Self::new(
            ApiErrorCode::ValidationFailed,
            "validation failed",
            json!({"field_errors": field_errors}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn invalid_cursor() -> Self {
        Self::new(
            ApiErrorCode::InvalidCursor,
            "invalid cursor",
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn not_found(entity: &str, id: i64) -> Self {
        Self::new(
            ApiErrorCode::NotFound,
            format!("{entity} not found"),
            json!({"entity": entity, "id": id}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            ApiErrorCode::Internal,
            "internal error",
            json!({}),
            "req-unknown",
        )
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Translate a storage failure into the wire taxonomy. The legacy service
    /// echoed backend error strings in 400 responses; here only `NotFound`,
    /// transition and conflict errors surface structured detail, and anything
    /// unexpected collapses to an opaque `Internal` for the operator to read
    /// from logs, not the client from the body.
    #[must_use]
    pub fn from_store(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::not_found(entity, *id),
            StoreError::IllegalTransition { entity, from, to } => Self::new(
                ApiErrorCode::Conflict,
                format!("illegal {entity} status transition"),
                json!({"entity": entity, "from": from, "to": to}),
                "req-unknown",
            ),
            StoreError::Conflict(reason) => Self::new(
                ApiErrorCode::Conflict,
                reason.clone(),
                json!({}),
                "req-unknown",
            ),
            StoreError::InvalidCursor => Self::invalid_cursor(),
            StoreError::Invalid(validation) => {
                Self::validation_failed(json!([{"reason": validation.to_string()}]))
            }
            StoreError::Corrupt(_) | StoreError::Sqlite(_) => Self::internal(),
            _ => Self::internal(),
        }
    }

    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self.code {
            ApiErrorCode::ValidationFailed
            | ApiErrorCode::InvalidQueryParameter
            | ApiErrorCode::InvalidCursor => 400,
            ApiErrorCode::NotFound => 404,
            ApiErrorCode::Conflict => 409,
            ApiErrorCode::PayloadTooLarge => 413,
            ApiErrorCode::RateLimited => 429,
            ApiErrorCode::ServiceUnavailable => 503,
            ApiErrorCode::Internal => 500,
        }
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
};
