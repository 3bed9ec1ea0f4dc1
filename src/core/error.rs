use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    PlaceholderUnresolved,
    ExtractMalformedDocument,

    GatewayNotFound,
    GatewayPermissionDenied,
    GatewayRateLimited,
    GatewayConflict,
    GatewayTimeout,
    GatewayUnknown,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PlaceholderUnresolved => "placeholder.unresolved",
            ErrorCode::ExtractMalformedDocument => "extract.malformed_document",

            ErrorCode::GatewayNotFound => "gateway.not_found",
            ErrorCode::GatewayPermissionDenied => "gateway.permission_denied",
            ErrorCode::GatewayRateLimited => "gateway.rate_limited",
            ErrorCode::GatewayConflict => "gateway.conflict",
            ErrorCode::GatewayTimeout => "gateway.timeout",
            ErrorCode::GatewayUnknown => "gateway.unknown",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderUnresolvedDetails {
    pub name: String,
    pub source_file_path: String,
    pub cause: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedDocumentDetails {
    pub path: String,
    pub format: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        let details = serde_json::to_value(MissingArgumentDetails { args })
            .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            details,
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = serde_json::to_value(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(ErrorCode::ConfigInvalidJson, "Invalid JSON", details)
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = serde_json::json!({
            "key": key.into(),
            "value": value,
            "problem": problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    /// Hard failure resolving one placeholder; fatal for that repository.
    pub fn placeholder_unresolved(
        name: impl Into<String>,
        source_file_path: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let details = serde_json::to_value(PlaceholderUnresolvedDetails {
            name: name.clone(),
            source_file_path: source_file_path.into(),
            cause: cause.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::PlaceholderUnresolved,
            format!("Could not resolve placeholder '{{{{{}}}}}'", name),
            details,
        )
    }

    pub fn malformed_document(
        path: impl Into<String>,
        format: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let details = serde_json::to_value(MalformedDocumentDetails {
            path: path.into(),
            format: format.into(),
            error: error.into(),
        })
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

        Self::new(
            ErrorCode::ExtractMalformedDocument,
            "Document could not be parsed",
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": error.into(),
            "context": context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        let (code, retryable) = match &err {
            GatewayError::NotFound(_) => (ErrorCode::GatewayNotFound, None),
            GatewayError::PermissionDenied(_) => (ErrorCode::GatewayPermissionDenied, None),
            GatewayError::RateLimited(_) => (ErrorCode::GatewayRateLimited, Some(true)),
            GatewayError::Conflict(_) => (ErrorCode::GatewayConflict, None),
            GatewayError::Timeout(_) => (ErrorCode::GatewayTimeout, Some(true)),
            GatewayError::Unknown(_) => (ErrorCode::GatewayUnknown, None),
        };

        let mut error = Self::new(
            code,
            err.to_string(),
            serde_json::json!({ "kind": err.kind() }),
        );
        error.retryable = retryable;
        error
    }
}
