//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ratechart_core::ratechart::{ParseError, RateChartError};
use ratechart_shared::AppError;
use serde_json::{Value, json};
use tracing::error;

/// Builds the `{"error", "message"}` body for an application error.
pub fn app_error_response(err: &AppError, details: Option<Value>) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut body = json!({
        "error": err.error_code(),
        "message": err.to_string(),
    });
    if let (Some(details), Some(object)) = (details, body.as_object_mut()) {
        object.insert("details".to_string(), details);
    }

    (status, Json(body)).into_response()
}

/// Maps a rate chart error onto an HTTP response.
///
/// Validation failures list the offending lines or columns and conflicts list
/// the society ids, so the caller can act on them. Storage failures are
/// logged and returned without internal detail.
pub fn rate_chart_error_response(err: RateChartError) -> Response {
    let details = match &err {
        RateChartError::Validation(ParseError::InvalidRows(rows)) => {
            Some(json!({ "row_errors": rows }))
        }
        RateChartError::Validation(ParseError::MissingHeaders(headers)) => {
            Some(json!({ "missing_headers": headers }))
        }
        RateChartError::Conflict { society_ids } => Some(json!({ "society_ids": society_ids })),
        _ => None,
    };

    if let RateChartError::Storage(msg) = &err {
        error!(error = %msg, "Rate chart storage failure");
        return app_error_response(
            &AppError::Database("A storage error occurred".to_string()),
            None,
        );
    }

    app_error_response(&AppError::from(err), details)
}

/// 400 response for a malformed request.
pub fn bad_request(message: impl Into<String>) -> Response {
    app_error_response(&AppError::Validation(message.into()), None)
}
