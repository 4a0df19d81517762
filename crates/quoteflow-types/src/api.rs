//! API types for the quoteflow HTTP API.
//!
//! This module defines the request and response payloads of the order
//! endpoints and the structured error type they return.

use crate::{Decision, DecisionRequest, OrderId};
use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request for placing a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
	pub name: String,
	pub email: String,
}

/// Response to a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
	pub order_id: OrderId,
	pub message: String,
}

/// User-facing state of one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
	Pending,
	Done,
	/// The order was rejected or never existed.
	Invalidated,
}

impl StageStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			StageStatus::Pending => "pending",
			StageStatus::Done => "done",
			StageStatus::Invalidated => "invalidated/order must be replaced",
		}
	}
}

impl fmt::Display for StageStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One-field status message returned by the checkpoint endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
	pub message: String,
}

impl From<StageStatus> for StatusResponse {
	fn from(status: StageStatus) -> Self {
		Self {
			message: status.as_str().to_string(),
		}
	}
}

/// Operator input for a parked decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDecisionRequest {
	/// Interpreted like console input: `ok`, `non`, anything else.
	pub input: String,
}

/// Acknowledgement of a submitted decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDecisionResponse {
	pub decision: Decision,
}

/// Decisions the oracle is currently waiting for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDecisionsResponse {
	pub pending: Vec<DecisionRequest>,
}

/// Quote artifact as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
	pub file_name: String,
	pub order_id: OrderId,
	pub name: String,
	pub email: String,
	pub cost: u32,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// Unknown or removed resource (404)
	NotFound { error_type: String, message: String },
	/// Request valid but cannot be served in the current state (409)
	Conflict { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			APIError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			APIError::NotFound { .. } => StatusCode::NOT_FOUND,
			APIError::Conflict { .. } => StatusCode::CONFLICT,
			APIError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}
