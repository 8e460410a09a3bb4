//! Errors surfaced by the relay.
//!
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;
use thiserror::Error;

/// Message returned when a prediction is posted without a body.
pub const PAYLOAD_REQUIRED: &str = "Payload is required";

#[derive(Debug, Error)]
pub enum RelayError {
    /// Publish body is empty, not UTF-8 or outside the label vocabulary.
    #[error("{0}")]
    Validation(String),

    /// Publish body is larger than the session allows.
    #[error("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Broker session is not in the `Connected` state.
    #[error("not connected to the MQTT broker")]
    NotConnected,

    /// Broker client failed to send the message.
    #[error("failed to publish message: {0}")]
    Publish(String),

    /// Broker refused or failed the subscription.
    #[error("failed to subscribe to topic {topic}: {reason}")]
    Subscription { topic: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Publish(_) | RelayError::Subscription { .. } | RelayError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RelayError::Validation(PAYLOAD_REQUIRED.into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::NotConnected.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RelayError::PayloadTooLarge { limit: 1024 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(RelayError::Publish("connection reset".into())
            .status_code()
            .is_server_error());
    }

    #[test]
    fn test_validation_message_is_passed_through() {
        assert_eq!(
            RelayError::Validation(PAYLOAD_REQUIRED.into()).to_string(),
            "Payload is required"
        );
    }
}
