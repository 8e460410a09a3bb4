//! JSON bodies exchanged over the relay's HTTP endpoints.
//!
use serde::{Deserialize, Serialize};

/// Message returned to the caller after a successful publish.
pub const PUBLISHED_MESSAGE: &str = "Message published successfully";

/// Body of `GET /get-data`.
#[derive(Debug, Clone, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataResponse {
    pub data: Option<String>,
}

impl DataResponse {
    pub fn new(data: Option<String>) -> Self {
        Self { data }
    }
}

/// Body of a successful `POST /prediction`.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublishResponse {
    pub message: String,
    pub payload: String,
}

impl PublishResponse {
    pub fn published(payload: String) -> Self {
        Self {
            message: PUBLISHED_MESSAGE.to_owned(),
            payload,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct StatusResponse {
    pub connection: String,
    pub subscribe_topic: String,
    pub publish_topic: String,
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::Error;

    #[test]
    fn test_empty_data_serializes_as_null() -> Result<(), Error> {
        let body = serde_json::to_string(&DataResponse::default())?;
        assert_eq!(body, r#"{"data":null}"#);

        Ok(())
    }

    #[test]
    fn test_published_body_matches_wire_format() -> Result<(), Error> {
        let body = serde_json::to_string(&PublishResponse::published("mask,no-mask".into()))?;
        assert_eq!(
            body,
            r#"{"message":"Message published successfully","payload":"mask,no-mask"}"#
        );

        Ok(())
    }

    #[test]
    fn test_error_body_from_json() -> Result<(), Error> {
        let parsed: ErrorResponse = serde_json::from_str(r#"{"error":"Payload is required"}"#)?;
        assert_eq!(parsed, ErrorResponse::new("Payload is required"));

        Ok(())
    }
}
