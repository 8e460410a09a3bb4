//! HTTP client for the relay endpoints.
//!
use common::{
    labels::{join_labels, split_labels},
    protocol::{DataResponse, ErrorResponse, PublishResponse},
};
use reqwest::{header, Client, Response, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("relay rejected request with {status}: {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Client for one relay server.
#[derive(Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
}

impl RelayClient {
    /// Create a client for `address`, either `host:port` or a full `http(s)://` URL.
    pub fn new(address: &str) -> Self {
        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };

        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post one prediction payload.
    pub async fn send_prediction(&self, payload: &str) -> Result<PublishResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/prediction", &self.base_url))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(payload.to_owned())
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// Latest command the relay received from the broker.
    pub async fn latest_command(&self) -> Result<Option<String>, ClientError> {
        let response = self
            .http
            .get(format!("{}/get-data", &self.base_url))
            .send()
            .await?;

        let body: DataResponse = check(response).await?.json().await?;
        Ok(body.data)
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Rejected { status, message })
}

/// Build the payload for one line of detections, `None` when nothing was detected.
///
/// Labels are separated by commas; surrounding whitespace is ignored.
pub fn payload_from_line(line: &str) -> Option<String> {
    let labels: Vec<&str> = split_labels(line).collect();
    (!labels.is_empty()).then(|| join_labels(&labels))
}
