//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{Extension, Json};
use bytes::Bytes;
use common::{
    labels::split_labels,
    protocol::{DataResponse, PublishResponse, StatusResponse},
};

use crate::{
    cache::InboundCache,
    config::{LabelVocabulary, TopicConfig},
    connector::Publisher,
    error::{RelayError, PAYLOAD_REQUIRED},
    meter::METER,
};

/// State shared by all relay endpoints.
pub struct Relay {
    cache: Arc<InboundCache>,
    publisher: Arc<dyn Publisher>,
    topics: TopicConfig,
    vocabulary: Option<LabelVocabulary>,
    max_payload: usize,
}

impl Relay {
    pub fn new(
        cache: Arc<InboundCache>,
        publisher: Arc<dyn Publisher>,
        topics: TopicConfig,
        vocabulary: Option<LabelVocabulary>,
        max_payload: usize,
    ) -> Self {
        Self {
            cache,
            publisher,
            topics,
            vocabulary,
            max_payload,
        }
    }

    /// Largest accepted prediction body in bytes.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Latest message received on the subscribed topic.
pub async fn get_data(Extension(relay): Extension<Arc<Relay>>) -> Json<DataResponse> {
    let data = relay.cache.latest().map(|data| data.to_string());
    Json(DataResponse::new(data))
}

/// Publish a prediction to the outbound topic.
pub async fn prediction(
    Extension(relay): Extension<Arc<Relay>>,
    body: Bytes,
) -> Result<Json<PublishResponse>, RelayError> {
    let payload = match validate_payload(&body, relay.vocabulary.as_ref(), relay.max_payload) {
        Ok(payload) => payload,
        Err(e) => {
            METER.tick_rejected();
            log::debug!("Rejected prediction: {}", e);
            return Err(e);
        }
    };

    if let Err(e) = relay.publisher.publish(&relay.topics.publish, &payload).await {
        log::warn!("Failed to publish message to {}: {}", &relay.topics.publish, e);
        return Err(e);
    }

    log::info!("Message published successfully: {}", &payload);
    Ok(Json(PublishResponse::published(payload)))
}

/// Connection state and topics of the relay.
pub async fn status(Extension(relay): Extension<Arc<Relay>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connection: relay.publisher.connection_state().to_string(),
        subscribe_topic: relay.topics.subscribe.clone(),
        publish_topic: relay.topics.publish.clone(),
    })
}

/// Turn a request body into a publishable payload.
///
/// Bodies are opaque text unless a vocabulary is configured, in which case
/// every comma-separated label must belong to it.
pub fn validate_payload(
    body: &[u8],
    vocabulary: Option<&LabelVocabulary>,
    max_payload: usize,
) -> Result<String, RelayError> {
    if body.is_empty() {
        return Err(RelayError::Validation(PAYLOAD_REQUIRED.into()));
    }
    if body.len() > max_payload {
        return Err(RelayError::PayloadTooLarge { limit: max_payload });
    }

    let payload = std::str::from_utf8(body)
        .map_err(|_| RelayError::Validation("Payload must be UTF-8 text".into()))?;

    if let Some(vocabulary) = vocabulary {
        let mut labels = split_labels(payload).peekable();
        if labels.peek().is_none() {
            return Err(RelayError::Validation(PAYLOAD_REQUIRED.into()));
        }
        if let Some(unknown) = labels.find(|label| !vocabulary.contains(label)) {
            return Err(RelayError::Validation(format!("Unknown label '{unknown}'")));
        }
    }

    Ok(payload.to_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    const LIMIT: usize = 1024;

    #[test]
    fn test_empty_body_is_rejected() {
        let err = validate_payload(b"", None, LIMIT).unwrap_err();
        assert_eq!(err.to_string(), PAYLOAD_REQUIRED);
    }

    #[test]
    fn test_opaque_text_is_accepted() {
        assert_eq!(validate_payload(b" ", None, LIMIT).unwrap(), " ");
        assert_eq!(
            validate_payload(b"anything goes", None, LIMIT).unwrap(),
            "anything goes"
        );
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let payload = validate_payload(&[b'x'; LIMIT], None, LIMIT).unwrap();
        assert_eq!(payload.len(), LIMIT);

        assert!(matches!(
            validate_payload(&[b'x'; LIMIT + 1], None, LIMIT),
            Err(RelayError::PayloadTooLarge { limit: LIMIT })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(matches!(
            validate_payload(&[0xff, 0xfe], None, LIMIT),
            Err(RelayError::Validation(_))
        ));
    }

    #[test]
    fn test_vocabulary_is_enforced() {
        let vocabulary = LabelVocabulary::parse("mask,no-mask").unwrap();

        assert_eq!(
            validate_payload(b"mask,no-mask", Some(&vocabulary), LIMIT).unwrap(),
            "mask,no-mask"
        );

        let err = validate_payload(b"mask,hat", Some(&vocabulary), LIMIT).unwrap_err();
        assert_eq!(err.to_string(), "Unknown label 'hat'");

        assert!(validate_payload(b" , ", Some(&vocabulary), LIMIT).is_err());
    }
}
