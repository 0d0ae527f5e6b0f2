//! Canonical event shape and admission rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

/// Maximum length, in characters, allowed for `topic` and `event_id` after trimming.
const MAX_KEY_PART_LEN: usize = 255;
/// Maximum length allowed for `source` after trimming.
const MAX_SOURCE_LEN: usize = 255;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("failed to parse request body: {0}")]
    Malformed(String),
    #[error("topic must not be empty or whitespace-only")]
    EmptyTopic,
    #[error("topic must not exceed {MAX_KEY_PART_LEN} characters")]
    TopicTooLong,
    #[error("event_id must not be empty or whitespace-only")]
    EmptyEventId,
    #[error("event_id must not exceed {MAX_KEY_PART_LEN} characters")]
    EventIdTooLong,
    #[error("source must not be empty or whitespace-only")]
    EmptySource,
    #[error("source must not exceed {MAX_SOURCE_LEN} characters")]
    SourceTooLong,
}

/// A raw event as received over the wire, before trimming/validation.
///
/// Deserialized directly from the JSON body of a submission or pub/sub message.
/// `payload` keeps unknown fields verbatim since it is an arbitrary structured map.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEvent {
    pub topic: String,
    pub event_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

/// A `/publish` request body: either a bare single event, or a batch wrapped in an
/// `events` array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawPublishRequest {
    Batch { events: Vec<RawEvent> },
    Single(RawEvent),
}

/// A validated event, ready to be handed to the ingest coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub topic: String,
    pub event_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub payload: HashMap<String, Value>,
}

impl Event {
    /// Parse and validate a single event from its wire (JSON) representation.
    pub fn parse(bytes: &[u8]) -> Result<Event, ValidationError> {
        let raw: RawEvent = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        Event::try_from(raw)
    }

    /// Parse a submission body, accepting either a bare single event object or a batch
    /// wrapped as `{"events": [...]}`.
    pub fn parse_request(bytes: &[u8]) -> Result<Vec<Event>, ValidationError> {
        let request: RawPublishRequest = serde_json::from_slice(bytes)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let raw = match request {
            RawPublishRequest::Single(event) => vec![event],
            RawPublishRequest::Batch { events } => events,
        };
        raw.into_iter().map(Event::try_from).collect()
    }

    pub fn key(&self) -> (&str, &str) {
        (self.topic.as_str(), self.event_id.as_str())
    }
}

impl TryFrom<RawEvent> for Event {
    type Error = ValidationError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let topic = raw.topic.trim().to_owned();
        if topic.is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        if topic.chars().count() > MAX_KEY_PART_LEN {
            return Err(ValidationError::TopicTooLong);
        }

        let event_id = raw.event_id.trim().to_owned();
        if event_id.is_empty() {
            return Err(ValidationError::EmptyEventId);
        }
        if event_id.chars().count() > MAX_KEY_PART_LEN {
            return Err(ValidationError::EventIdTooLong);
        }

        let source = raw.source.trim().to_owned();
        if source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if source.chars().count() > MAX_SOURCE_LEN {
            return Err(ValidationError::SourceTooLong);
        }

        Ok(Event {
            topic,
            event_id,
            timestamp: raw.timestamp,
            source,
            payload: raw.payload,
        })
    }
}
