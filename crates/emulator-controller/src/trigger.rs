//! Trigger model.
//!
//! A [`TriggerSpec`] is what callers hand to `deploy`: loosely typed, with
//! string tags as they appear in config files and admin requests. Resolving
//! it yields a [`Trigger`], which is what the registry stores and what drives
//! call-time payload shaping.

use std::fmt;

use serde::{Deserialize, Serialize};

use emulator_common::EmulatorError;

/// Trigger configuration as supplied to `deploy`.
///
/// The default (empty) spec means an HTTP trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Trigger tag: `http`, `background`, `storage`/`bucket`, `pubsub`/`topic`.
    #[serde(default, alias = "trigger", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Event source for background triggers (`storage`, `pubsub`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Bucket or topic the trigger is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl TriggerSpec {
    /// An HTTP trigger.
    pub fn http() -> Self {
        Self::default()
    }

    /// A generic background trigger.
    pub fn background() -> Self {
        Self::tagged("background")
    }

    /// A storage-object trigger on `bucket`.
    pub fn storage(bucket: impl Into<String>) -> Self {
        Self::tagged("storage").with_resource(bucket)
    }

    /// A pub/sub-message trigger on `topic`.
    pub fn pubsub(topic: impl Into<String>) -> Self {
        Self::tagged("pubsub").with_resource(topic)
    }

    /// A spec with an explicit tag.
    pub fn tagged(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Set the event source.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the bound resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Resolve into a concrete trigger.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::InvalidTrigger`] for unknown tags and for
    /// event or resource settings on an HTTP trigger.
    pub fn resolve(&self) -> Result<Trigger, EmulatorError> {
        let kind = normalize(self.kind.as_deref());
        let event = normalize(self.event.as_deref())
            .map(EventKind::parse)
            .transpose()?;
        let resource = self
            .resource
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        match kind.as_deref() {
            None | Some("http" | "https") => {
                if let Some(event) = event {
                    return Err(EmulatorError::invalid_trigger(format!(
                        "HTTP triggers cannot carry a {event} event"
                    )));
                }
                if resource.is_some() {
                    return Err(EmulatorError::invalid_trigger(
                        "HTTP triggers cannot be bound to a resource",
                    ));
                }
                Ok(Trigger::Http)
            }
            Some("background" | "event") => Ok(Trigger::Background { event, resource }),
            Some(tag) => {
                let implied = EventKind::parse(tag.to_string())?;
                if let Some(other) = event.filter(|e| *e != implied) {
                    return Err(EmulatorError::invalid_trigger(format!(
                        "Trigger '{tag}' conflicts with event '{other}'"
                    )));
                }
                Ok(Trigger::Background {
                    event: Some(implied),
                    resource,
                })
            }
        }
    }
}

fn normalize(tag: Option<&str>) -> Option<String> {
    tag.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
}

/// Event source of an event-qualified background trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Storage object change in a bucket.
    Storage,
    /// Message published to a topic.
    #[serde(rename = "pubsub")]
    PubSub,
}

impl EventKind {
    fn parse(tag: String) -> Result<Self, EmulatorError> {
        match tag.as_str() {
            "storage" | "bucket" | "gcs" => Ok(Self::Storage),
            "pubsub" | "topic" => Ok(Self::PubSub),
            other => Err(EmulatorError::invalid_trigger(format!(
                "Unknown trigger kind '{other}'"
            ))),
        }
    }

    /// Event type reported in the envelope handed to the function.
    pub fn event_type(self) -> &'static str {
        match self {
            Self::Storage => "google.storage.object.finalize",
            Self::PubSub => "google.pubsub.topic.publish",
        }
    }

    /// Short tag, as accepted by [`TriggerSpec`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::PubSub => "pubsub",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a deployed function is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Invoked through an HTTP endpoint.
    Http,
    /// Invoked with event data.
    Background {
        /// Event source, if the trigger is bound to one.
        event: Option<EventKind>,
        /// Bucket or topic name.
        resource: Option<String>,
    },
}

impl Trigger {
    /// Whether the function is HTTP-triggered.
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http)
    }

    /// Event source, if any.
    pub fn event(&self) -> Option<EventKind> {
        match self {
            Self::Http => None,
            Self::Background { event, .. } => *event,
        }
    }

    /// Name used for the `type` field of listings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Background { event: None, .. } => "background",
            Self::Background {
                event: Some(event), ..
            } => event.as_str(),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec_is_http() {
        assert_eq!(TriggerSpec::default().resolve().unwrap(), Trigger::Http);
        assert_eq!(TriggerSpec::tagged(" HTTP ").resolve().unwrap(), Trigger::Http);
    }

    #[test]
    fn test_background_specs() {
        assert_eq!(
            TriggerSpec::background().resolve().unwrap(),
            Trigger::Background {
                event: None,
                resource: None
            }
        );

        let storage = TriggerSpec::storage("uploads").resolve().unwrap();
        assert_eq!(storage.event(), Some(EventKind::Storage));
        assert_eq!(storage.type_name(), "storage");

        let topic = TriggerSpec::tagged("topic").resolve().unwrap();
        assert_eq!(topic.event(), Some(EventKind::PubSub));

        let explicit = TriggerSpec::background().with_event("bucket").resolve().unwrap();
        assert_eq!(explicit.event(), Some(EventKind::Storage));
    }

    #[test]
    fn test_http_rejects_event_qualifiers() {
        let err = TriggerSpec::http().with_event("storage").resolve().unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidTrigger { .. }));

        let err = TriggerSpec::http().with_resource("bucket").resolve().unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidTrigger { .. }));
    }

    #[test]
    fn test_unknown_and_conflicting_tags() {
        assert!(TriggerSpec::tagged("cron").resolve().is_err());
        assert!(
            TriggerSpec::tagged("storage")
                .with_event("pubsub")
                .resolve()
                .is_err()
        );
        assert!(
            TriggerSpec::tagged("storage")
                .with_event("bucket")
                .resolve()
                .is_ok()
        );
    }

    #[test]
    fn test_spec_deserialize() {
        let spec: TriggerSpec =
            serde_json::from_str(r#"{"trigger": "pubsub", "resource": "orders"}"#).unwrap();
        assert_eq!(spec, TriggerSpec::pubsub("orders"));

        let spec: TriggerSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec, TriggerSpec::http());
    }
}
