//! Call-time payload normalization and trigger-specific argument shaping.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::trigger::{EventKind, Trigger};

/// Key some callers set to flag a payload as event data. Dropped from the
/// event's `data`; the trigger decides whether a call is an event.
pub const EVENT_MARKER_KEY: &str = "event";

/// Storage event field describing the object's state.
pub const RESOURCE_STATE_KEY: &str = "resourceState";

/// `resourceState` assumed when a storage payload does not carry one.
pub const DEFAULT_RESOURCE_STATE: &str = "exists";

/// Best-effort decoding of a string payload.
///
/// A string holding a JSON object or array is decoded into that value.
/// Anything else, including strings holding JSON scalars and malformed
/// JSON, is returned unchanged.
pub fn decode(payload: Value) -> Value {
    let Value::String(text) = &payload else {
        return payload;
    };

    match serde_json::from_str::<Value>(text.trim()) {
        Ok(decoded @ (Value::Object(_) | Value::Array(_))) => decoded,
        _ => payload,
    }
}

/// Build the argument a function with `trigger` receives for `data`.
///
/// HTTP and plain background functions get `data` as-is. Event-qualified
/// background functions get an envelope with the event metadata and the
/// payload nested under `data`.
pub fn shape(trigger: &Trigger, data: Value) -> Value {
    let Trigger::Background {
        event: Some(event),
        resource,
    } = trigger
    else {
        return data;
    };

    let data = match (event, data) {
        (EventKind::Storage, Value::Object(fields)) => Value::Object(storage_data(fields)),
        (_, Value::Object(mut fields)) => {
            fields.remove(EVENT_MARKER_KEY);
            Value::Object(fields)
        }
        (_, other) => other,
    };

    let mut envelope = Map::new();
    envelope.insert("eventId".into(), Value::String(Uuid::new_v4().to_string()));
    envelope.insert("eventType".into(), Value::String(event.event_type().into()));
    envelope.insert(
        "resource".into(),
        resource.clone().map_or(Value::Null, Value::String),
    );
    envelope.insert("data".into(), data);
    Value::Object(envelope)
}

fn storage_data(mut fields: Map<String, Value>) -> Map<String, Value> {
    fields.remove(EVENT_MARKER_KEY);
    fields
        .entry(RESOURCE_STATE_KEY)
        .or_insert_with(|| Value::String(DEFAULT_RESOURCE_STATE.into()));
    fields
}
