//! Server JSON payloads and their conversion into domain records.
//!
//! Every observation element is decoded on its own so a single bad record
//! never poisons the rest of the snapshot.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Geometry, ObservationState, RemoteAttachment, RemoteObservation, User};
use crate::util::normalize_text_option;

/// Placeholder the server uses for an unknown author
const UNKNOWN_USER_ID: &str = "-1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservationPayload {
    url: Option<String>,
    user_id: Option<Value>,
    device_id: Option<String>,
    last_modified: Option<Value>,
    timestamp: Option<Value>,
    state: Option<StatePayload>,
    #[serde(default)]
    states: Vec<StatePayload>,
    geometry: Option<Value>,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
    #[serde(default)]
    attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct StatePayload {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentPayload {
    id: Value,
    content_type: Option<String>,
    name: Option<String>,
    #[serde(default)]
    size: i64,
    relative_path: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    id: Value,
    username: String,
    display_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

/// Decode one element of the observations array.
///
/// Missing `lastModified`/`timestamp` stay `None`; the local copy supplies
/// them when the record is first stored.
pub fn decode_observation(value: Value) -> Result<RemoteObservation> {
    let remote_id = value
        .get("id")
        .and_then(scalar_text)
        .ok_or_else(|| Error::malformed(None, "missing observation id"))?;

    let payload: ObservationPayload = serde_json::from_value(value)
        .map_err(|error| Error::malformed(Some(&remote_id), error.to_string()))?;

    payload.into_remote(remote_id)
}

/// Decode a user profile response, stamping it as fetched at `now_ms`.
pub fn decode_user(value: Value, now_ms: i64) -> Result<User> {
    let payload: UserPayload = serde_json::from_value(value)?;
    let id = scalar_text(&payload.id)
        .ok_or_else(|| Error::InvalidInput("user payload is missing an id".to_string()))?;

    Ok(User {
        id,
        username: payload.username,
        display_name: normalize_text_option(payload.display_name),
        email: normalize_text_option(payload.email),
        phone: normalize_text_option(payload.phone),
        fetched_date: now_ms,
    })
}

impl ObservationPayload {
    fn into_remote(self, remote_id: String) -> Result<RemoteObservation> {
        let malformed = |reason: String| Error::malformed(Some(&remote_id), reason);

        let state = match self.state.or_else(|| self.states.into_iter().next()) {
            Some(state) => state
                .name
                .parse::<ObservationState>()
                .map_err(|error| malformed(error.to_string()))?,
            None => ObservationState::Active,
        };

        let geometry_value = self
            .geometry
            .ok_or_else(|| malformed("missing geometry".to_string()))?;
        let geometry: Geometry = serde_json::from_value(geometry_value)
            .map_err(|error| malformed(format!("invalid geometry: {error}")))?;
        geometry
            .validate()
            .map_err(|reason| malformed(format!("invalid geometry: {reason}")))?;

        let last_modified = match self.last_modified.as_ref() {
            Some(value) => Some(
                parse_time(value)
                    .ok_or_else(|| malformed(format!("invalid lastModified: {value}")))?,
            ),
            None => None,
        };

        let timestamp = match self
            .timestamp
            .as_ref()
            .or_else(|| self.properties.get("timestamp"))
        {
            Some(value) => Some(
                parse_time(value).ok_or_else(|| malformed(format!("invalid timestamp: {value}")))?,
            ),
            None => last_modified,
        };

        let user_id = self
            .user_id
            .as_ref()
            .and_then(scalar_text)
            .filter(|id| id != UNKNOWN_USER_ID);

        let properties = self
            .properties
            .into_iter()
            .filter_map(|(key, value)| property_text(value).map(|text| (key, text)))
            .collect::<BTreeMap<_, _>>();

        let attachments = self
            .attachments
            .into_iter()
            .map(|attachment| attachment.into_remote().map_err(&malformed))
            .collect::<Result<Vec<_>>>()?;

        Ok(RemoteObservation {
            remote_id,
            url: normalize_text_option(self.url),
            user_id,
            device_id: normalize_text_option(self.device_id),
            last_modified,
            timestamp,
            state,
            geometry,
            properties,
            attachments,
        })
    }
}

impl AttachmentPayload {
    fn into_remote(self) -> std::result::Result<RemoteAttachment, String> {
        let remote_id =
            scalar_text(&self.id).ok_or_else(|| "attachment is missing an id".to_string())?;
        let name = normalize_text_option(self.name)
            .ok_or_else(|| format!("attachment {remote_id} is missing a name"))?;

        Ok(RemoteAttachment {
            content_type: normalize_text_option(self.content_type)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            name,
            size: self.size.max(0),
            remote_path: normalize_text_option(self.relative_path),
            url: normalize_text_option(self.url),
            remote_id,
        })
    }
}

/// Ids arrive as strings or numbers
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => normalize_text_option(Some(text.clone())),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Scalars verbatim, nested values as JSON text, nulls dropped
fn property_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
    }
}

/// RFC 3339 string or Unix milliseconds
fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|time| time.timestamp_millis()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn feature() -> Value {
        json!({
            "id": "5f1c",
            "url": "https://scout.example.com/api/events/1/observations/5f1c",
            "userId": "u-9",
            "deviceId": "dev-2",
            "lastModified": "2024-03-01T12:00:00.000Z",
            "timestamp": "2024-03-01T11:59:00Z",
            "states": [{"name": "active"}],
            "geometry": {"type": "Point", "coordinates": [-105.0, 40.0]},
            "properties": {
                "type": "Fire",
                "EVENTLEVEL": "High",
                "casualties": 0,
                "verified": true,
                "tags": ["a", "b"],
                "empty": null
            },
            "attachments": [{
                "id": "att-1",
                "contentType": "image/png",
                "name": "scene.png",
                "size": 4096,
                "relativePath": "1/scene.png",
                "url": "https://scout.example.com/att-1"
            }]
        })
    }

    #[test]
    fn decodes_full_feature() {
        let observation = decode_observation(feature()).unwrap();

        assert_eq!(observation.remote_id, "5f1c");
        assert_eq!(observation.state, ObservationState::Active);
        assert_eq!(observation.user_id.as_deref(), Some("u-9"));
        assert_eq!(observation.geometry, Geometry::point(-105.0, 40.0));
        assert_eq!(observation.last_modified, Some(1_709_294_400_000));
        assert_eq!(observation.timestamp, Some(1_709_294_340_000));
        assert_eq!(observation.properties["EVENTLEVEL"], "High");
        assert_eq!(observation.properties["casualties"], "0");
        assert_eq!(observation.properties["verified"], "true");
        assert_eq!(observation.properties["tags"], r#"["a","b"]"#);
        assert!(!observation.properties.contains_key("empty"));
        assert_eq!(observation.attachments.len(), 1);
        assert_eq!(observation.attachments[0].remote_path.as_deref(), Some("1/scene.png"));
    }

    #[test]
    fn archive_state_from_state_object() {
        let mut value = feature();
        value["state"] = json!({"name": "ARCHIVE"});
        let observation = decode_observation(value).unwrap();
        assert_eq!(observation.state, ObservationState::Archive);
    }

    #[test]
    fn unknown_user_placeholder_becomes_none() {
        let mut value = feature();
        value["userId"] = json!("-1");
        assert_eq!(decode_observation(value).unwrap().user_id, None);

        let mut value = feature();
        value.as_object_mut().unwrap().remove("userId");
        assert_eq!(decode_observation(value).unwrap().user_id, None);
    }

    #[test]
    fn missing_times_are_left_unset() {
        let mut value = feature();
        let object = value.as_object_mut().unwrap();
        object.remove("lastModified");
        object.remove("timestamp");
        let observation = decode_observation(value.clone()).unwrap();
        assert_eq!(observation.last_modified, None);
        assert_eq!(observation.timestamp, None);
        assert_eq!(decode_observation(value).unwrap(), observation);
    }

    #[test]
    fn timestamp_falls_back_to_last_modified() {
        let mut value = feature();
        value.as_object_mut().unwrap().remove("timestamp");
        let observation = decode_observation(value).unwrap();
        assert_eq!(observation.timestamp, Some(1_709_294_400_000));
    }

    #[test]
    fn unknown_state_is_malformed() {
        let mut value = feature();
        value["states"] = json!([{"name": "shredded"}]);
        let error = decode_observation(value).unwrap_err();
        assert!(matches!(
            error,
            Error::MalformedRecord { remote_id: Some(ref id), .. } if id == "5f1c"
        ));
    }

    #[test]
    fn unsupported_geometry_is_malformed() {
        let mut value = feature();
        value["geometry"] = json!({"type": "Circle", "coordinates": [0, 0]});
        assert!(decode_observation(value).is_err());

        let mut value = feature();
        value["geometry"] = json!({"type": "Point", "coordinates": [0]});
        assert!(decode_observation(value).is_err());
    }

    #[test]
    fn missing_id_is_malformed_without_remote_id() {
        let mut value = feature();
        value.as_object_mut().unwrap().remove("id");
        let error = decode_observation(value).unwrap_err();
        assert!(matches!(error, Error::MalformedRecord { remote_id: None, .. }));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let mut value = feature();
        value["id"] = json!(42);
        value["userId"] = json!(7);
        let observation = decode_observation(value).unwrap();
        assert_eq!(observation.remote_id, "42");
        assert_eq!(observation.user_id.as_deref(), Some("7"));
    }

    #[test]
    fn decodes_user_profile() {
        let user = decode_user(
            json!({"id": "u-9", "username": "ranger", "displayName": " Ranger Rick ", "email": ""}),
            NOW,
        )
        .unwrap();
        assert_eq!(user.id, "u-9");
        assert_eq!(user.display_name.as_deref(), Some("Ranger Rick"));
        assert_eq!(user.email, None);
        assert_eq!(user.fetched_date, NOW);
    }
}
