//! Job decoder - turns a raw notification into a validated job
//!
//! Accepted payload shapes:
//! - direct `{"bucket", "key", "size"}`
//! - event envelope `{"data": {...}}`
//! - pub/sub envelope `{"Type": "Notification", "Message": "<json>", "MessageAttributes": {...}}`
//! - object-store event `{"Records": [{"s3": {"bucket": {"name"}, "object": {"key", "size"}}}]}`

use crate::error::{JobError, Result};
use crate::models::{Job, StorageLocation};
use serde_json::Value;

/// Extensions the pipeline knows how to decode, lowercase
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "tiff", "avif"];

/// Name of the numeric routing attribute used by the dispatch layer
pub const ROUTING_ATTRIBUTE: &str = "size";

/// Decode a notification payload into a job
///
/// `routing_size` is the dispatch attribute delivered next to the body (a header or
/// message attribute). When present it must match the body's size.
pub fn decode_job(payload: &[u8], routing_size: Option<u64>) -> Result<Job> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| JobError::MalformedJob(format!("notification is not valid JSON: {e}")))?;
    decode_value(&value, routing_size)
}

fn decode_value(value: &Value, routing_size: Option<u64>) -> Result<Job> {
    if !value.is_object() {
        return Err(JobError::MalformedJob(
            "notification must be a JSON object".to_string(),
        ));
    }

    if let Some(records) = value.get("Records") {
        return decode_object_event(records, routing_size);
    }

    if value.get("Type").and_then(Value::as_str) == Some("Notification") {
        let message = value
            .get("Message")
            .and_then(Value::as_str)
            .ok_or_else(|| JobError::MalformedJob("envelope has no Message".to_string()))?;
        let inner: Value = serde_json::from_str(message)
            .map_err(|e| JobError::MalformedJob(format!("envelope Message is not JSON: {e}")))?;
        let attribute = envelope_routing_attribute(value)?;
        let routing = match (routing_size, attribute) {
            (Some(a), Some(b)) if a != b => {
                return Err(JobError::MalformedJob(format!(
                    "conflicting routing attributes {a} and {b}"
                )))
            }
            (a, b) => a.or(b),
        };
        return decode_value(&inner, routing);
    }

    if let Some(data) = value.get("data").filter(|d| d.is_object()) {
        return decode_direct(data, routing_size);
    }

    decode_direct(value, routing_size)
}

fn decode_direct(value: &Value, routing_size: Option<u64>) -> Result<Job> {
    let bucket = required_str(value, "bucket")?;
    let key = required_str(value, "key")?;
    let size = required_size(value.get("size"))?;
    build_job(bucket, key, size, routing_size)
}

fn decode_object_event(records: &Value, routing_size: Option<u64>) -> Result<Job> {
    let records = records
        .as_array()
        .ok_or_else(|| JobError::MalformedJob("Records must be an array".to_string()))?;
    let [record] = records.as_slice() else {
        return Err(JobError::MalformedJob(format!(
            "expected exactly one record, got {}",
            records.len()
        )));
    };

    let entity = record
        .get("s3")
        .ok_or_else(|| JobError::MalformedJob("record has no s3 entity".to_string()))?;
    let bucket = entity
        .get("bucket")
        .and_then(|b| b.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| JobError::MalformedJob("missing bucket".to_string()))?;
    let object = entity
        .get("object")
        .ok_or_else(|| JobError::MalformedJob("missing object".to_string()))?;
    let raw_key = required_str(object, "key")?;
    let key = decode_event_key(raw_key)?;
    let size = required_size(object.get("size"))?;

    build_job(bucket, &key, size, routing_size)
}

/// Object-store event keys are form-encoded: `+` is a space, the rest is percent-encoded
fn decode_event_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| JobError::MalformedJob(format!("undecodable key {raw:?}: {e}")))
}

fn envelope_routing_attribute(envelope: &Value) -> Result<Option<u64>> {
    let Some(attribute) = envelope
        .get("MessageAttributes")
        .and_then(|attrs| attrs.get(ROUTING_ATTRIBUTE))
    else {
        return Ok(None);
    };

    let raw = attribute.get("Value").unwrap_or(attribute);
    let parsed = match raw {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed
        .and_then(integral_u64)
        .map(Some)
        .ok_or_else(|| JobError::MalformedJob(format!("invalid routing attribute: {raw}")))
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| JobError::MalformedJob(format!("missing {field}")))
}

fn required_size(value: Option<&Value>) -> Result<u64> {
    let value = value.ok_or_else(|| JobError::MalformedJob("missing size".to_string()))?;
    value
        .as_u64()
        .or_else(|| value.as_f64().and_then(integral_u64))
        .ok_or_else(|| {
            JobError::MalformedJob(format!("size must be a non-negative integer, got {value}"))
        })
}

fn integral_u64(n: f64) -> Option<u64> {
    if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 {
        Some(n as u64)
    } else {
        None
    }
}

fn build_job(bucket: &str, raw_key: &str, size: u64, routing_size: Option<u64>) -> Result<Job> {
    if let Some(routing) = routing_size {
        if routing != size {
            return Err(JobError::MalformedJob(format!(
                "routing attribute {routing} does not match size {size}"
            )));
        }
    }

    let key = sanitize_key(raw_key);
    if key.is_empty() {
        return Err(JobError::MalformedJob("key is empty".to_string()));
    }

    match extension(key) {
        Some(ext) if is_accepted_extension(ext) => {}
        _ => return Err(JobError::UnsupportedMediaType(key.to_string())),
    }

    Ok(Job::new(StorageLocation::new(bucket, key), size))
}

/// Strip leading path separators; idempotent
pub fn sanitize_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

/// Final extension of the key's file name, without the dot
///
/// Dot-files such as `.hidden` have no extension.
pub fn extension(key: &str) -> Option<&str> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    match file_name.rfind('.') {
        Some(index) if index > 0 && index + 1 < file_name.len() => Some(&file_name[index + 1..]),
        _ => None,
    }
}

pub fn is_accepted_extension(ext: &str) -> bool {
    ACCEPTED_EXTENSIONS
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Result<Job> {
        decode_job(value.to_string().as_bytes(), None)
    }

    #[test]
    fn test_direct_notification() {
        let job = decode(json!({"bucket": "media", "key": "/photos/vacation.jpg", "size": 1234}))
            .unwrap();
        assert_eq!(job.bucket(), "media");
        assert_eq!(job.key(), "photos/vacation.jpg");
        assert_eq!(job.size_bytes(), 1234);
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let missing_key = decode(json!({"bucket": "media", "size": 1}));
        assert!(matches!(missing_key, Err(JobError::MalformedJob(_))));

        let missing_bucket = decode(json!({"key": "a.jpg", "size": 1}));
        assert!(matches!(missing_bucket, Err(JobError::MalformedJob(_))));

        let negative = decode(json!({"bucket": "media", "key": "a.jpg", "size": -5}));
        assert!(matches!(negative, Err(JobError::MalformedJob(_))));

        let garbage = decode_job(b"not json", None);
        assert!(matches!(garbage, Err(JobError::MalformedJob(_))));

        let only_slash = decode(json!({"bucket": "media", "key": "/", "size": 1}));
        assert!(matches!(only_slash, Err(JobError::MalformedJob(_))));
    }

    #[test]
    fn test_unsupported_extensions() {
        for key in ["a.gif", "notes.txt", "noext", "dir.jpg/file", ".jpg"] {
            let result = decode(json!({"bucket": "media", "key": key, "size": 1}));
            assert!(
                matches!(result, Err(JobError::UnsupportedMediaType(_))),
                "{key}"
            );
        }
        for key in ["a.JPG", "a.Jpeg", "b/c.PNG", "x.webp", "y.tiff", "z.avif"] {
            assert!(decode(json!({"bucket": "media", "key": key, "size": 1})).is_ok(), "{key}");
        }
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for key in ["/a/b.jpg", "a/b.jpg", "//a.png", ""] {
            let once = sanitize_key(key);
            assert_eq!(sanitize_key(once), once);
        }
        assert_eq!(sanitize_key("/photos/a.jpg"), "photos/a.jpg");
    }

    #[test]
    fn test_envelopes() {
        let data = decode(json!({"data": {"bucket": "media", "key": "a.png", "size": 10}}))
            .unwrap();
        assert_eq!(data.key(), "a.png");

        let message = json!({"bucket": "media", "key": "b.png", "size": 6_000_000}).to_string();
        let pubsub = decode(json!({
            "Type": "Notification",
            "Message": message,
            "MessageAttributes": {"size": {"Type": "Number", "Value": "6000000"}}
        }))
        .unwrap();
        assert_eq!(pubsub.size_bytes(), 6_000_000);

        let mismatched = decode(json!({
            "Type": "Notification",
            "Message": message,
            "MessageAttributes": {"size": {"Type": "Number", "Value": "10"}}
        }));
        assert!(matches!(mismatched, Err(JobError::MalformedJob(_))));
    }

    #[test]
    fn test_object_store_event() {
        let job = decode(json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "media"},
                    "object": {"key": "summer+trip/beach%2B1.jpg", "size": 42}
                }
            }]
        }))
        .unwrap();
        assert_eq!(job.key(), "summer trip/beach+1.jpg");
        assert_eq!(job.size_bytes(), 42);

        let two = decode(json!({"Records": [{}, {}]}));
        assert!(matches!(two, Err(JobError::MalformedJob(_))));
    }

    #[test]
    fn test_routing_attribute_must_match() {
        let body = json!({"bucket": "media", "key": "a.jpg", "size": 100}).to_string();
        assert!(decode_job(body.as_bytes(), Some(100)).is_ok());
        assert!(matches!(
            decode_job(body.as_bytes(), Some(99)),
            Err(JobError::MalformedJob(_))
        ));
    }

    #[test]
    fn test_float_sizes() {
        let job = decode(json!({"bucket": "media", "key": "a.jpg", "size": 2048.0})).unwrap();
        assert_eq!(job.size_bytes(), 2048);
        let fractional = decode(json!({"bucket": "media", "key": "a.jpg", "size": 1.5}));
        assert!(matches!(fractional, Err(JobError::MalformedJob(_))));
    }
}
