use super::{ApiError, ErrorKind, FieldErrors, RawError};
use serde_json::Value;
use std::collections::BTreeMap;

/// Map a raw transport failure onto the error taxonomy. Never fails; anything
/// unrecognised comes out as `UNKNOWN`.
pub fn classify(raw: &RawError) -> ApiError {
    match raw {
        RawError::Network(detail) => {
            tracing::trace!("network failure: {}", detail);
            ApiError::new(ErrorKind::Network, ErrorKind::Network.default_message())
        }
        RawError::Status { status, body } => classify_status(*status, body.as_ref()),
        RawError::Validation(payload) => from_payload(ErrorKind::Validation, payload, None),
        RawError::Other(message) => {
            let message = if message.trim().is_empty() {
                ErrorKind::Unknown.default_message().to_string()
            } else {
                message.clone()
            };
            ApiError::new(ErrorKind::Unknown, message)
        }
    }
}

fn classify_status(status: u16, body: Option<&Value>) -> ApiError {
    let kind = match status {
        401 | 403 => ErrorKind::Auth,
        422 => ErrorKind::Validation,
        s if s >= 500 => ErrorKind::Server,
        _ if body.is_some_and(|b| extract_validation(b).is_some()) => ErrorKind::Validation,
        _ => ErrorKind::Unknown,
    };

    match body {
        Some(payload) => from_payload(kind, payload, Some(status)),
        None => {
            let mut err = ApiError::new(kind, kind.default_message());
            err.status = Some(status);
            err
        }
    }
}

fn from_payload(kind: ErrorKind, payload: &Value, status: Option<u16>) -> ApiError {
    let message = extract_message(payload).unwrap_or_else(|| kind.default_message().to_string());
    let mut err = ApiError::new(kind, message);
    err.status = status;

    if kind == ErrorKind::Validation {
        err.validation = extract_validation(payload);
        err.field = payload
            .get("field")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| match &err.validation {
                Some(fields) if fields.len() == 1 => fields.keys().next().cloned(),
                _ => None,
            });
    }

    err
}

/// Pull a human-readable message out of an error body.
///
/// Handles `{"error": "..."}`, `{"error": {"message": "..."}}`, `{"message": "..."}`
/// and `{"detail": "..."}`.
fn extract_message(payload: &Value) -> Option<String> {
    if let Some(error) = payload.get("error") {
        if let Some(msg) = error.as_str() {
            return Some(msg.to_string());
        }
        if let Some(msg) = error.get("message").and_then(Value::as_str) {
            return Some(msg.to_string());
        }
    }

    if let Some(msg) = payload.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }

    payload
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Field errors from `validation`/`errors` maps or a `detail` list of `{loc, msg}`
fn extract_validation(payload: &Value) -> Option<BTreeMap<String, FieldErrors>> {
    let map = payload
        .get("validation")
        .or_else(|| payload.get("errors"))
        .and_then(Value::as_object);

    if let Some(map) = map {
        let fields: BTreeMap<String, FieldErrors> = map
            .iter()
            .filter_map(|(field, value)| field_errors(value).map(|e| (field.clone(), e)))
            .collect();
        return (!fields.is_empty()).then_some(fields);
    }

    let detail = payload.get("detail").and_then(Value::as_array)?;
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in detail {
        let Some(msg) = item.get("msg").and_then(Value::as_str) else {
            continue;
        };
        let field = item
            .get("loc")
            .and_then(Value::as_array)
            .and_then(|loc| loc.last())
            .map(|last| match last {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "non_field_errors".to_string());
        fields.entry(field).or_default().push(msg.to_string());
    }

    let fields: BTreeMap<String, FieldErrors> = fields
        .into_iter()
        .map(|(field, mut msgs)| {
            let errors = if msgs.len() == 1 {
                FieldErrors::One(msgs.remove(0))
            } else {
                FieldErrors::Many(msgs)
            };
            (field, errors)
        })
        .collect();
    (!fields.is_empty()).then_some(fields)
}

fn field_errors(value: &Value) -> Option<FieldErrors> {
    match value {
        Value::String(msg) => Some(FieldErrors::One(msg.clone())),
        Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            (!msgs.is_empty()).then_some(FieldErrors::Many(msgs))
        }
        _ => None,
    }
}
