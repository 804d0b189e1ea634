use serde_json::{Map, Value};

/// The error body shapes the backend is known to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendErrorBody {
    Message(String),
    Error(String),
    Errors(Vec<String>),
    FieldErrors(Vec<(String, String)>),
    PlainText(String),
    Unknown,
}

impl BackendErrorBody {
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let body = body.trim();
        if body.is_empty() {
            return BackendErrorBody::Unknown;
        }

        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(object)) => Self::from_object(&object),
            Ok(Value::Array(items)) => Self::errors(&items),
            Ok(Value::String(text)) if !text.trim().is_empty() => {
                BackendErrorBody::PlainText(text.trim().to_string())
            }
            Ok(_) => BackendErrorBody::Unknown,
            // HTML error pages from proxies say nothing useful to the user.
            Err(_) if body.starts_with('<') => BackendErrorBody::Unknown,
            Err(_) => BackendErrorBody::PlainText(body.to_string()),
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        if let Some(message) = non_empty_str(object.get("message")) {
            return BackendErrorBody::Message(message);
        }
        if let Some(error) = object.get("error") {
            if let Some(error) = non_empty_str(Some(error)) {
                return BackendErrorBody::Error(error);
            }
            if let Some(message) = error.get("message").and_then(|m| non_empty_str(Some(m))) {
                return BackendErrorBody::Error(message);
            }
        }
        if let Some(Value::Array(items)) = object.get("errors") {
            if let body @ BackendErrorBody::Errors(_) = Self::errors(items) {
                return body;
            }
        }
        if let Some(Value::Object(fields)) = object.get("fieldErrors") {
            let field_errors: Vec<(String, String)> = fields
                .iter()
                .filter_map(|(field, value)| item_text(value).map(|text| (field.clone(), text)))
                .collect();
            if !field_errors.is_empty() {
                return BackendErrorBody::FieldErrors(field_errors);
            }
        }
        BackendErrorBody::Unknown
    }

    fn errors(items: &[Value]) -> Self {
        let messages: Vec<String> = items.iter().filter_map(item_text).collect();
        if messages.is_empty() {
            BackendErrorBody::Unknown
        } else {
            BackendErrorBody::Errors(messages)
        }
    }

    /// The human-readable form of the body, if it carried one.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            BackendErrorBody::Message(text)
            | BackendErrorBody::Error(text)
            | BackendErrorBody::PlainText(text) => Some(text.clone()),
            BackendErrorBody::Errors(messages) => Some(messages.join("; ")),
            BackendErrorBody::FieldErrors(fields) => Some(
                fields
                    .iter()
                    .map(|(field, message)| format!("{field}: {message}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            BackendErrorBody::Unknown => None,
        }
    }
}

/// Normalises any backend error body into a single message, falling back to
/// `fallback` when the body carries nothing readable.
#[must_use]
pub fn parse_backend_error(body: &str, fallback: &str) -> String {
    BackendErrorBody::parse(body)
        .message()
        .unwrap_or_else(|| fallback.to_string())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn item_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => non_empty_str(Some(value)),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(item_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(object) => ["message", "defaultMessage", "msg"]
            .iter()
            .find_map(|key| non_empty_str(object.get(*key))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "Booking failed";

    #[test]
    fn message_field() {
        assert_eq!(
            BackendErrorBody::parse(r#"{"message":"Vehicle already booked"}"#),
            BackendErrorBody::Message("Vehicle already booked".to_string())
        );
    }

    #[test]
    fn error_field_as_string_or_object() {
        assert_eq!(
            parse_backend_error(r#"{"error":"Bad Request"}"#, FALLBACK),
            "Bad Request"
        );
        assert_eq!(
            parse_backend_error(r#"{"error":{"message":"Dates overlap"}}"#, FALLBACK),
            "Dates overlap"
        );
    }

    #[test]
    fn errors_list_mixes_strings_and_objects() {
        let body = r#"{"errors":["Start date is in the past",{"defaultMessage":"Price mismatch"}]}"#;
        assert_eq!(
            parse_backend_error(body, FALLBACK),
            "Start date is in the past; Price mismatch"
        );
    }

    #[test]
    fn field_errors_are_prefixed_with_their_field() {
        let body = r#"{"fieldErrors":{"endDate":"must be after start","totalPrice":["must be positive"]}}"#;
        assert_eq!(
            BackendErrorBody::parse(body),
            BackendErrorBody::FieldErrors(vec![
                ("endDate".to_string(), "must be after start".to_string()),
                ("totalPrice".to_string(), "must be positive".to_string()),
            ])
        );
        assert_eq!(
            parse_backend_error(body, FALLBACK),
            "endDate: must be after start; totalPrice: must be positive"
        );
    }

    #[test]
    fn plain_text_body() {
        assert_eq!(
            parse_backend_error("  Vehicle is under maintenance \n", FALLBACK),
            "Vehicle is under maintenance"
        );
    }

    #[test]
    fn unreadable_bodies_fall_back() {
        for body in ["", "   ", "{}", r#"{"status":400}"#, "<html>502</html>", "42", r#"{"errors":[]}"#] {
            assert_eq!(parse_backend_error(body, FALLBACK), FALLBACK, "body {body:?}");
        }
    }
}
