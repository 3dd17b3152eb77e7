use serde_json::Value;

/// Nesting limit for error payloads; anything deeper yields no message.
const MAX_DEPTH: usize = 8;

/// The shapes an error payload can take.
enum ErrorShape<'a> {
    Text(&'a str),
    List(&'a [Value]),
    /// Object carrying one or more of `message`, `error`, `data`, in that priority.
    Wrapped([Option<&'a Value>; 3]),
    Opaque,
}

impl<'a> ErrorShape<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::String(s) => ErrorShape::Text(s),
            Value::Array(items) => ErrorShape::List(items),
            Value::Object(map) => {
                let members = [map.get("message"), map.get("error"), map.get("data")];
                if members.iter().all(Option::is_none) {
                    ErrorShape::Opaque
                } else {
                    ErrorShape::Wrapped(members)
                }
            }
            _ => ErrorShape::Opaque,
        }
    }
}

/// Pull a user-facing message out of a server error body.
///
/// Accepts a bare string, `{message}`, `{error}`, an array (first element that
/// yields a message wins) or `{data}` wrapping any of these. Returns `None` when
/// nothing usable is found within the nesting limit.
pub fn extract_message(value: &Value) -> Option<String> {
    extract(value, 0)
}

fn extract(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }

    match ErrorShape::of(value) {
        ErrorShape::Text(text) => {
            if text.trim().is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
        ErrorShape::List(items) => items.iter().find_map(|item| extract(item, depth + 1)),
        ErrorShape::Wrapped(members) => members
            .into_iter()
            .flatten()
            .find_map(|member| extract(member, depth + 1)),
        ErrorShape::Opaque => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string() {
        assert_eq!(
            extract_message(&json!("access denied")),
            Some("access denied".to_string())
        );
    }

    #[test]
    fn message_inside_data_envelope() {
        let body = json!({"status_code": 400, "data": {"message": "invalid template"}});
        assert_eq!(extract_message(&body), Some("invalid template".to_string()));
    }

    #[test]
    fn error_key() {
        let body = json!({"error": "template not found"});
        assert_eq!(extract_message(&body), Some("template not found".to_string()));
    }

    #[test]
    fn message_takes_priority_over_error() {
        let body = json!({"error": "second", "message": "first"});
        assert_eq!(extract_message(&body), Some("first".to_string()));
    }

    #[test]
    fn empty_message_falls_through_to_data() {
        let body = json!({"message": "", "data": {"error": {"message": "bad arn"}}});
        assert_eq!(extract_message(&body), Some("bad arn".to_string()));
    }

    #[test]
    fn array_uses_first_usable_element() {
        let body = json!({"errors": [], "data": [null, {"message": "one"}, "two"]});
        assert_eq!(extract_message(&body), Some("one".to_string()));
    }

    #[test]
    fn opaque_values_yield_nothing() {
        assert_eq!(extract_message(&json!(null)), None);
        assert_eq!(extract_message(&json!(42)), None);
        assert_eq!(extract_message(&json!({"status_code": 500})), None);
        assert_eq!(extract_message(&json!("   ")), None);
    }

    #[test]
    fn message_is_not_trimmed() {
        assert_eq!(
            extract_message(&json!({"message": " spaced "})),
            Some(" spaced ".to_string())
        );
    }

    #[test]
    fn deep_nesting_stops_at_limit() {
        let mut shallow = json!("found");
        for _ in 0..3 {
            shallow = json!({ "data": shallow });
        }
        assert_eq!(extract_message(&shallow), Some("found".to_string()));

        let mut deep = json!("lost");
        for _ in 0..50 {
            deep = json!({ "data": deep });
        }
        assert_eq!(extract_message(&deep), None);
    }
}
