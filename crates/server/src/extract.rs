//! Request body extractor whose rejections use the API error envelope.

use axum::extract::{FromRequest, rejection::JsonRejection};
use db::validation::ValidationErrors;

use crate::error::ApiError;

/// `axum::Json` with decode failures reported as field-keyed 422s.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let text = err.body_text();
                // "<summary>: [<path>: ]<serde message> at line L column C"
                let detail = text.split_once(": ").map_or(text.as_str(), |(_, d)| d);
                ApiError::Validation(decode_errors(detail))
            }
            other => ApiError::Rejected(other.status(), other.body_text()),
        }
    }
}

/// Map a serde decode message onto the field it concerns.
fn decode_errors(detail: &str) -> ValidationErrors {
    let detail = detail.rsplit_once(" at line ").map_or(detail, |(d, _)| d);
    let (path, reason) = match detail.split_once(": ") {
        Some((path, reason)) if !path.contains(' ') => (Some(field_key(path)), reason),
        _ => (None, detail),
    };

    let missing = reason
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next());
    if let Some(field) = missing {
        let key = match path {
            Some(path) => format!("{path}.{field}"),
            None => field.to_string(),
        };
        let message = format!("The {} field is required.", label(&key));
        return ValidationErrors::single(&key, message);
    }

    let key = path.unwrap_or_else(|| "body".to_string());
    let message = format!("The {} field is invalid: {}.", label(&key), reason);
    ValidationErrors::single(&key, message)
}

/// `events[0]` becomes `events.0`.
fn field_key(path: &str) -> String {
    path.replace('[', ".").replace(']', "")
}

fn label(key: &str) -> String {
    key.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_keyed_by_name() {
        let errors = decode_errors("missing field `name` at line 1 column 2");
        assert_eq!(
            errors.messages()["name"],
            vec!["The name field is required.".to_string()]
        );
    }

    #[test]
    fn test_wrong_type_keyed_by_path() {
        let errors =
            decode_errors("name: invalid type: integer `5`, expected a string at line 1 column 10");
        assert!(errors.has("name"));

        let errors = decode_errors("events[1]: invalid type: integer `3`, expected a string");
        assert!(errors.has("events.1"));

        let errors = decode_errors("invalid type: sequence, expected struct CreateProject");
        assert!(errors.has("body"));
    }

    #[test]
    fn test_nested_missing_field() {
        let errors = decode_errors("rule: missing field `frequency` at line 1 column 9");
        assert!(errors.has("rule.frequency"));
    }
}
