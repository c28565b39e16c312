use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Envelope returned by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize, TS)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    /// Field-keyed validation messages, present only on 422 responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.to_string()),
            errors: None,
        }
    }

    pub fn validation(message: &str, errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.to_string()),
            errors: Some(errors),
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_key_is_omitted_on_success() {
        let json = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn validation_carries_field_errors() {
        let mut errors = BTreeMap::new();
        errors.insert("name".to_string(), vec!["The name field is required.".to_string()]);
        let json = serde_json::to_value(ApiResponse::<()>::validation("invalid", errors)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"]["name"][0], "The name field is required.");
    }
}
