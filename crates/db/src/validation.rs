//! Field-keyed validation errors for create/update payloads.
//!
//! Messages are collected per field in insertion order of fields so a 422 body
//! lists every problem at once rather than failing on the first.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, Default, Error, PartialEq)]
#[error("The given data was invalid.")]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single failing field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn messages(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn into_messages(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("The {} field is required.", humanize(field)));
        }
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!(
                    "The {} field must not be greater than {} characters.",
                    humanize(field),
                    max
                ),
            );
        }
    }

    pub fn between(&mut self, field: &str, value: i64, min: i64, max: i64) {
        if value < min || value > max {
            self.add(
                field,
                format!(
                    "The {} field must be between {} and {}.",
                    humanize(field),
                    min,
                    max
                ),
            );
        }
    }

    pub fn url(&mut self, field: &str, value: &str) {
        let lower = value.to_ascii_lowercase();
        let has_scheme = lower.starts_with("http://") || lower.starts_with("https://");
        let has_host = value
            .split_once("://")
            .map(|(_, rest)| !rest.trim_start_matches('/').is_empty())
            .unwrap_or(false);
        if !has_scheme || !has_host {
            self.add(
                field,
                format!("The {} field must be a valid URL.", humanize(field)),
            );
        }
    }
}

fn humanize(field: &str) -> String {
    field.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank() {
        let mut errors = ValidationErrors::new();
        errors.required("name", "   ");
        assert!(errors.has("name"));
        assert_eq!(
            errors.messages()["name"],
            vec!["The name field is required.".to_string()]
        );
    }

    #[test]
    fn test_messages_accumulate_per_field() {
        let mut errors = ValidationErrors::new();
        errors.required("due_on", "");
        errors.add("due_on", "second");
        errors.max_len("title", "abcdef", 3);
        let messages = errors.clone().into_messages();
        assert_eq!(messages["due_on"].len(), 2);
        assert!(messages["title"][0].contains("3 characters"));
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn test_empty_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_between() {
        let mut errors = ValidationErrors::new();
        errors.between("interval", 0, 1, 365);
        errors.between("day_of_month", 31, 1, 31);
        assert!(errors.has("interval"));
        assert!(!errors.has("day_of_month"));
    }

    #[test]
    fn test_url() {
        let mut errors = ValidationErrors::new();
        errors.url("url", "https://example.com/hook");
        assert!(errors.is_empty());
        errors.url("url", "ftp://example.com");
        errors.url("url", "https://");
        assert_eq!(errors.messages()["url"].len(), 2);
    }
}
