//! Tri-state fields for partial updates.
//!
//! A nullable column in an update payload is an `Option<Option<T>>`:
//! - `None`: the field was absent, keep the stored value
//! - `Some(None)`: the field was `null`, clear the column
//! - `Some(Some(v))`: set the column to `v`
//!
//! Plain serde collapses `null` into the outer `None`, so such fields need
//! `#[serde(default, deserialize_with = "utils::nullable::deserialize")]`.

use serde::{Deserialize, Deserializer};

pub type Nullable<T> = Option<Option<T>>;

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Nullable<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// The value to store after applying `update` over `existing`.
pub fn apply<'a, T>(update: &'a Nullable<T>, existing: &'a Option<T>) -> Option<&'a T> {
    match update {
        Some(value) => value.as_ref(),
        None => existing.as_ref(),
    }
}

/// The new non-null value, if the payload carries one.
pub fn value<T>(update: &Nullable<T>) -> Option<&T> {
    update.as_ref().and_then(Option::as_ref)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "deserialize")]
        due: Nullable<String>,
    }

    fn parse(json: &str) -> Patch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        assert_eq!(parse("{}").due, None);
        assert_eq!(parse(r#"{"due":null}"#).due, Some(None));
        assert_eq!(parse(r#"{"due":"x"}"#).due, Some(Some("x".to_string())));
    }

    #[test]
    fn test_apply_over_existing() {
        let stored = Some("old".to_string());
        assert_eq!(apply(&None, &stored), Some(&"old".to_string()));
        assert_eq!(apply(&Some(None), &stored), None);
        assert_eq!(
            apply(&Some(Some("new".to_string())), &stored),
            Some(&"new".to_string())
        );
        assert_eq!(value(&Some(None::<String>)), None);
    }
}
