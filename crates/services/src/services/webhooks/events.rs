use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use db::{models::webhook::ALL_EVENTS, validation::ValidationErrors};

/// Events a webhook can subscribe to. The strum name is the wire name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    EnumIter, IntoStaticStr,
)]
#[serde(into = "&'static str", try_from = "String")]
pub enum WebhookEvent {
    #[strum(serialize = "project.created")]
    ProjectCreated,
    #[strum(serialize = "project.updated")]
    ProjectUpdated,
    #[strum(serialize = "project.archived")]
    ProjectArchived,
    #[strum(serialize = "task.created")]
    TaskCreated,
    #[strum(serialize = "task.updated")]
    TaskUpdated,
    #[strum(serialize = "task.completed")]
    TaskCompleted,
    #[strum(serialize = "task.deleted")]
    TaskDeleted,
    #[strum(serialize = "wiki.created")]
    WikiCreated,
    #[strum(serialize = "wiki.updated")]
    WikiUpdated,
    #[strum(serialize = "comment.created")]
    CommentCreated,
    #[strum(serialize = "milestone.completed")]
    MilestoneCompleted,
    #[strum(serialize = "webhook.test")]
    WebhookTest,
}

impl WebhookEvent {
    pub fn all_names() -> Vec<&'static str> {
        WebhookEvent::iter().map(WebhookEvent::as_str).collect()
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl TryFrom<String> for WebhookEvent {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Check a subscription list: at least one entry, each a known event or `*`.
pub fn validate_subscriptions(field: &str, events: &[String], errors: &mut ValidationErrors) {
    if events.is_empty() {
        errors.add(field, "The events field must contain at least one event.");
        return;
    }
    for event in events {
        if event != ALL_EVENTS && event.parse::<WebhookEvent>().is_err() {
            errors.add(
                field,
                format!(
                    "The event '{event}' is not supported. Supported events: {}.",
                    WebhookEvent::all_names().join(", ")
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for event in WebhookEvent::iter() {
            assert_eq!(event.to_string(), event.as_str());
            assert_eq!(event.as_str().parse::<WebhookEvent>().unwrap(), event);
            assert_eq!(
                serde_json::to_value(event).unwrap(),
                serde_json::Value::String(event.as_str().to_string())
            );
        }
        assert_eq!(WebhookEvent::all_names().len(), 12);
        assert_eq!(
            serde_json::from_value::<WebhookEvent>(serde_json::json!("wiki.updated")).unwrap(),
            WebhookEvent::WikiUpdated
        );
        assert!(serde_json::from_value::<WebhookEvent>(serde_json::json!("WikiUpdated")).is_err());
    }

    #[test]
    fn test_validate_subscriptions() {
        let mut errors = ValidationErrors::new();
        validate_subscriptions(
            "events",
            &["task.created".to_string(), "*".to_string()],
            &mut errors,
        );
        assert!(errors.is_empty());

        validate_subscriptions("events", &["task.exploded".to_string()], &mut errors);
        assert!(errors.has("events"));

        let mut errors = ValidationErrors::new();
        validate_subscriptions("events", &[], &mut errors);
        assert!(errors.has("events"));
    }
}
