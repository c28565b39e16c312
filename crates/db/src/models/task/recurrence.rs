//! Recurrence rules attached to a task.
//!
//! The row follows the live occurrence: completing a recurring task moves the
//! rule to the newly created task via [`TaskRecurrence::advance`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, TS, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Monday => chrono::Weekday::Mon,
            Weekday::Tuesday => chrono::Weekday::Tue,
            Weekday::Wednesday => chrono::Weekday::Wed,
            Weekday::Thursday => chrono::Weekday::Thu,
            Weekday::Friday => chrono::Weekday::Fri,
            Weekday::Saturday => chrono::Weekday::Sat,
            Weekday::Sunday => chrono::Weekday::Sun,
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct TaskRecurrence {
    pub id: Uuid,
    pub task_id: Uuid,
    pub frequency: Frequency,
    #[serde(rename = "interval")]
    pub repeat_interval: i64,
    #[sqlx(json)]
    pub days_of_week: Vec<Weekday>,
    pub day_of_month: Option<i64>,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub max_occurrences: Option<i64>,
    /// Occurrences created so far, the live task included
    pub occurrences_count: i64,
    pub next_due_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct UpsertRecurrence {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: i64,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    pub day_of_month: Option<i64>,
    pub starts_on: NaiveDate,
    pub ends_on: Option<NaiveDate>,
    pub max_occurrences: Option<i64>,
}

fn default_interval() -> i64 {
    1
}

const RECURRENCE_COLUMNS: &str = "id, task_id, frequency, repeat_interval, days_of_week, \
     day_of_month, starts_on, ends_on, max_occurrences, occurrences_count, next_due_on, \
     created_at, updated_at";

impl TaskRecurrence {
    /// Create the task's rule or replace it, keeping the occurrence count.
    pub async fn upsert(
        pool: &SqlitePool,
        task_id: Uuid,
        data: &UpsertRecurrence,
        next_due_on: Option<NaiveDate>,
    ) -> Result<Self, sqlx::Error> {
        let mut days = data.days_of_week.clone();
        days.sort();
        days.dedup();

        sqlx::query_as::<_, TaskRecurrence>(&format!(
            "INSERT INTO task_recurrences
                 (id, task_id, frequency, repeat_interval, days_of_week, day_of_month,
                  starts_on, ends_on, max_occurrences, occurrences_count, next_due_on)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1, $10)
             ON CONFLICT(task_id) DO UPDATE SET
                 frequency = excluded.frequency,
                 repeat_interval = excluded.repeat_interval,
                 days_of_week = excluded.days_of_week,
                 day_of_month = excluded.day_of_month,
                 starts_on = excluded.starts_on,
                 ends_on = excluded.ends_on,
                 max_occurrences = excluded.max_occurrences,
                 next_due_on = excluded.next_due_on,
                 updated_at = datetime('now', 'subsec')
             RETURNING {RECURRENCE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(task_id)
        .bind(data.frequency)
        .bind(data.interval)
        .bind(Json(&days))
        .bind(data.day_of_month)
        .bind(data.starts_on)
        .bind(data.ends_on)
        .bind(data.max_occurrences)
        .bind(next_due_on)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_task<'e, E>(
        executor: E,
        task_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, TaskRecurrence>(&format!(
            "SELECT {RECURRENCE_COLUMNS} FROM task_recurrences WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete_for_task(pool: &SqlitePool, task_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_recurrences WHERE task_id = $1")
            .bind(task_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Hand the rule over to the next occurrence.
    pub async fn advance<'e, E>(
        executor: E,
        id: Uuid,
        new_task_id: Uuid,
        next_due_on: Option<NaiveDate>,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, TaskRecurrence>(&format!(
            "UPDATE task_recurrences
             SET task_id = $2,
                 occurrences_count = occurrences_count + 1,
                 next_due_on = $3,
                 updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {RECURRENCE_COLUMNS}"
        ))
        .bind(id)
        .bind(new_task_id)
        .bind(next_due_on)
        .fetch_one(executor)
        .await
    }

    /// Record that the series is exhausted: no further occurrence is scheduled.
    pub async fn finish<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE task_recurrences
             SET next_due_on = NULL, updated_at = datetime('now', 'subsec')
             WHERE id = $1",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_round_trips_through_chrono() {
        for day in [
            Weekday::Monday,
            Weekday::Wednesday,
            Weekday::Sunday,
        ] {
            assert_eq!(Weekday::from(day.to_chrono()), day);
        }
    }

    #[test]
    fn weekday_serializes_lowercase() {
        let json = serde_json::to_string(&vec![Weekday::Monday, Weekday::Friday]).unwrap();
        assert_eq!(json, r#"["monday","friday"]"#);
    }
}
