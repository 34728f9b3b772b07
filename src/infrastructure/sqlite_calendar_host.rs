use crate::infrastructure::calendar_host::{
    CalendarHost, CalendarItem, CalendarSummary, ItemKind, ItemQuery,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Calendar host backed by the workspace database.
///
/// Recurring series are stored as their concrete occurrences, one row per
/// `recurrence_id`. With `expand_occurrences` off only non-occurrence rows
/// are returned.
#[derive(Debug, Clone)]
pub struct SqliteCalendarHost {
    db_path: PathBuf,
}

struct ItemRow {
    id: String,
    kind: String,
    title: String,
    categories: String,
    start_at: String,
    end_at: String,
    recurrence_id: String,
}

impl SqliteCalendarHost {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    pub fn add_calendar(&self, id: &str, name: &str, read_only: bool) -> Result<(), InfraError> {
        let id = non_empty(id, "calendar id")?;
        let name = non_empty(name, "calendar name")?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO calendars (id, name, read_only, position)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), -1) + 1 FROM calendars))
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               read_only = excluded.read_only",
            params![id, name, read_only],
        )?;
        Ok(())
    }

    pub fn add_item(&self, calendar_id: &str, item: &CalendarItem) -> Result<(), InfraError> {
        non_empty(&item.id, "item id")?;
        if item.end_at < item.start_at {
            return Err(InfraError::Validation(
                "item end must not be before its start".to_string(),
            ));
        }
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO calendar_items
               (id, calendar_id, kind, title, categories, start_at, end_at, recurrence_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.id,
                calendar_id,
                item.kind.as_str(),
                item.title,
                serde_json::to_string(&item.categories)?,
                item.start_at.to_rfc3339(),
                item.end_at.to_rfc3339(),
                recurrence_key(item.recurrence_id),
            ],
        )?;
        Ok(())
    }

    fn calendar(&self, connection: &Connection, calendar_id: &str) -> Result<CalendarSummary, InfraError> {
        connection
            .query_row(
                "SELECT id, name, read_only FROM calendars WHERE id = ?1",
                params![calendar_id],
                |row| {
                    Ok(CalendarSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        read_only: row.get(2)?,
                    })
                },
            )
            .map_err(|error| match error {
                rusqlite::Error::QueryReturnedNoRows => {
                    InfraError::Host(format!("calendar not found: {calendar_id}"))
                }
                other => InfraError::from(other),
            })
    }
}

#[async_trait]
impl CalendarHost for SqliteCalendarHost {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError> {
        let connection = self.connect()?;
        let mut statement =
            connection.prepare("SELECT id, name, read_only FROM calendars ORDER BY position, id")?;
        let calendars = statement
            .query_map([], |row| {
                Ok(CalendarSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    read_only: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(calendars)
    }

    async fn get_items(
        &self,
        calendar_id: &str,
        query: &ItemQuery,
    ) -> Result<Vec<CalendarItem>, InfraError> {
        let connection = self.connect()?;
        self.calendar(&connection, calendar_id)?;
        let mut statement = connection.prepare(
            "SELECT id, kind, title, categories, start_at, end_at, recurrence_id
             FROM calendar_items
             WHERE calendar_id = ?1 AND kind = ?2
             ORDER BY start_at, id, recurrence_id",
        )?;
        let rows = statement
            .query_map(params![calendar_id, query.kind.as_str()], |row| {
                Ok(ItemRow {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    title: row.get(2)?,
                    categories: row.get(3)?,
                    start_at: row.get(4)?,
                    end_at: row.get(5)?,
                    recurrence_id: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::new();
        for row in rows {
            let item = decode_item(row)?;
            if !query.expand_occurrences && item.recurrence_id.is_some() {
                continue;
            }
            if !query.includes(&item) {
                continue;
            }
            items.push(item);
            if query.limit.is_some_and(|limit| items.len() >= limit) {
                break;
            }
        }
        Ok(items)
    }

    async fn modify_item(
        &self,
        calendar_id: &str,
        new_item: &CalendarItem,
        old_item: &CalendarItem,
    ) -> Result<(), InfraError> {
        if !new_item.is_same_item(old_item) {
            return Err(InfraError::Host(format!(
                "replacement for {} must keep its identity",
                old_item.id
            )));
        }
        let connection = self.connect()?;
        let calendar = self.calendar(&connection, calendar_id)?;
        if calendar.read_only {
            return Err(InfraError::Host(format!("calendar {} is read-only", calendar.name)));
        }
        let changed = connection.execute(
            "UPDATE calendar_items
             SET title = ?1, categories = ?2, start_at = ?3, end_at = ?4
             WHERE calendar_id = ?5 AND id = ?6 AND recurrence_id = ?7",
            params![
                new_item.title,
                serde_json::to_string(&new_item.categories)?,
                new_item.start_at.to_rfc3339(),
                new_item.end_at.to_rfc3339(),
                calendar_id,
                old_item.id,
                recurrence_key(old_item.recurrence_id),
            ],
        )?;
        if changed == 0 {
            return Err(InfraError::Host(format!("item not found: {}", old_item.id)));
        }
        Ok(())
    }
}

fn decode_item(row: ItemRow) -> Result<CalendarItem, InfraError> {
    let kind = ItemKind::parse(&row.kind)
        .ok_or_else(|| InfraError::Host(format!("unknown item kind '{}' for {}", row.kind, row.id)))?;
    let categories = serde_json::from_str::<Vec<String>>(&row.categories)?;
    let recurrence_id = if row.recurrence_id.is_empty() {
        None
    } else {
        Some(parse_timestamp(&row.recurrence_id, "recurrence_id")?)
    };
    Ok(CalendarItem {
        start_at: parse_timestamp(&row.start_at, "start_at")?,
        end_at: parse_timestamp(&row.end_at, "end_at")?,
        id: row.id,
        kind,
        title: row.title,
        categories,
        recurrence_id,
    })
}

fn parse_timestamp(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::Host(format!("invalid {field_name} '{value}': {error}")))
}

fn recurrence_key(recurrence_id: Option<DateTime<Utc>>) -> String {
    recurrence_id
        .map(|value| value.to_rfc3339())
        .unwrap_or_default()
}

fn non_empty<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InfraError::Validation(format!("{field_name} must not be empty")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use chrono::Duration;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "autotag-host-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("host.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(id: &str, title: &str, start: &str) -> CalendarItem {
        let start_at = at(start);
        CalendarItem {
            id: id.to_string(),
            kind: ItemKind::Event,
            title: title.to_string(),
            categories: Vec::new(),
            start_at,
            end_at: start_at + Duration::minutes(30),
            recurrence_id: None,
        }
    }

    #[tokio::test]
    async fn lists_calendars_in_insertion_order() {
        let database = TempDatabase::new();
        let host = SqliteCalendarHost::new(&database.path);
        host.add_calendar("work", "Firma", false).expect("add work");
        host.add_calendar("holidays", "Feiertage", true).expect("add holidays");

        let calendars = host.list_calendars().await.expect("list calendars");
        assert_eq!(calendars.len(), 2);
        assert_eq!(calendars[0].name, "Firma");
        assert!(calendars[1].read_only);
    }

    #[tokio::test]
    async fn returns_events_inside_window_with_occurrences() {
        let database = TempDatabase::new();
        let host = SqliteCalendarHost::new(&database.path);
        host.add_calendar("work", "Firma", false).expect("add calendar");
        host.add_item("work", &event("a", "Abholung", "2026-03-02T09:00:00Z"))
            .expect("add a");
        host.add_item("work", &event("b", "Later", "2026-06-02T09:00:00Z"))
            .expect("add b");
        let mut occurrence = event("series", "Linth weekly", "2026-03-03T09:00:00Z");
        occurrence.recurrence_id = Some(at("2026-03-03T09:00:00Z"));
        host.add_item("work", &occurrence).expect("add occurrence");
        let mut todo = event("t", "Abholung todo", "2026-03-02T09:00:00Z");
        todo.kind = ItemKind::Todo;
        host.add_item("work", &todo).expect("add todo");

        let query = ItemQuery::events_between(at("2026-03-01T00:00:00Z"), at("2026-03-31T23:59:59Z"));
        let items = host.get_items("work", &query).await.expect("get items");
        let ids = items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "series"]);

        let collapsed = ItemQuery {
            expand_occurrences: false,
            ..query
        };
        let items = host.get_items("work", &collapsed).await.expect("get items");
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn modify_item_persists_categories() {
        let database = TempDatabase::new();
        let host = SqliteCalendarHost::new(&database.path);
        host.add_calendar("work", "Firma", false).expect("add calendar");
        let original = event("a", "Auslieferung Müller 14:00", "2026-03-02T14:00:00Z");
        host.add_item("work", &original).expect("add item");

        let mut replacement = original.clone();
        replacement.set_categories(vec!["Auslieferung".to_string()]);
        host.modify_item("work", &replacement, &original)
            .await
            .expect("modify item");

        let query = ItemQuery::events_between(at("2026-03-02T00:00:00Z"), at("2026-03-02T23:59:59Z"));
        let items = host.get_items("work", &query).await.expect("get items");
        assert_eq!(items[0].categories, vec!["Auslieferung".to_string()]);
    }

    #[tokio::test]
    async fn modify_item_rejects_read_only_calendar() {
        let database = TempDatabase::new();
        let host = SqliteCalendarHost::new(&database.path);
        host.add_calendar("holidays", "Feiertage", true).expect("add calendar");
        let original = event("h", "Ferien", "2026-03-02T00:00:00Z");
        host.add_item("holidays", &original).expect("add item");

        let result = host.modify_item("holidays", &original.clone(), &original).await;
        assert!(matches!(result, Err(InfraError::Host(_))));
    }

    #[tokio::test]
    async fn unknown_calendar_is_a_host_error() {
        let database = TempDatabase::new();
        let host = SqliteCalendarHost::new(&database.path);
        let query = ItemQuery::events_between(at("2026-03-01T00:00:00Z"), at("2026-03-02T00:00:00Z"));
        let result = host.get_items("missing", &query).await;
        assert!(matches!(result, Err(InfraError::Host(_))));
    }
}
