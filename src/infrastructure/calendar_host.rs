use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Event,
    Todo,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Todo => "todo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "event" => Some(Self::Event),
            "todo" | "task" => Some(Self::Todo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSummary {
    pub id: String,
    pub name: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub kind: ItemKind,
    pub expand_occurrences: bool,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    /// `None` returns every matching item.
    pub limit: Option<usize>,
}

impl ItemQuery {
    /// Events (recurrences expanded) overlapping the inclusive range, no limit.
    pub fn events_between(range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> Self {
        Self {
            kind: ItemKind::Event,
            expand_occurrences: true,
            range_start,
            range_end,
            limit: None,
        }
    }

    pub fn includes(&self, item: &CalendarItem) -> bool {
        item.kind == self.kind && item.start_at <= self.range_end && item.end_at >= self.range_start
    }
}

/// An item as retrieved from the host. Retrieved items are never changed in
/// place: callers clone, edit the clone and submit it through
/// [`CalendarHost::modify_item`] together with the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub categories: Vec<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub recurrence_id: Option<DateTime<Utc>>,
}

impl CalendarItem {
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = categories;
    }

    pub fn is_same_item(&self, other: &CalendarItem) -> bool {
        self.id == other.id && self.recurrence_id == other.recurrence_id
    }
}

#[async_trait]
pub trait CalendarHost: Send + Sync {
    /// All calendars in host order. An error here means the calendar
    /// manager itself is unavailable.
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError>;

    async fn get_items(
        &self,
        calendar_id: &str,
        query: &ItemQuery,
    ) -> Result<Vec<CalendarItem>, InfraError>;

    async fn modify_item(
        &self,
        calendar_id: &str,
        new_item: &CalendarItem,
        old_item: &CalendarItem,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
struct StoredCalendar {
    summary: CalendarSummary,
    items: Vec<CalendarItem>,
}

/// Host kept entirely in memory, with switches for injecting failures.
#[derive(Debug, Default)]
pub struct InMemoryCalendarHost {
    calendars: Mutex<Vec<StoredCalendar>>,
    unavailable: Mutex<bool>,
    failing_calendars: Mutex<HashSet<String>>,
    failing_items: Mutex<HashSet<String>>,
    get_items_calls: AtomicUsize,
    modify_calls: AtomicUsize,
}

impl InMemoryCalendarHost {
    pub fn add_calendar(&self, id: &str, name: &str, read_only: bool) -> Result<(), InfraError> {
        let mut calendars = self.lock_calendars()?;
        calendars.push(StoredCalendar {
            summary: CalendarSummary {
                id: id.to_string(),
                name: name.to_string(),
                read_only,
            },
            items: Vec::new(),
        });
        Ok(())
    }

    pub fn add_item(&self, calendar_id: &str, item: CalendarItem) -> Result<(), InfraError> {
        let mut calendars = self.lock_calendars()?;
        let calendar = calendars
            .iter_mut()
            .find(|calendar| calendar.summary.id == calendar_id)
            .ok_or_else(|| InfraError::Host(format!("calendar not found: {calendar_id}")))?;
        calendar.items.push(item);
        Ok(())
    }

    pub fn item(&self, calendar_id: &str, item_id: &str) -> Result<Option<CalendarItem>, InfraError> {
        let calendars = self.lock_calendars()?;
        Ok(calendars
            .iter()
            .find(|calendar| calendar.summary.id == calendar_id)
            .and_then(|calendar| calendar.items.iter().find(|item| item.id == item_id))
            .cloned())
    }

    pub fn set_unavailable(&self, unavailable: bool) -> Result<(), InfraError> {
        *self
            .unavailable
            .lock()
            .map_err(|error| InfraError::Host(format!("host lock poisoned: {error}")))? = unavailable;
        Ok(())
    }

    pub fn fail_calendar(&self, calendar_id: &str) -> Result<(), InfraError> {
        self.failing_calendars
            .lock()
            .map_err(|error| InfraError::Host(format!("host lock poisoned: {error}")))?
            .insert(calendar_id.to_string());
        Ok(())
    }

    pub fn fail_item(&self, item_id: &str) -> Result<(), InfraError> {
        self.failing_items
            .lock()
            .map_err(|error| InfraError::Host(format!("host lock poisoned: {error}")))?
            .insert(item_id.to_string());
        Ok(())
    }

    pub fn get_items_calls(&self) -> usize {
        self.get_items_calls.load(Ordering::SeqCst)
    }

    pub fn modify_calls(&self) -> usize {
        self.modify_calls.load(Ordering::SeqCst)
    }

    fn lock_calendars(&self) -> Result<std::sync::MutexGuard<'_, Vec<StoredCalendar>>, InfraError> {
        self.calendars
            .lock()
            .map_err(|error| InfraError::Host(format!("host lock poisoned: {error}")))
    }

    fn is_failing(set: &Mutex<HashSet<String>>, key: &str) -> Result<bool, InfraError> {
        Ok(set
            .lock()
            .map_err(|error| InfraError::Host(format!("host lock poisoned: {error}")))?
            .contains(key))
    }
}

#[async_trait]
impl CalendarHost for InMemoryCalendarHost {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError> {
        let unavailable = *self
            .unavailable
            .lock()
            .map_err(|error| InfraError::Host(format!("host lock poisoned: {error}")))?;
        if unavailable {
            return Err(InfraError::Host("calendar manager unavailable".to_string()));
        }
        let calendars = self.lock_calendars()?;
        Ok(calendars.iter().map(|calendar| calendar.summary.clone()).collect())
    }

    async fn get_items(
        &self,
        calendar_id: &str,
        query: &ItemQuery,
    ) -> Result<Vec<CalendarItem>, InfraError> {
        self.get_items_calls.fetch_add(1, Ordering::SeqCst);
        if Self::is_failing(&self.failing_calendars, calendar_id)? {
            return Err(InfraError::Host(format!("calendar {calendar_id} is unreachable")));
        }
        let calendars = self.lock_calendars()?;
        let calendar = calendars
            .iter()
            .find(|calendar| calendar.summary.id == calendar_id)
            .ok_or_else(|| InfraError::Host(format!("calendar not found: {calendar_id}")))?;
        let matching = calendar.items.iter().filter(|item| query.includes(item)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn modify_item(
        &self,
        calendar_id: &str,
        new_item: &CalendarItem,
        old_item: &CalendarItem,
    ) -> Result<(), InfraError> {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);
        if Self::is_failing(&self.failing_items, &old_item.id)? {
            return Err(InfraError::Host(format!("item {} rejected the change", old_item.id)));
        }
        let mut calendars = self.lock_calendars()?;
        let calendar = calendars
            .iter_mut()
            .find(|calendar| calendar.summary.id == calendar_id)
            .ok_or_else(|| InfraError::Host(format!("calendar not found: {calendar_id}")))?;
        if calendar.summary.read_only {
            return Err(InfraError::Host(format!("calendar {calendar_id} is read-only")));
        }
        let stored = calendar
            .items
            .iter_mut()
            .find(|item| item.is_same_item(old_item))
            .ok_or_else(|| InfraError::Host(format!("item not found: {}", old_item.id)))?;
        *stored = new_item.clone();
        Ok(())
    }
}
