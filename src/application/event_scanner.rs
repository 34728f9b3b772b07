use crate::infrastructure::calendar_host::{CalendarHost, CalendarItem, CalendarSummary, ItemQuery};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Days, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

const LOG_SCOPE: &str = "event_scanner";

pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Inclusive time range of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScanWindow {
    /// From local midnight `days_back` days ago to the last millisecond of
    /// the local day `days_forward` days ahead.
    pub fn around<Tz: TimeZone>(now: &DateTime<Tz>, days_back: u32, days_forward: u32) -> Self {
        let timezone = now.timezone();
        let today = now.date_naive();
        let first_day = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);
        let day_after_last = today
            .checked_add_days(Days::new(u64::from(days_forward) + 1))
            .unwrap_or(NaiveDate::MAX);

        let start = resolve_local(&timezone, first_day.and_time(NaiveTime::MIN));
        let end = resolve_local(&timezone, day_after_last.and_time(NaiveTime::MIN))
            - Duration::milliseconds(1);
        Self { start, end }
    }
}

fn resolve_local<Tz: TimeZone>(timezone: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match timezone.from_local_datetime(&local).earliest() {
        Some(value) => value.with_timezone(&Utc),
        // Local midnight skipped by a DST jump; the UTC reading is close enough.
        None => Utc.from_utc_datetime(&local),
    }
}

#[derive(Debug, Clone)]
pub struct ScannedCalendar {
    pub calendar: CalendarSummary,
    pub events: Vec<CalendarItem>,
}

/// Reads events of the writable calendars for a scan window.
pub struct EventScanner<H>
where
    H: CalendarHost + ?Sized,
{
    host: Arc<H>,
    log: Arc<CommandLog>,
    clock: Clock,
}

impl<H> EventScanner<H>
where
    H: CalendarHost + ?Sized,
{
    pub fn new(host: Arc<H>) -> Self {
        Self {
            host,
            log: Arc::new(CommandLog::disabled()),
            clock: Arc::new(Local::now),
        }
    }

    pub fn with_log(mut self, log: Arc<CommandLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Local> {
        (self.clock)()
    }

    pub fn window(&self, days_back: u32, days_forward: u32) -> ScanWindow {
        ScanWindow::around(&self.now(), days_back, days_forward)
    }

    /// Calendars that accept modifications, in host order. Failing to list
    /// calendars at all is returned to the caller.
    pub async fn writable_calendars(&self) -> Result<Vec<CalendarSummary>, InfraError> {
        let calendars = self.host.list_calendars().await?;
        self.log
            .info(LOG_SCOPE, &format!("found {} calendar(s)", calendars.len()));

        Ok(calendars
            .into_iter()
            .filter(|calendar| {
                if calendar.read_only {
                    self.log
                        .info(LOG_SCOPE, &format!("skipping read-only: {}", calendar.name));
                }
                !calendar.read_only
            })
            .collect())
    }

    pub async fn calendar_events(
        &self,
        calendar: &CalendarSummary,
        window: &ScanWindow,
    ) -> Result<Vec<CalendarItem>, InfraError> {
        let query = ItemQuery::events_between(window.start, window.end);
        let events = self.host.get_items(&calendar.id, &query).await?;
        self.log.info(
            LOG_SCOPE,
            &format!("{}: {} events found", calendar.name, events.len()),
        );
        Ok(events)
    }

    /// Events of every writable calendar in the window. A calendar that
    /// fails to answer is logged and left out.
    pub async fn scan_window(&self, window: &ScanWindow) -> Result<Vec<ScannedCalendar>, InfraError> {
        let mut scanned = Vec::new();

        for calendar in self.writable_calendars().await? {
            match self.calendar_events(&calendar, window).await {
                Ok(events) => scanned.push(ScannedCalendar { calendar, events }),
                Err(error) => self.log.error(
                    LOG_SCOPE,
                    &format!("error with calendar {}: {error}", calendar.name),
                ),
            }
        }

        Ok(scanned)
    }
}
