use crate::application::event_scanner::{Clock, EventScanner, ScanWindow};
use crate::domain::models::{Rule, ScanResult};
use crate::domain::rules::{first_matching_rule, planned_categories, ApplyMode};
use crate::infrastructure::calendar_host::{CalendarHost, CalendarItem, CalendarSummary};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use std::sync::Arc;

const LOG_SCOPE: &str = "category_applier";

/// Matches event titles against keyword rules and writes the resulting
/// categories back through the host.
pub struct CategoryApplier<H>
where
    H: CalendarHost + ?Sized,
{
    host: Arc<H>,
    scanner: EventScanner<H>,
    log: Arc<CommandLog>,
}

impl<H> CategoryApplier<H>
where
    H: CalendarHost + ?Sized,
{
    pub fn new(host: Arc<H>) -> Self {
        Self {
            scanner: EventScanner::new(Arc::clone(&host)),
            host,
            log: Arc::new(CommandLog::disabled()),
        }
    }

    pub fn with_log(mut self, log: Arc<CommandLog>) -> Self {
        self.scanner = self.scanner.with_log(Arc::clone(&log));
        self.log = log;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.scanner = self.scanner.with_clock(clock);
        self
    }

    pub async fn apply(
        &self,
        rules: &[Rule],
        days_back: u32,
        days_forward: u32,
        mode: ApplyMode,
    ) -> Result<ScanResult, InfraError> {
        let window = self.scanner.window(days_back, days_forward);
        self.apply_in_window(rules, &window, mode).await
    }

    /// One full pass over the writable calendars. Calendars are visited in
    /// host order and events in the order the host returns them.
    pub async fn apply_in_window(
        &self,
        rules: &[Rule],
        window: &ScanWindow,
        mode: ApplyMode,
    ) -> Result<ScanResult, InfraError> {
        let mut result = ScanResult::started_at(self.scanner.now().with_timezone(&Utc));
        self.log.info(
            LOG_SCOPE,
            &format!(
                "{} scan from {} to {} with {} rule(s)",
                mode.as_str(),
                window.start.to_rfc3339(),
                window.end.to_rfc3339(),
                rules.len()
            ),
        );

        for scanned in self.scanner.scan_window(window).await? {
            self.apply_events(rules, &scanned.calendar, &scanned.events, mode, &mut result)
                .await;
        }

        self.log.info(
            LOG_SCOPE,
            &format!(
                "scan complete: {} processed, {} modified",
                result.processed, result.modified
            ),
        );
        Ok(result)
    }

    /// Applies the first matching rule to each event of one calendar. A
    /// rejected modification is logged and the remaining events still run.
    pub async fn apply_events(
        &self,
        rules: &[Rule],
        calendar: &CalendarSummary,
        events: &[CalendarItem],
        mode: ApplyMode,
        result: &mut ScanResult,
    ) {
        for event in events {
            result.record_processed();

            let Some(rule) = first_matching_rule(rules, &event.title) else {
                continue;
            };
            let Some(categories) = planned_categories(event.categories(), &rule.category, mode)
            else {
                continue;
            };

            let mut replacement = event.clone();
            replacement.set_categories(categories);

            match self.host.modify_item(&calendar.id, &replacement, event).await {
                Ok(()) => {
                    result.record_modified(&event.title, &rule.category, &calendar.name);
                    self.log.info(
                        LOG_SCOPE,
                        &format!("tagged \"{}\" with {}", event.title, rule.category),
                    );
                }
                Err(error) => self.log.error(
                    LOG_SCOPE,
                    &format!("error modifying \"{}\": {error}", event.title),
                ),
            }
        }
    }
}
