use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

use crate::availability::localize;
use crate::errors::CompanionResult;

/// Start or end of an event: a timed instant or an all-day date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
}

impl EventTime {
    /// All-day dates begin at local midnight in `zone`, resolved like user input
    pub fn instant(&self, zone: &Tz) -> CompanionResult<DateTime<Utc>> {
        match self {
            EventTime::DateTime(instant) => Ok(*instant),
            EventTime::Date(date) => localize(*date, NaiveTime::MIN, zone),
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }
}

impl CalendarEvent {
    pub fn title(&self) -> &str {
        self.summary.as_deref().filter(|s| !s.is_empty()).unwrap_or("(No Title)")
    }

    pub fn is_past(&self, now: DateTime<Utc>, zone: &Tz) -> CompanionResult<bool> {
        Ok(self.start.instant(zone)? < now)
    }
}

/// Events that have not started yet, in their original order.
/// An event whose start cannot be placed in `zone` is kept.
pub fn upcoming(events: &[CalendarEvent], now: DateTime<Utc>, zone: &Tz) -> Vec<CalendarEvent> {
    events
        .iter()
        .filter(|event| match event.is_past(now, zone) {
            Ok(is_past) => !is_past,
            Err(e) => {
                warn!("Keeping event {} with unresolved start: {}", event.id, e);
                true
            }
        })
        .cloned()
        .collect()
}
