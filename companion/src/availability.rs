//! Free/busy determination for a local time window.
//!
//! A [`TimeSlotQuery`] is entered in the user's zone, normalized into an
//! [`AbsoluteTimeRange`] in UTC, sent to the [`CalendarGateway`], and the
//! returned busy intervals are classified with half-open overlap semantics.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error_recovery::ErrorRecovery;
use crate::errors::{CompanionError, CompanionResult};
use crate::events::CalendarEvent;
use crate::gateway::{CalendarGateway, FreeBusyReply};
use crate::session::TokenSession;

/// A window on one calendar date, in the user's local zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlotQuery {
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
}

/// UTC instants with `start < end`, the only shape sent to a gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbsoluteTimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResult {
    pub is_free: bool,
    /// Conflicting intervals in the order the gateway returned them
    pub conflicts: Vec<BusyInterval>,
}

impl TimeSlotQuery {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> CompanionResult<Self> {
        if end <= start {
            return Err(CompanionError::invalid_range(format!(
                "end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { date, start, end })
    }

    /// Parse form input: `YYYY-MM-DD` and `HH:MM` (seconds optional)
    pub fn parse(date: &str, start: &str, end: &str) -> CompanionResult<Self> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
            CompanionError::Parsing {
                format: "date".to_string(),
                message: format!("'{}': {}", date, e),
            }
        })?;
        Self::new(date, parse_time_of_day(start)?, parse_time_of_day(end)?)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

fn parse_time_of_day(value: &str) -> CompanionResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| CompanionError::Parsing {
            format: "time".to_string(),
            message: format!("'{}': {}", value, e),
        })
}

impl AbsoluteTimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CompanionResult<Self> {
        if end <= start {
            return Err(CompanionError::invalid_range(format!(
                "end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Wire form of the start, e.g. `2024-05-01T09:00:00Z`
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl BusyInterval {
    /// Half-open overlap: touching endpoints do not conflict
    pub fn overlaps(&self, range: &AbsoluteTimeRange) -> bool {
        self.start < range.end && self.end > range.start
    }
}

impl AvailabilityResult {
    pub fn free() -> Self {
        Self {
            is_free: true,
            conflicts: Vec::new(),
        }
    }
}

/// Resolve a local wall-clock time in `zone` to a single UTC instant.
///
/// Times inside a DST fold (two candidates) or gap (none) are rejected
/// rather than guessed.
pub fn localize(date: NaiveDate, time: NaiveTime, zone: &Tz) -> CompanionResult<DateTime<Utc>> {
    let local = date.and_time(time);
    match zone.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(instant.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, _) | LocalResult::None => Err(CompanionError::AmbiguousLocalTime {
            local: local.format("%Y-%m-%dT%H:%M:%S").to_string(),
            zone: zone.name().to_string(),
        }),
    }
}

pub fn to_absolute_range(query: &TimeSlotQuery, zone: &Tz) -> CompanionResult<AbsoluteTimeRange> {
    let start = localize(query.date, query.start, zone)?;
    let end = localize(query.date, query.end, zone)?;
    AbsoluteTimeRange::new(start, end)
}

pub fn classify(range: &AbsoluteTimeRange, busy: &[BusyInterval]) -> AvailabilityResult {
    let conflicts: Vec<BusyInterval> = busy.iter().filter(|b| b.overlaps(range)).copied().collect();
    AvailabilityResult {
        is_free: conflicts.is_empty(),
        conflicts,
    }
}

/// Orchestrates availability checks against a calendar gateway
pub struct AvailabilityEngine {
    gateway: Arc<dyn CalendarGateway>,
    zone: Tz,
    timeout: Duration,
    retry_backoff: Duration,
    issued: AtomicU64,
    delivered: Mutex<u64>,
}

impl AvailabilityEngine {
    pub fn new(gateway: Arc<dyn CalendarGateway>, zone: Tz) -> Self {
        Self {
            gateway,
            zone,
            timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(250),
            issued: AtomicU64::new(0),
            delivered: Mutex::new(0),
        }
    }

    pub fn from_config(gateway: Arc<dyn CalendarGateway>, config: &Config) -> CompanionResult<Self> {
        Ok(Self::new(gateway, config.get_timezone()?)
            .with_timeout(config.gateway_timeout())
            .with_retry_backoff(config.retry_backoff()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Interpret queries in `zone` instead of the configured one
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    pub fn zone(&self) -> &Tz {
        &self.zone
    }

    pub async fn check_availability(
        &self,
        query: &TimeSlotQuery,
        session: &TokenSession,
    ) -> CompanionResult<AvailabilityResult> {
        let range = to_absolute_range(query, &self.zone)?;
        self.ensure_live(session)?;

        let authorization = session.authorization_header();
        debug!(
            "Checking availability from {} to {}",
            range.start_rfc3339(),
            range.end_rfc3339()
        );

        let reply = ErrorRecovery::retry_once(
            || self.fetch_free_busy_once(&range, &authorization),
            self.retry_backoff,
            "free/busy query",
        )
        .await?;

        let result = match reply.busy {
            Some(busy) => {
                if let Some(bad) = busy.iter().find(|interval| interval.end <= interval.start) {
                    warn!("Rejecting busy interval {} -> {}", bad.start, bad.end);
                    return Err(CompanionError::gateway_unavailable(
                        self.gateway.name(),
                        "busy interval ends before it starts",
                    ));
                }
                let result = classify(&range, &busy);
                if result.is_free != reply.available {
                    warn!(
                        "Gateway reported available={} but {} of {} busy intervals overlap",
                        reply.available,
                        result.conflicts.len(),
                        busy.len()
                    );
                }
                result
            }
            None => AvailabilityResult {
                is_free: reply.available,
                conflicts: Vec::new(),
            },
        };

        info!(
            "Slot {} is {} ({} conflicts)",
            range.start_rfc3339(),
            if result.is_free { "free" } else { "busy" },
            result.conflicts.len()
        );
        Ok(result)
    }

    /// Like [`check_availability`](Self::check_availability), but returns
    /// `Ok(None)` when a later-issued check has already been delivered.
    pub async fn check_availability_latest(
        &self,
        query: &TimeSlotQuery,
        session: &TokenSession,
    ) -> CompanionResult<Option<AvailabilityResult>> {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.check_availability(query, session).await;

        let mut delivered = self.delivered.lock();
        if *delivered > sequence {
            debug!(
                "Discarding availability result #{} superseded by #{}",
                sequence, *delivered
            );
            return Ok(None);
        }
        *delivered = sequence;
        outcome.map(Some)
    }

    /// Upcoming events for display, fetched with the same timeout and retry
    pub async fn fetch_events(&self, session: &TokenSession) -> CompanionResult<Vec<CalendarEvent>> {
        self.ensure_live(session)?;
        let authorization = session.authorization_header();

        let events = ErrorRecovery::retry_once(
            || self.fetch_events_once(&authorization),
            self.retry_backoff,
            "event listing",
        )
        .await?;

        info!("Fetched {} events from {}", events.len(), self.gateway.name());
        Ok(events)
    }

    async fn fetch_events_once(&self, authorization: &str) -> CompanionResult<Vec<CalendarEvent>> {
        tokio::time::timeout(self.timeout, self.gateway.fetch_events(authorization))
            .await
            .map_err(|_| self.timed_out())?
    }

    async fn fetch_free_busy_once(
        &self,
        range: &AbsoluteTimeRange,
        authorization: &str,
    ) -> CompanionResult<FreeBusyReply> {
        tokio::time::timeout(self.timeout, self.gateway.fetch_free_busy(range, authorization))
            .await
            .map_err(|_| self.timed_out())?
    }

    fn ensure_live(&self, session: &TokenSession) -> CompanionResult<()> {
        if session.is_expired(Utc::now()) {
            return Err(CompanionError::unauthorized(
                self.gateway.name(),
                format!("session expired at {}", session.claims().expires_at),
            ));
        }
        Ok(())
    }

    fn timed_out(&self) -> CompanionError {
        CompanionError::gateway_unavailable(
            self.gateway.name(),
            format!("no response within {:?}", self.timeout),
        )
    }
}
