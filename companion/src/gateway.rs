//! The calendar gateway contract and the backend-proxy implementation.
//!
//! The backend is the service that performed the code exchange; it proxies
//! `/api/calendar/events` and `/api/calendar/freebusy` to Google with the
//! caller's bearer token.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::{AbsoluteTimeRange, BusyInterval};
use crate::config::{Config, GatewayKind};
use crate::errors::{CompanionError, CompanionResult};
use crate::events::{CalendarEvent, EventTime};
use crate::google_calendar::GoogleCalendarGateway;
use crate::http_utils::{build_http_client, check_gateway_response, parse_json_response, transport_error};

/// What a free/busy query returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyReply {
    pub available: bool,
    /// `None` when the gateway only answers with the boolean
    pub busy: Option<Vec<BusyInterval>>,
}

/// Calendar provider as seen by the availability engine
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Upcoming events; `authorization` is the full `Bearer …` header value
    async fn fetch_events(&self, authorization: &str) -> CompanionResult<Vec<CalendarEvent>>;

    async fn fetch_free_busy(
        &self,
        range: &AbsoluteTimeRange,
        authorization: &str,
    ) -> CompanionResult<FreeBusyReply>;
}

/// Build the gateway selected by `gateway.kind`
pub fn gateway_from_config(config: &Config) -> CompanionResult<Arc<dyn CalendarGateway>> {
    let timeout = config.gateway_timeout();
    let gateway: Arc<dyn CalendarGateway> = match config.gateway.kind {
        GatewayKind::Backend => Arc::new(BackendGateway::new(&config.gateway.base_url, timeout)?),
        GatewayKind::Google => Arc::new(GoogleCalendarGateway::new(
            &config.gateway.google_api_base,
            &config.gateway.calendar_id,
            config.get_timezone()?,
            timeout,
        )?),
    };
    info!("Using {} gateway", gateway.name());
    Ok(gateway)
}

#[derive(Debug, Deserialize)]
pub(crate) struct GoogleEventsResponse {
    pub items: Option<Vec<GoogleEvent>>,
    /// The backend answers 200 with an `error` body when Google fails
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct GoogleEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub start: Option<GoogleEventDateTime>,
    pub end: Option<GoogleEventDateTime>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct GoogleEventDateTime {
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackendFreeBusyResponse {
    available: Option<bool>,
    busy_slots: Option<Vec<BusyInterval>>,
    error: Option<serde_json::Value>,
}

impl GoogleEventDateTime {
    fn to_event_time(&self) -> CompanionResult<EventTime> {
        if let Some(datetime_str) = &self.date_time {
            let instant = DateTime::parse_from_rfc3339(datetime_str)
                .map_err(|e| CompanionError::Parsing {
                    format: "event dateTime".to_string(),
                    message: format!("'{}': {}", datetime_str, e),
                })?
                .with_timezone(&Utc);
            Ok(EventTime::DateTime(instant))
        } else if let Some(date_str) = &self.date {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                CompanionError::Parsing {
                    format: "event date".to_string(),
                    message: format!("'{}': {}", date_str, e),
                }
            })?;
            Ok(EventTime::Date(date))
        } else {
            Err(CompanionError::Parsing {
                format: "event time".to_string(),
                message: "neither dateTime nor date is set".to_string(),
            })
        }
    }
}

/// Convert the provider's event shape; cancelled and unparsable events are dropped
pub(crate) fn convert_google_events(response: GoogleEventsResponse, service: &str) -> CompanionResult<Vec<CalendarEvent>> {
    if let Some(error) = response.error {
        return Err(CompanionError::gateway_unavailable(
            service,
            format!("failed to fetch events: {}", error),
        ));
    }

    let mut converted_events = Vec::new();
    for gcal_event in response.items.unwrap_or_default() {
        if gcal_event.status.as_deref() == Some("cancelled") {
            continue;
        }
        match convert_google_event(gcal_event) {
            Ok(event) => converted_events.push(event),
            Err(e) => warn!("Skipping event from {}: {}", service, e),
        }
    }
    Ok(converted_events)
}

fn convert_google_event(gcal_event: GoogleEvent) -> CompanionResult<CalendarEvent> {
    let start = gcal_event
        .start
        .as_ref()
        .ok_or_else(|| CompanionError::Parsing {
            format: "event".to_string(),
            message: "event has no start time".to_string(),
        })?
        .to_event_time()?;

    // An event without an end is treated as ending when it starts
    let end = match &gcal_event.end {
        Some(end) => end.to_event_time()?,
        None => start,
    };

    Ok(CalendarEvent {
        id: gcal_event.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        summary: gcal_event.summary,
        start,
        end,
    })
}

/// Gateway backed by the code-exchange backend's proxy endpoints
pub struct BackendGateway {
    base_url: String,
    http_client: reqwest::Client,
}

const BACKEND_SERVICE: &str = "calendar backend";

impl BackendGateway {
    pub fn new(base_url: &str, timeout: Duration) -> CompanionResult<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl CalendarGateway for BackendGateway {
    fn name(&self) -> &str {
        BACKEND_SERVICE
    }

    async fn fetch_events(&self, authorization: &str) -> CompanionResult<Vec<CalendarEvent>> {
        let url = format!("{}/api/calendar/events", self.base_url);
        debug!("Fetching events from {}", url);

        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| transport_error(BACKEND_SERVICE, e))?;

        let response = check_gateway_response(response, BACKEND_SERVICE).await?;
        let events: GoogleEventsResponse =
            parse_json_response(response, BACKEND_SERVICE, "events response").await?;
        convert_google_events(events, BACKEND_SERVICE)
    }

    async fn fetch_free_busy(
        &self,
        range: &AbsoluteTimeRange,
        authorization: &str,
    ) -> CompanionResult<FreeBusyReply> {
        let url = format!("{}/api/calendar/freebusy", self.base_url);
        debug!("Querying free/busy at {}", url);

        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, authorization)
            .query(&[("start", range.start_rfc3339()), ("end", range.end_rfc3339())])
            .send()
            .await
            .map_err(|e| transport_error(BACKEND_SERVICE, e))?;

        let response = check_gateway_response(response, BACKEND_SERVICE).await?;
        let body: BackendFreeBusyResponse =
            parse_json_response(response, BACKEND_SERVICE, "free/busy response").await?;

        if let Some(error) = body.error {
            return Err(CompanionError::gateway_unavailable(
                BACKEND_SERVICE,
                format!("free/busy failed: {}", error),
            ));
        }

        let available = body.available.ok_or_else(|| {
            CompanionError::gateway_unavailable(BACKEND_SERVICE, "free/busy response has no 'available' field")
        })?;

        Ok(FreeBusyReply {
            available,
            busy: body.busy_slots,
        })
    }
}
