use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use chrono_tz::Tz;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::availability::{AbsoluteTimeRange, BusyInterval};
use crate::errors::{CompanionError, CompanionResult};
use crate::events::CalendarEvent;
use crate::gateway::{convert_google_events, CalendarGateway, FreeBusyReply, GoogleEventsResponse};
use crate::http_utils::{build_http_client, check_gateway_response, parse_json_response, transport_error};

const GOOGLE_SERVICE: &str = "Google Calendar";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    time_zone: &'a str,
    items: Vec<FreeBusyRequestItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyRequestItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    domain: Option<String>,
    reason: Option<String>,
}

/// Gateway that talks to the Google Calendar v3 REST API directly
pub struct GoogleCalendarGateway {
    api_base: String,
    calendar_id: String,
    zone: Tz,
    http_client: reqwest::Client,
}

impl GoogleCalendarGateway {
    pub fn new(api_base: &str, calendar_id: &str, zone: Tz, timeout: Duration) -> CompanionResult<Self> {
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            calendar_id: calendar_id.to_string(),
            zone,
            http_client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarGateway {
    fn name(&self) -> &str {
        GOOGLE_SERVICE
    }

    /// Fetch events from now on using the REST API directly
    async fn fetch_events(&self, authorization: &str) -> CompanionResult<Vec<CalendarEvent>> {
        let url = format!(
            "{}/calendar/v3/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&self.calendar_id)
        );
        debug!("Fetching events from calendar: {}", self.calendar_id);

        let response = self
            .http_client
            .get(&url)
            .header(AUTHORIZATION, authorization)
            .query(&[
                ("timeMin", Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("maxResults", "250".to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(GOOGLE_SERVICE, e))?;

        let response = check_gateway_response(response, GOOGLE_SERVICE).await?;
        let events_response: GoogleEventsResponse =
            parse_json_response(response, GOOGLE_SERVICE, "Google Calendar events response").await?;

        let events = convert_google_events(events_response, GOOGLE_SERVICE)?;
        info!("Fetched {} events from calendar {}", events.len(), self.calendar_id);
        Ok(events)
    }

    async fn fetch_free_busy(
        &self,
        range: &AbsoluteTimeRange,
        authorization: &str,
    ) -> CompanionResult<FreeBusyReply> {
        let body = FreeBusyRequest {
            time_min: range.start_rfc3339(),
            time_max: range.end_rfc3339(),
            time_zone: self.zone.name(),
            items: vec![FreeBusyRequestItem { id: &self.calendar_id }],
        };

        let response = self
            .http_client
            .post(format!("{}/calendar/v3/freeBusy", self.api_base))
            .header(AUTHORIZATION, authorization)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(GOOGLE_SERVICE, e))?;

        let response = check_gateway_response(response, GOOGLE_SERVICE).await?;
        let mut free_busy: FreeBusyResponse =
            parse_json_response(response, GOOGLE_SERVICE, "Google free/busy response").await?;

        let calendar = free_busy.calendars.remove(&self.calendar_id).ok_or_else(|| {
            CompanionError::gateway_unavailable(
                GOOGLE_SERVICE,
                format!("free/busy response has no entry for calendar {}", self.calendar_id),
            )
        })?;

        if !calendar.errors.is_empty() {
            let reasons: Vec<String> = calendar
                .errors
                .iter()
                .map(|e| {
                    format!(
                        "{}:{}",
                        e.domain.as_deref().unwrap_or("unknown"),
                        e.reason.as_deref().unwrap_or("unknown")
                    )
                })
                .collect();
            return Err(CompanionError::gateway_unavailable(
                GOOGLE_SERVICE,
                format!("calendar {} reported {}", self.calendar_id, reasons.join(", ")),
            ));
        }

        Ok(FreeBusyReply {
            available: calendar.busy.is_empty(),
            busy: Some(calendar.busy),
        })
    }
}
