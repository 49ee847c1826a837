//! Google sign-in and free/busy checks for a single user session.
//!
//! [`authorization`] builds the login URL and captures the redirect tokens,
//! [`session::TokenSession`] carries the signed-in identity, and
//! [`availability::AvailabilityEngine`] answers "is this slot free?" through a
//! [`gateway::CalendarGateway`].

pub mod authorization;
pub mod availability;
pub mod claims;
pub mod config;
pub mod error_recovery;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod google_calendar;
pub mod http_utils;
pub mod session;

pub use authorization::{build_authorization_url, parse_redirect_callback, AuthorizationRequest, TokenSet};
pub use availability::{
    classify, to_absolute_range, AbsoluteTimeRange, AvailabilityEngine, AvailabilityResult, BusyInterval,
    TimeSlotQuery,
};
pub use claims::{decode_claims, IdentityClaims};
pub use config::Config;
pub use errors::{CompanionError, CompanionResult};
pub use events::{CalendarEvent, EventTime};
pub use gateway::{gateway_from_config, BackendGateway, CalendarGateway, FreeBusyReply};
pub use google_calendar::GoogleCalendarGateway;
pub use session::TokenSession;
