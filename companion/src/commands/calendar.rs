use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;

use freebusy_companion::config::parse_timezone;
use freebusy_companion::error_recovery::ErrorRecovery;
use freebusy_companion::events::upcoming;
use freebusy_companion::{gateway_from_config, to_absolute_range, AvailabilityEngine, EventTime, TimeSlotQuery};
use super::{Command, CommandContext};

/// Command to list calendar events
pub struct EventsCommand {
    pub callback: String,
    pub upcoming_only: bool,
}

/// Command to check whether a local time slot is free
pub struct CheckCommand {
    pub callback: String,
    pub date: String,
    pub start: String,
    pub end: String,
    pub zone: Option<String>,
}

fn build_engine(context: &CommandContext, zone: Option<&str>) -> Result<AvailabilityEngine> {
    let gateway = gateway_from_config(&context.config).context("Failed to set up calendar gateway")?;
    let mut engine = AvailabilityEngine::from_config(gateway, &context.config)?;
    if let Some(zone) = zone {
        engine = engine.with_zone(parse_timezone(zone)?);
    }
    Ok(engine)
}

fn describe(time: &EventTime, zone: &Tz) -> String {
    match time {
        EventTime::DateTime(instant) => instant.with_timezone(zone).format("%a, %d %b %Y %H:%M").to_string(),
        EventTime::Date(date) => format!("{} (all day)", date.format("%a, %d %b %Y")),
    }
}

#[async_trait]
impl Command for EventsCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let session = context.session_from_callback(&self.callback)?;
        let engine = build_engine(context, None)?;
        let zone = *engine.zone();

        let events = match engine.fetch_events(&session).await {
            Ok(events) => events,
            Err(e) => {
                println!("❌ Could not fetch events: {}", e);
                println!("💡 {}", ErrorRecovery::advice(&e));
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let listed = if self.upcoming_only {
            upcoming(&events, now, &zone)
        } else {
            events
        };

        println!("📅 Events");
        for event in &listed {
            let marker = match event.is_past(now, &zone) {
                Ok(true) => "  (past)",
                Ok(false) => "",
                Err(_) => "  (start unknown in this timezone)",
            };
            println!("  • {} - {}{}", event.title(), describe(&event.start, &zone), marker);
        }

        if listed.is_empty() {
            println!("  No events found.");
        }
        Ok(())
    }
}

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let query = TimeSlotQuery::parse(&self.date, &self.start, &self.end)?;
        let session = context.session_from_callback(&self.callback)?;
        let engine = build_engine(context, self.zone.as_deref())?;

        println!(
            "🔍 Checking {} {}–{} ({})",
            query.date(),
            query.start().format("%H:%M"),
            query.end().format("%H:%M"),
            engine.zone().name()
        );
        if context.debug {
            let range = to_absolute_range(&query, engine.zone())?;
            println!("   UTC {} → {}", range.start_rfc3339(), range.end_rfc3339());
        }

        match engine.check_availability(&query, &session).await {
            Ok(result) if result.is_free => {
                println!("✅ Slot is FREE");
                Ok(())
            }
            Ok(result) => {
                println!("❌ Slot is BUSY");
                for conflict in &result.conflicts {
                    println!(
                        "   busy {} – {}",
                        conflict.start.with_timezone(engine.zone()).format("%H:%M"),
                        conflict.end.with_timezone(engine.zone()).format("%H:%M")
                    );
                }
                Ok(())
            }
            Err(e) => {
                println!("⚠️  Availability unknown: {}", e);
                println!("💡 {}", ErrorRecovery::advice(&e));
                Err(e.into())
            }
        }
    }
}
