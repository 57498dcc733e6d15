//! Current date and time for a city or IANA zone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::{America, Asia, Australia, Europe, Tz};
use log::debug;

use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};

use crate::ToolImplementation;

const DESCRIPTION: &str = "Retrieves the current date and time. \
If no location is provided, uses the server's default timezone. \
Otherwise, accepts a city name (e.g., 'New York', 'London') or IANA timezone ID \
(e.g., 'America/New_York', 'Europe/London'). Do not send States, Provinces, or Countries. \
Supports common cities; falls back to UTC if unrecognized.";

/// Lowercase city names the tool knows without an IANA identifier.
const CITY_ZONES: &[(&str, Tz)] = &[
    ("new york", America::New_York),
    ("los angeles", America::Los_Angeles),
    ("denver", America::Denver),
    ("phoenix", America::Phoenix),
    ("dayton", America::New_York),
    ("houston", America::Chicago),
    ("dallas", America::Chicago),
    ("san antonio", America::Chicago),
    ("san francisco", America::Los_Angeles),
    ("seattle", America::Los_Angeles),
    ("minneapolis", America::Chicago),
    ("washington dc", America::New_York),
    ("detroit", America::Detroit),
    ("boulder", America::Denver),
    ("cleveland", America::New_York),
    ("portland", America::Los_Angeles),
    ("albuquerque", America::Denver),
    ("salt lake city", America::Denver),
    ("sacramento", America::Los_Angeles),
    ("oklahoma city", America::Chicago),
    ("charleston", America::New_York),
    ("new orleans", America::Chicago),
    ("tampa", America::New_York),
    ("austin", America::Chicago),
    ("columbus", America::New_York),
    ("cincinnati", America::New_York),
    ("chicago", America::Chicago),
    ("london", Europe::London),
    ("paris", Europe::Paris),
    ("berlin", Europe::Berlin),
    ("tokyo", Asia::Tokyo),
    ("sydney", Australia::Sydney),
    ("utc", Tz::UTC),
];

/// Resolves a free-text location to a zone: city table, then IANA id, then UTC.
#[must_use]
pub fn resolve_zone(location: &str) -> Tz {
    let normalized = location.trim().to_lowercase();
    if let Some((_, tz)) = CITY_ZONES.iter().find(|(city, _)| *city == normalized) {
        return *tz;
    }

    location.trim().parse::<Tz>().unwrap_or_else(|_| {
        debug!("Unrecognised location '{location}', using UTC");
        Tz::UTC
    })
}

/// The server's own zone, from `TZ` when it names a valid zone.
fn local_zone() -> Tz {
    std::env::var("TZ")
        .ok()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

fn render(now: DateTime<Utc>, tz: Tz) -> String {
    let local = now.with_timezone(&tz);
    format!(
        "{} in {} timezone",
        local.format("%Y-%m-%d %H:%M:%S"),
        tz.name()
    )
}

/// Reports the current date and time in a requested zone. Never fails.
#[derive(Debug)]
pub struct DateTimeTool {
    descriptor: ToolDescriptor,
}

impl Default for DateTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

impl DateTimeTool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::builder()
                .name("get_date_time")
                .description(DESCRIPTION)
                .optional_parameters(vec![ParameterDescriptor::string(
                    "location",
                    "Optional city name or IANA timezone ID for the desired timezone. \
                     Do not send States, Provinces, or Countries.",
                )])
                .build(),
        }
    }
}

#[async_trait]
impl ToolImplementation for DateTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, invocation: &ToolInvocation) -> String {
        let tz = invocation
            .non_blank_str("location")
            .map_or_else(local_zone, resolve_zone);
        render(Utc::now(), tz)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_city_lookup_is_case_insensitive() {
        assert_eq!(resolve_zone("Paris"), Europe::Paris);
        assert_eq!(resolve_zone("  NEW YORK "), America::New_York);
        assert_eq!(resolve_zone("Houston"), America::Chicago);
        assert_eq!(resolve_zone("salt lake city"), America::Denver);
    }

    #[test]
    fn test_iana_identifier_is_accepted() {
        assert_eq!(resolve_zone("Asia/Kolkata"), Asia::Kolkata);
    }

    #[test]
    fn test_unknown_location_falls_back_to_utc() {
        assert_eq!(resolve_zone("Atlantis"), Tz::UTC);
        assert_eq!(resolve_zone("Ohio"), Tz::UTC);
    }

    #[test]
    fn test_render_format() {
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 12, 30, 5).unwrap();
        assert_eq!(
            render(now, Europe::Paris),
            "2024-07-01 14:30:05 in Europe/Paris timezone"
        );
        assert_eq!(render(now, Tz::UTC), "2024-07-01 12:30:05 in UTC timezone");
    }

    #[tokio::test]
    async fn test_execute_with_city() {
        let tool = DateTimeTool::new();
        let invocation = tool.validate(r#"{"location": "Paris"}"#).unwrap();
        let result = tool.execute(&invocation).await;
        assert!(result.ends_with("in Europe/Paris timezone"), "{result}");
    }

    #[tokio::test]
    async fn test_execute_with_unknown_location() {
        let tool = DateTimeTool::new();
        let invocation = tool.validate(r#"{"location": "Gondor"}"#).unwrap();
        assert!(tool.execute(&invocation).await.ends_with("in UTC timezone"));
    }

    #[test]
    fn test_location_is_optional() {
        let tool = DateTimeTool::new();
        let invocation = tool.validate("").unwrap();
        assert!(invocation.get("location").is_none());
    }
}
