//! Timezone resolution.

use chrono_tz::Tz;
use tracing::debug;

/// Resolve an IANA timezone name.
///
/// Missing, empty and unknown names all resolve to UTC.
pub fn parse_timezone(name: Option<&str>) -> Tz {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Tz::UTC;
    };
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            debug!(timezone = %name, "Unknown timezone, falling back to UTC");
            Tz::UTC
        }
    }
}
