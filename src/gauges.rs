//! Gauge list loading.
//!
//! The list of monitored streamflow gauges lives in a JSON5 file that is
//! re-read on every scrape cycle, so gauges can be added or removed without
//! restarting the exporter. A malformed file degrades to an empty list with
//! a logged diagnostic; it never fails the metrics request.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One monitored streamflow gauge.
///
/// `id` is the unique identity of the gauge within the exporter; `abbrev` is
/// the station abbreviation the DWR API is queried with. The display fields
/// fall back in a fixed order: `friendly_name` → `name` → `id`, and
/// `name` → `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeTarget {
    /// Unique gauge identifier.
    pub id: String,

    /// DWR station abbreviation (upstream lookup key).
    pub abbrev: String,

    /// Station/location name.
    #[serde(default)]
    pub name: Option<String>,

    /// Human-friendly display name.
    #[serde(default)]
    pub friendly_name: Option<String>,
}

impl GaugeTarget {
    /// Display name, falling back `friendly_name` → `name` → `id`.
    pub fn friendly_name(&self) -> &str {
        self.friendly_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    /// Location name, falling back `name` → `id`.
    pub fn location_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Load the gauge list from a JSON5 file.
///
/// Any failure (unreadable file, non-list root, entry missing `id` or
/// `abbrev`) yields an empty list and an error log entry. The exposition
/// endpoint stays up and serves a zero-gauge snapshot instead.
pub fn load_gauges<P: AsRef<Path>>(path: P) -> Vec<GaugeTarget> {
    let path = path.as_ref();

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read gauges file");
            return Vec::new();
        }
    };

    parse_gauges(&content).unwrap_or_else(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to parse gauges file");
        Vec::new()
    })
}

/// Parse a gauge list from a JSON5 string.
pub fn parse_gauges(content: &str) -> Result<Vec<GaugeTarget>, json5::Error> {
    let gauges: Vec<GaugeTarget> = json5::from_str(content)?;
    Ok(gauges)
}
