//! Server endpoint definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named server clusters a client can connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Endpoint {
    /// Public data cluster (most reliable, no premium data)
    #[default]
    #[serde(rename = "data")]
    Data,
    /// Premium data cluster (requires an authenticated session)
    #[serde(rename = "prodata")]
    ProData,
    /// Widget data cluster
    #[serde(rename = "widgetdata")]
    WidgetData,
    /// Polygon-backed chart cluster
    #[serde(rename = "charts-polygon")]
    ChartsPolygon,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::Data,
        Endpoint::ProData,
        Endpoint::WidgetData,
        Endpoint::ChartsPolygon,
    ];

    /// Identifier used on the command line and in logs
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Data => "data",
            Endpoint::ProData => "prodata",
            Endpoint::WidgetData => "widgetdata",
            Endpoint::ChartsPolygon => "charts-polygon",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "data" => Ok(Endpoint::Data),
            "prodata" => Ok(Endpoint::ProData),
            "widgetdata" => Ok(Endpoint::WidgetData),
            "charts-polygon" | "polygon" => Ok(Endpoint::ChartsPolygon),
            _ => Err(format!("Unknown endpoint: {}", s)),
        }
    }
}
