use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name given to markers nobody has named yet
pub const PLACEHOLDER_NAME: &str = "sin nombre";

/// Color used when a wire record carries none (the map library's default pin)
pub const FALLBACK_COLOR: &str = "#3fb1ce";

/// Where freshly created markers are dropped
pub const DEFAULT_LAT: f64 = 40.246669;
pub const DEFAULT_LNG: f64 = -4.071470;

/// A named, colored, positioned point shared across replicas.
///
/// The name travels as `nombre` on the wire; `name` is accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,

    #[serde(rename = "nombre", alias = "name", default = "placeholder_name")]
    pub name: String,

    #[serde(default = "fallback_color")]
    pub color: String,

    pub lat: f64,
    pub lng: f64,
}

fn placeholder_name() -> String {
    PLACEHOLDER_NAME.to_string()
}

fn fallback_color() -> String {
    FALLBACK_COLOR.to_string()
}

/// How a replica mints ids for markers it creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// Creation time as RFC 3339 UTC with millisecond precision. Sorts by
    /// creation, but two replicas creating in the same millisecond collide
    /// and the later create silently overwrites the earlier one.
    #[default]
    Timestamp,

    /// Random v4 UUID
    Uuid,
}

impl IdStrategy {
    pub fn generate(&self) -> String {
        match self {
            IdStrategy::Timestamp => Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            IdStrategy::Uuid => Uuid::new_v4().to_string(),
        }
    }
}

impl std::str::FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(IdStrategy::Timestamp),
            "uuid" => Ok(IdStrategy::Uuid),
            other => Err(format!("unknown id strategy `{other}` (expected timestamp|uuid)")),
        }
    }
}

/// Pseudo-random `#rrggbb`
pub fn random_color() -> String {
    format!("#{:06x}", rand::random_range(0..0x00ff_ffffu32))
}

impl Marker {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        lat: f64,
        lng: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            lat,
            lng,
        }
    }

    /// A fresh unnamed marker at the default drop point with a random color
    pub fn spawn(ids: IdStrategy) -> Self {
        Self::new(
            ids.generate(),
            PLACEHOLDER_NAME,
            random_color(),
            DEFAULT_LAT,
            DEFAULT_LNG,
        )
    }

    pub fn with_position(mut self, lat: f64, lng: f64) -> Self {
        self.lat = lat;
        self.lng = lng;
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}
