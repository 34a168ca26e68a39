use chrono::{DateTime, Utc};

/// Monotonic counter bumped once per applied poll batch.
pub type BatchVersion = u64;

const FEET_PER_METRE: f64 = 3.280_839_9;
const KNOTS_PER_METRE_PER_SECOND: f64 = 1.943_844_5;

/// How the upstream receiver network obtained an aircraft's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    AdsB,
    Asterix,
    Mlat,
    Flarm,
    /// Codes the upstream may add later; kept so changes are still versioned.
    Other(i64),
}

impl PositionSource {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => PositionSource::AdsB,
            1 => PositionSource::Asterix,
            2 => PositionSource::Mlat,
            3 => PositionSource::Flarm,
            other => PositionSource::Other(other),
        }
    }
}

/// One decoded upstream row, already converted to the units the
/// downstream protocol uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSample {
    /// ICAO24 hex code. May be empty; such samples never reach the store.
    pub icao24: String,
    pub callsign: Option<String>,
    pub origin_country: Option<String>,
    pub last_position_time: Option<DateTime<Utc>>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_feet: Option<f32>,
    pub on_ground: Option<bool>,
    pub ground_speed_knots: Option<f32>,
    pub track: Option<f32>,
    pub vertical_rate_fpm: Option<f32>,
    pub squawk: Option<String>,
    pub special_purpose: Option<bool>,
    pub position_source: Option<PositionSource>,
}

impl StateSample {
    pub fn new(icao24: impl Into<String>) -> Self {
        StateSample { icao24: icao24.into(), ..Default::default() }
    }
}

/// Canonical form of an aircraft identifier: trimmed, upper case.
/// Returns `None` for blank identifiers.
pub fn normalize_icao24(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}

pub fn metres_to_feet(metres: f64) -> f32 {
    (metres * FEET_PER_METRE) as f32
}

pub fn metres_per_second_to_knots(mps: f64) -> f32 {
    (mps * KNOTS_PER_METRE_PER_SECOND) as f32
}

pub fn metres_per_second_to_feet_per_minute(mps: f64) -> f32 {
    (mps * FEET_PER_METRE * 60.0) as f32
}

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
