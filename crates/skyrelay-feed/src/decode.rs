//! Decoding of the OpenSky `states/all` response.
//!
//! Each state vector is a fixed-position JSON array whose elements are only
//! loosely typed (numbers sometimes arrive as strings and vice versa), so
//! every element is coerced to the type the relay expects. A malformed row
//! fails the whole response: the store only ever sees complete batches.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use skyrelay_types::{
    metres_per_second_to_feet_per_minute, metres_per_second_to_knots, metres_to_feet,
    PositionSource, RelayError, StateSample,
};

const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_ORIGIN_COUNTRY: usize = 2;
const IDX_TIME_POSITION: usize = 3;
const IDX_LAST_CONTACT: usize = 4;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_BARO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_TRUE_TRACK: usize = 10;
const IDX_VERTICAL_RATE: usize = 11;
// 12 is the sensor id list and 13 the geometric altitude; neither is relayed.
const IDX_SQUAWK: usize = 14;
const IDX_SPI: usize = 15;
const IDX_POSITION_SOURCE: usize = 16;

/// Minimum number of elements in a state vector row.
pub const STATE_VECTOR_FIELDS: usize = 17;

/// A fully decoded poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Time the upstream generated the response.
    pub time: Option<DateTime<Utc>>,
    pub samples: Vec<StateSample>,
}

#[derive(Deserialize)]
struct StatesResponse {
    time: Option<f64>,
    /// `null` when nothing matches the request.
    states: Option<Vec<Vec<Value>>>,
}

pub fn decode_states(json: &str) -> Result<FeedSnapshot, RelayError> {
    let response: StatesResponse =
        serde_json::from_str(json).map_err(|e| RelayError::Decode(e.to_string()))?;

    let time = match response.time {
        Some(secs) => Some(timestamp(secs as i64).map_err(RelayError::Decode)?),
        None => None,
    };

    let samples = response
        .states
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(row, values)| {
            decode_row(values).map_err(|e| RelayError::Decode(format!("row {row}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeedSnapshot { time, samples })
}

fn decode_row(values: &[Value]) -> Result<StateSample, String> {
    if values.len() < STATE_VECTOR_FIELDS {
        return Err(format!(
            "expected at least {STATE_VECTOR_FIELDS} values, saw {}",
            values.len()
        ));
    }

    let icao24 = to_string(&values[IDX_ICAO24])?
        .map(|s| s.trim().to_ascii_uppercase())
        .unwrap_or_default();
    let callsign = to_string(&values[IDX_CALLSIGN])?
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty());

    Ok(StateSample {
        icao24,
        callsign,
        origin_country: to_string(&values[IDX_ORIGIN_COUNTRY])?,
        last_position_time: to_i64(&values[IDX_TIME_POSITION])?.map(timestamp).transpose()?,
        last_message_time: to_i64(&values[IDX_LAST_CONTACT])?.map(timestamp).transpose()?,
        latitude: to_f64(&values[IDX_LATITUDE])?,
        longitude: to_f64(&values[IDX_LONGITUDE])?,
        altitude_feet: to_f64(&values[IDX_BARO_ALTITUDE])?.map(metres_to_feet),
        on_ground: to_bool(&values[IDX_ON_GROUND])?,
        ground_speed_knots: to_f64(&values[IDX_VELOCITY])?.map(metres_per_second_to_knots),
        track: to_f64(&values[IDX_TRUE_TRACK])?.map(|t| t as f32),
        vertical_rate_fpm: to_f64(&values[IDX_VERTICAL_RATE])?
            .map(metres_per_second_to_feet_per_minute),
        squawk: to_string(&values[IDX_SQUAWK])?,
        special_purpose: to_bool(&values[IDX_SPI])?,
        position_source: to_i64(&values[IDX_POSITION_SOURCE])?.map(PositionSource::from_code),
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, String> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| format!("timestamp {secs} out of range"))
}

fn to_string(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(format!("cannot convert {other} to a string")),
    }
}

fn to_f64(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{n} is not representable as f64")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("cannot convert {s:?} to a number")),
        Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        other => Err(format!("cannot convert {other} to a number")),
    }
}

fn to_i64(value: &Value) -> Result<Option<i64>, String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Some(i)),
            None => Ok(n.as_f64().map(|f| f.round() as i64)),
        },
        other => to_f64(other).map(|f| f.map(|f| f.round() as i64)),
    }
}

fn to_bool(value: &Value) -> Result<Option<bool>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => Ok(Some(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(format!("cannot convert {s:?} to a boolean")),
        },
        other => Err(format!("cannot convert {other} to a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "time": 1600000000,
        "states": [
            ["4ca2d6", "RYR8TX  ", "Ireland", 1599999998, 1599999999, -0.1, 51.5,
             10668.0, false, 231.5, 87.2, -5.08, null, 10900.0, "7700", false, 0],
            ["abc123", null, "United Kingdom", null, 1599999990, null, null,
             null, true, null, null, null, null, null, null, false, 2]
        ]
    }"#;

    #[test]
    fn decodes_rows_and_converts_units() {
        let snap = decode_states(SAMPLE).unwrap();
        assert_eq!(snap.time.unwrap().timestamp(), 1_600_000_000);
        assert_eq!(snap.samples.len(), 2);

        let s = &snap.samples[0];
        assert_eq!(s.icao24, "4CA2D6");
        assert_eq!(s.callsign.as_deref(), Some("RYR8TX"));
        assert_eq!(s.origin_country.as_deref(), Some("Ireland"));
        assert_eq!(s.last_position_time.unwrap().timestamp(), 1_599_999_998);
        assert_eq!(s.latitude, Some(51.5));
        assert_eq!(s.longitude, Some(-0.1));
        assert!((s.altitude_feet.unwrap() - 35_000.0).abs() < 1.0);
        assert!((s.ground_speed_knots.unwrap() - 450.0).abs() < 0.1);
        assert!((s.vertical_rate_fpm.unwrap() + 1000.0).abs() < 0.1);
        assert_eq!(s.on_ground, Some(false));
        assert_eq!(s.squawk.as_deref(), Some("7700"));
        assert_eq!(s.position_source, Some(PositionSource::AdsB));
    }

    #[test]
    fn nulls_become_absent() {
        let snap = decode_states(SAMPLE).unwrap();
        let s = &snap.samples[1];
        assert_eq!(s.icao24, "ABC123");
        assert!(s.callsign.is_none());
        assert!(s.latitude.is_none());
        assert!(s.last_position_time.is_none());
        assert_eq!(s.on_ground, Some(true));
        assert_eq!(s.position_source, Some(PositionSource::Mlat));
    }

    #[test]
    fn loosely_typed_values_are_coerced() {
        let json = r#"{"time": 1, "states": [
            ["abc123", "BAW1", "UK", "100", 101, "-0.5", "51.25", "1000",
             "true", 0, 90, 0, null, null, 7000, 1, "3"]
        ]}"#;
        let s = &decode_states(json).unwrap().samples[0];
        assert_eq!(s.latitude, Some(51.25));
        assert_eq!(s.longitude, Some(-0.5));
        assert_eq!(s.on_ground, Some(true));
        assert_eq!(s.squawk.as_deref(), Some("7000"));
        assert_eq!(s.special_purpose, Some(true));
        assert_eq!(s.position_source, Some(PositionSource::Flarm));
        assert_eq!(s.last_position_time.unwrap().timestamp(), 100);
    }

    #[test]
    fn null_states_is_an_empty_batch() {
        let snap = decode_states(r#"{"time": 5, "states": null}"#).unwrap();
        assert!(snap.samples.is_empty());
    }

    #[test]
    fn short_row_fails_the_whole_response() {
        let json = r#"{"time": 1, "states": [
            ["abc123", "BAW1", "UK", 1, 1, 0, 0, 0, false, 0, 0, 0, null, 0, null, false, 0],
            ["def456", "BAW2", "UK"]
        ]}"#;
        let err = decode_states(json).unwrap_err();
        assert!(matches!(err, RelayError::Decode(ref msg) if msg.contains("row 1")));
    }

    #[test]
    fn unconvertible_value_is_an_error() {
        let json = r#"{"time": 1, "states": [
            ["abc123", "BAW1", "UK", 1, 1, "west", 0, 0, false, 0, 0, 0, null, 0, null, false, 0]
        ]}"#;
        assert!(matches!(decode_states(json), Err(RelayError::Decode(_))));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(decode_states("<html>"), Err(RelayError::Decode(_))));
    }
}
