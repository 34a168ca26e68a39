//! BaseStation (SBS-1) message model and text rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionType {
    IdentificationAndCategory = 1,
    SurfacePosition = 2,
    AirbornePosition = 3,
    AirborneVelocity = 4,
    SurveillanceAlt = 5,
    SurveillanceId = 6,
    AirToAir = 7,
    AllCallReply = 8,
}

/// One `MSG` line. Absent fields render as empty columns, which consumers
/// treat as "keep what you had".
#[derive(Debug, Clone, PartialEq)]
pub struct BaseStationMessage {
    pub icao24: String,
    pub transmission_type: TransmissionType,
    pub generated: DateTime<Local>,
    pub logged: DateTime<Local>,
    pub callsign: Option<String>,
    pub altitude: Option<i32>,
    pub ground_speed: Option<f32>,
    pub track: Option<f32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vertical_rate: Option<i32>,
    pub squawk: Option<u16>,
    pub ident_active: Option<bool>,
    pub on_ground: Option<bool>,
}

impl BaseStationMessage {
    pub fn new(icao24: impl Into<String>, now: DateTime<Local>) -> Self {
        BaseStationMessage {
            icao24: icao24.into(),
            transmission_type: TransmissionType::SurfacePosition,
            generated: now,
            logged: now,
            callsign: None,
            altitude: None,
            ground_speed: None,
            track: None,
            latitude: None,
            longitude: None,
            vertical_rate: None,
            squawk: None,
            ident_active: None,
            on_ground: None,
        }
    }

    /// Render the message without a line terminator.
    pub fn to_basestation_string(&self) -> String {
        let mut line = String::with_capacity(128);
        let _ = write!(
            line,
            "MSG,{},1,1,{},1,{},{},{},{}",
            self.transmission_type as u8,
            self.icao24,
            self.generated.format("%Y/%m/%d"),
            self.generated.format("%H:%M:%S%.3f"),
            self.logged.format("%Y/%m/%d"),
            self.logged.format("%H:%M:%S%.3f"),
        );

        push(&mut line, self.callsign.as_deref());
        push(&mut line, self.altitude);
        push(&mut line, self.ground_speed.map(|v| format!("{v:.1}")));
        push(&mut line, self.track.map(|v| format!("{v:.1}")));
        push(&mut line, self.latitude.map(|v| format!("{v:.5}")));
        push(&mut line, self.longitude.map(|v| format!("{v:.5}")));
        push(&mut line, self.vertical_rate);
        push(&mut line, self.squawk.map(|v| format!("{v:04}")));
        // squawk-changed and emergency flags are never derived from the feed
        push::<&str>(&mut line, None);
        push::<&str>(&mut line, None);
        push(&mut line, self.ident_active.map(flag));
        push(&mut line, self.on_ground.map(flag));
        line
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "-1"
    } else {
        "0"
    }
}

fn push<T: std::fmt::Display>(line: &mut String, value: Option<T>) {
    line.push(',');
    if let Some(v) = value {
        let _ = write!(line, "{v}");
    }
}
