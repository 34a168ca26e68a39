use chrono::{DateTime, Utc};

use skyrelay_types::{BatchVersion, PositionSource, StateSample};

use crate::versioned::VersionedField;

/// Everything the relay tracks about one aircraft.
///
/// Cloning copies every field by value, which is what the store relies on to
/// hand out snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftRecord {
    icao24: String,
    last_seen: DateTime<Utc>,
    version: BatchVersion,

    pub callsign: VersionedField<Option<String>>,
    pub origin_country: VersionedField<Option<String>>,
    pub last_position_time: VersionedField<Option<DateTime<Utc>>>,
    pub last_message_time: VersionedField<Option<DateTime<Utc>>>,
    pub latitude: VersionedField<Option<f64>>,
    pub longitude: VersionedField<Option<f64>>,
    pub altitude_feet: VersionedField<Option<f32>>,
    pub on_ground: VersionedField<Option<bool>>,
    pub ground_speed_knots: VersionedField<Option<f32>>,
    pub track: VersionedField<Option<f32>>,
    pub vertical_rate_fpm: VersionedField<Option<f32>>,
    pub squawk: VersionedField<Option<String>>,
    pub special_purpose: VersionedField<Option<bool>>,
    pub position_source: VersionedField<Option<PositionSource>>,
}

impl AircraftRecord {
    /// `icao24` must already be normalised.
    pub fn new(icao24: String) -> Self {
        AircraftRecord {
            icao24,
            last_seen: Utc::now(),
            version: 0,
            callsign: VersionedField::default(),
            origin_country: VersionedField::default(),
            last_position_time: VersionedField::default(),
            last_message_time: VersionedField::default(),
            latitude: VersionedField::default(),
            longitude: VersionedField::default(),
            altitude_feet: VersionedField::default(),
            on_ground: VersionedField::default(),
            ground_speed_knots: VersionedField::default(),
            track: VersionedField::default(),
            vertical_rate_fpm: VersionedField::default(),
            squawk: VersionedField::default(),
            special_purpose: VersionedField::default(),
            position_source: VersionedField::default(),
        }
    }

    pub fn icao24(&self) -> &str {
        &self.icao24
    }

    /// Wall-clock time of the last batch that contained this aircraft.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Highest version of any field ever applied to this record.
    pub fn version(&self) -> BatchVersion {
        self.version
    }

    /// Copy every attribute of `sample` into the record at `version`.
    pub fn apply_sample(&mut self, sample: &StateSample, version: BatchVersion, now: DateTime<Utc>) {
        self.last_seen = now;

        let applied = [
            self.callsign.update(sample.callsign.clone(), version),
            self.origin_country.update(sample.origin_country.clone(), version),
            self.last_position_time.update(sample.last_position_time, version),
            self.last_message_time.update(sample.last_message_time, version),
            self.latitude.update(sample.latitude, version),
            self.longitude.update(sample.longitude, version),
            self.altitude_feet.update(sample.altitude_feet, version),
            self.on_ground.update(sample.on_ground, version),
            self.ground_speed_knots.update(sample.ground_speed_knots, version),
            self.track.update(sample.track, version),
            self.vertical_rate_fpm.update(sample.vertical_rate_fpm, version),
            self.squawk.update(sample.squawk.clone(), version),
            self.special_purpose.update(sample.special_purpose, version),
            self.position_source.update(sample.position_source, version),
        ];

        self.version = applied.into_iter().fold(self.version, u64::max);
    }
}
