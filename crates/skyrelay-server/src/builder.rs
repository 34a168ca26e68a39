use bytes::Bytes;
use chrono::{DateTime, Local};

use skyrelay_state::{AircraftRecord, VersionedField};
use skyrelay_types::BatchVersion;

use crate::basestation::BaseStationMessage;

/// Which field changes a set of messages should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// Only fields that changed in a batch after this version.
    Incremental(BatchVersion),
    /// Every field that currently has a value.
    FullState,
}

impl Watermark {
    fn admits<T>(&self, field: &VersionedField<Option<T>>) -> bool
    where
        Option<T>: PartialEq,
    {
        if field.value().is_none() {
            return false;
        }
        match *self {
            Watermark::Incremental(since) => field.version() > since,
            Watermark::FullState => true,
        }
    }
}

/// One message per record, even when nothing qualifies: an identifier-only
/// line is what keeps a quiet aircraft alive downstream.
pub fn build_messages(
    records: &[AircraftRecord],
    watermark: Watermark,
    now: DateTime<Local>,
) -> Vec<BaseStationMessage> {
    records
        .iter()
        .map(|r| build_message(r, watermark, now))
        .collect()
}

fn build_message(
    record: &AircraftRecord,
    watermark: Watermark,
    now: DateTime<Local>,
) -> BaseStationMessage {
    let mut msg = BaseStationMessage::new(record.icao24(), now);

    if watermark.admits(&record.altitude_feet) {
        msg.altitude = record.altitude_feet.value().map(|v| v.round() as i32);
    }
    if watermark.admits(&record.callsign) {
        msg.callsign = record.callsign.value().clone();
    }
    if watermark.admits(&record.ground_speed_knots) {
        msg.ground_speed = *record.ground_speed_knots.value();
    }
    if watermark.admits(&record.on_ground) {
        msg.on_ground = *record.on_ground.value();
    }
    if watermark.admits(&record.special_purpose) {
        msg.ident_active = *record.special_purpose.value();
    }
    if watermark.admits(&record.squawk) {
        msg.squawk = record.squawk.value().as_deref().and_then(parse_squawk);
    }
    if watermark.admits(&record.track) {
        msg.track = *record.track.value();
    }
    if watermark.admits(&record.vertical_rate_fpm) {
        msg.vertical_rate = record.vertical_rate_fpm.value().map(|v| v.round() as i32);
    }

    // a fix is sent whole or not at all
    if watermark.admits(&record.latitude) || watermark.admits(&record.longitude) {
        msg.latitude = *record.latitude.value();
        msg.longitude = *record.longitude.value();
    }

    msg
}

/// Squawks are at most four decimal digits; anything else is dropped.
pub fn parse_squawk(raw: &str) -> Option<u16> {
    if raw.is_empty() || raw.len() > 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Render messages as CRLF-terminated lines in one payload.
pub fn render_messages(messages: &[BaseStationMessage]) -> Bytes {
    let mut out = String::with_capacity(messages.len() * 128);
    for msg in messages {
        out.push_str(&msg.to_basestation_string());
        out.push_str("\r\n");
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use skyrelay_state::StateStore;
    use skyrelay_types::StateSample;

    use super::*;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2020, 9, 13, 12, 26, 40).unwrap()
    }

    fn full_sample() -> StateSample {
        StateSample {
            callsign: Some("BAW123".into()),
            origin_country: Some("United Kingdom".into()),
            latitude: Some(51.5),
            longitude: Some(-0.1),
            altitude_feet: Some(35000.4),
            on_ground: Some(false),
            ground_speed_knots: Some(450.0),
            track: Some(90.0),
            vertical_rate_fpm: Some(-640.0),
            squawk: Some("1234".into()),
            special_purpose: Some(false),
            ..StateSample::new("ABC123")
        }
    }

    #[tokio::test]
    async fn only_latitude_changed_sends_pair() {
        let store = StateStore::new();
        store
            .apply_batch(&[StateSample {
                latitude: Some(51.5),
                longitude: Some(-0.1),
                on_ground: Some(false),
                ..StateSample::new("ABC123")
            }])
            .await;
        let watermark = store.current_version().await;
        store
            .apply_batch(&[StateSample {
                latitude: Some(51.6),
                longitude: Some(-0.1),
                on_ground: Some(false),
                ..StateSample::new("ABC123")
            }])
            .await;

        let msgs = build_messages(&store.snapshot().await, Watermark::Incremental(watermark), now());
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].icao24, "ABC123");
        assert_eq!(msgs[0].latitude, Some(51.6));
        assert_eq!(msgs[0].longitude, Some(-0.1));
        assert_eq!(msgs[0].on_ground, None);
    }

    #[tokio::test]
    async fn new_record_is_complete_below_its_batch_and_empty_at_it() {
        let store = StateStore::new();
        store.apply_batch(&[]).await;
        store.apply_batch(&[full_sample()]).await;
        let n = store.current_version().await;
        let snap = store.snapshot().await;

        let all = &build_messages(&snap, Watermark::Incremental(n - 1), now())[0];
        assert_eq!(all.callsign.as_deref(), Some("BAW123"));
        assert_eq!(all.altitude, Some(35000));
        assert_eq!(all.ground_speed, Some(450.0));
        assert_eq!(all.track, Some(90.0));
        assert_eq!(all.vertical_rate, Some(-640));
        assert_eq!(all.squawk, Some(1234));
        assert_eq!(all.ident_active, Some(false));
        assert_eq!(all.on_ground, Some(false));
        assert_eq!(all.latitude, Some(51.5));

        let none = &build_messages(&snap, Watermark::Incremental(n), now())[0];
        assert_eq!(*none, BaseStationMessage::new("ABC123", now()));
    }

    #[tokio::test]
    async fn full_state_ignores_versions() {
        let store = StateStore::new();
        store.apply_batch(&[full_sample()]).await;
        for _ in 0..5 {
            store.apply_batch(&[full_sample()]).await;
        }
        let snap = store.snapshot().await;

        let quiet = &build_messages(&snap, Watermark::Incremental(store.current_version().await), now())[0];
        assert!(quiet.callsign.is_none());

        let full = &build_messages(&snap, Watermark::FullState, now())[0];
        assert_eq!(full.callsign.as_deref(), Some("BAW123"));
        assert_eq!(full.latitude, Some(51.5));
        assert_eq!(full.squawk, Some(1234));
    }

    #[tokio::test]
    async fn absent_values_are_never_sent() {
        let store = StateStore::new();
        store.apply_batch(&[full_sample()]).await;
        // callsign disappears: the version moves but there is nothing to send
        store
            .apply_batch(&[StateSample { callsign: None, ..full_sample() }])
            .await;
        let snap = store.snapshot().await;
        assert_eq!(snap[0].callsign.version(), 2);

        let msg = &build_messages(&snap, Watermark::Incremental(1), now())[0];
        assert!(msg.callsign.is_none());
    }

    #[tokio::test]
    async fn oversized_squawk_is_omitted() {
        let store = StateStore::new();
        store
            .apply_batch(&[StateSample { squawk: Some("77777".into()), ..full_sample() }])
            .await;
        let snap = store.snapshot().await;
        assert_eq!(snap[0].squawk.version(), 1);

        let msg = &build_messages(&snap, Watermark::Incremental(0), now())[0];
        assert!(msg.squawk.is_none());
        assert_eq!(msg.callsign.as_deref(), Some("BAW123"));
    }

    #[test]
    fn squawk_parsing() {
        assert_eq!(parse_squawk("7700"), Some(7700));
        assert_eq!(parse_squawk("0012"), Some(12));
        assert_eq!(parse_squawk("77777"), None);
        assert_eq!(parse_squawk(""), None);
        assert_eq!(parse_squawk("12a4"), None);
        assert_eq!(parse_squawk("-12"), None);
        assert_eq!(parse_squawk(" 12"), None);
    }

    #[test]
    fn render_joins_lines_with_crlf() {
        let msgs = vec![
            BaseStationMessage::new("ABC123", now()),
            BaseStationMessage::new("DEF456", now()),
        ];
        let payload = render_messages(&msgs);
        let text = std::str::from_utf8(&payload).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("MSG,2,1,1,ABC123,"));
        assert!(lines[1].starts_with("MSG,2,1,1,DEF456,"));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn render_empty_is_empty() {
        assert!(render_messages(&[]).is_empty());
    }
}
