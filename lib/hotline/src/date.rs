//! The 8-byte legacy date format: big-endian year, two zero bytes, then
//! seconds elapsed since the start of that year divided by two, big-endian.
//! The halved-seconds quirk is parsed by every legacy client and must not
//! be rationalized away.

use chrono::{DateTime, Datelike, TimeZone, Utc};

pub fn encode_date(when: DateTime<Utc>) -> [u8; 8] {
    let year = when.year();
    let year_start = Utc.ymd(year, 1, 1).and_hms(0, 0, 0);
    let half_seconds = (when.signed_duration_since(year_start).num_seconds() / 2) as u32;

    let mut bytes = [0u8; 8];
    bytes[..2].copy_from_slice(&(year as u16).to_be_bytes());
    bytes[4..].copy_from_slice(&half_seconds.to_be_bytes());
    bytes
}
