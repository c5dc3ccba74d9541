use std::time::SystemTime;

use time::{OffsetDateTime, PrimitiveDateTime};

/// Packs a datetime into the FAT-style `(date, time)` bit fields stored
/// in a cabinet file entry.
///
/// The CAB file format only supports datetimes with years from 1980 to
/// 2107 (inclusive), with a resolution of two seconds.  Datetimes outside
/// this range/resolution are clamped/rounded to the nearest legal value.
pub fn datetime_to_bits(mut datetime: PrimitiveDateTime) -> (u16, u16) {
    // Clamp to legal range:
    if datetime.year() < 1980 {
        return (0x21, 0); // 1980-01-01 00:00:00
    } else if datetime.year() > 2107 {
        return (0xff9f, 0xbf7d); // 2107-12-31 23:59:59
    }

    // Round to nearest two seconds:
    if datetime.second() % 2 != 0 {
        datetime += time::Duration::seconds(1);
    }

    let year = datetime.year() as u16;
    let month = datetime.month() as u16;
    let day = datetime.day() as u16;
    let date = ((year - 1980) << 9) | (month << 5) | day;
    let hour = datetime.hour() as u16;
    let minute = datetime.minute() as u16;
    let second = datetime.second() as u16;
    let time = (hour << 11) | (minute << 5) | (second / 2);
    (date, time)
}

/// Converts a source file's modification time into FAT date/time bits.
/// The conversion is done in UTC; a missing mtime falls back to the
/// current time, matching how a freshly built entry is stamped.
pub fn mtime_to_bits(mtime: Option<SystemTime>) -> (u16, u16) {
    let odt = match mtime {
        Some(st) => OffsetDateTime::from(st),
        None => OffsetDateTime::now_utc(),
    };
    datetime_to_bits(PrimitiveDateTime::new(odt.date(), odt.time()))
}
