//! CCSDS timecode decoding.
//!
//! Both decoders produce UTC milliseconds since the Unix epoch. The
//! CCSDS recommended epoch is 1958-01-01, 4383 days before 1970-01-01.
//!
//! Reference: CCSDS Time Code Formats (301.0-B).
use chrono::{DateTime, Utc};

use crate::{Error, Result};

/// Days between the CCSDS epoch (1958-01-01) and the Unix epoch.
const EPOCH_DELTA_DAYS: i64 = 4383;
/// Seconds between the CCSDS epoch and the Unix epoch.
const EPOCH_DELTA_SECS: i64 = EPOCH_DELTA_DAYS * 86_400;

/// TAI-to-UTC offset used by the EOS missions' unsegmented timecodes.
const EOS_TAI_UTC_OFFSET_SECS: i64 = 32;

/// Decode a day-segmented (CDS) timecode to UTC milliseconds.
///
/// Layout: 2 bytes of days since the CCSDS epoch, 4 bytes of
/// milliseconds of day, 2 bytes of microseconds of millisecond, all
/// big-endian.
///
/// # Errors
/// [`Error::Truncated`] for fewer than 8 bytes; [`Error::Overflow`] if
/// the arithmetic would overflow.
pub fn decode_cds_timecode(dat: &[u8]) -> Result<i64> {
    if dat.len() < 8 {
        return Err(Error::Truncated {
            actual: dat.len(),
            minimum: 8,
        });
    }
    let days = i64::from(u16::from_be_bytes([dat[0], dat[1]]));
    let millis = i64::from(u32::from_be_bytes([dat[2], dat[3], dat[4], dat[5]]));
    let micros = i64::from(u16::from_be_bytes([dat[6], dat[7]]));

    (days - EPOCH_DELTA_DAYS)
        .checked_mul(86_400_000)
        .and_then(|ms| ms.checked_add(millis))
        .and_then(|ms| ms.checked_add(micros / 1000))
        .ok_or(Error::Overflow)
}

/// Decode an EOS mission unsegmented (CUC) timecode to UTC
/// milliseconds.
///
/// Layout: 4 bytes of coarse TAI seconds since the CCSDS epoch, 4 bytes
/// of fine time in units of 2^-32 seconds. The fixed mission TAI-to-UTC
/// correction of 32 seconds is applied.
///
/// # Errors
/// [`Error::Truncated`] for fewer than 8 bytes; [`Error::Overflow`] if
/// the arithmetic would overflow.
pub fn decode_eoscuc_timecode(dat: &[u8]) -> Result<i64> {
    if dat.len() < 8 {
        return Err(Error::Truncated {
            actual: dat.len(),
            minimum: 8,
        });
    }
    let coarse = i64::from(u32::from_be_bytes([dat[0], dat[1], dat[2], dat[3]]));
    let fine = u64::from(u32::from_be_bytes([dat[4], dat[5], dat[6], dat[7]]));
    // fine is a binary fraction of one second
    let fine_millis = ((fine * 1000) >> 32) as i64;

    (coarse - EPOCH_DELTA_SECS - EOS_TAI_UTC_OFFSET_SECS)
        .checked_mul(1000)
        .and_then(|ms| ms.checked_add(fine_millis))
        .ok_or(Error::Overflow)
}

/// Decode a CDS timecode to a [`DateTime<Utc>`].
pub fn decode_cds_datetime(dat: &[u8]) -> Result<DateTime<Utc>> {
    let millis = decode_cds_timecode(dat)?;
    DateTime::from_timestamp_millis(millis).ok_or(Error::Overflow)
}

/// Decode an EOS CUC timecode to a [`DateTime<Utc>`].
pub fn decode_eoscuc_datetime(dat: &[u8]) -> Result<DateTime<Utc>> {
    let millis = decode_eoscuc_timecode(dat)?;
    DateTime::from_timestamp_millis(millis).ok_or(Error::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cds_known_value() {
        // 24093 days, 55515648 ms of day, 0 us
        let dat = [0x5e, 0x1d, 0x03, 0x4f, 0x1a, 0x00, 0x00, 0x00];
        let millis = decode_cds_timecode(&dat).unwrap();
        assert_eq!(millis, (24_093 - 4_383) * 86_400_000 + 55_515_648);
        assert_eq!(millis, 1_702_999_515_648);
    }

    #[test]
    fn cds_epoch_is_unix_epoch_minus_offset() {
        // zero days, zero ms: 1958-01-01T00:00:00
        let dat = [0u8; 8];
        let millis = decode_cds_timecode(&dat).unwrap();
        assert_eq!(millis, -4_383 * 86_400_000);

        let dt = decode_cds_datetime(&dat).unwrap();
        assert_eq!(dt.to_rfc3339(), "1958-01-01T00:00:00+00:00");
    }

    #[test]
    fn cds_microseconds_round_down_to_millis() {
        let mut dat = [0u8; 8];
        dat[6..8].copy_from_slice(&2500u16.to_be_bytes());
        let base = decode_cds_timecode(&[0u8; 8]).unwrap();
        assert_eq!(decode_cds_timecode(&dat).unwrap(), base + 2);
    }

    #[test]
    fn cds_short_input_is_truncated() {
        assert!(matches!(
            decode_cds_timecode(&[0u8; 7]),
            Err(Error::Truncated { actual: 7, minimum: 8 })
        ));
    }

    #[test]
    fn eoscuc_known_value() {
        // coarse 0x80000000 s TAI, fine 0x80000000 (half a second)
        let dat = [0x80, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00];
        let millis = decode_eoscuc_timecode(&dat).unwrap();
        assert_eq!(
            millis,
            (2_147_483_648 - 378_691_200 - 32) * 1000 + 500
        );
        assert_eq!(millis, 1_768_792_416_500);
    }

    #[test]
    fn eoscuc_fine_resolution() {
        // one fine count is well below a millisecond
        let mut dat = [0u8; 8];
        dat[..4].copy_from_slice(&0x7000_0000u32.to_be_bytes());
        let base = decode_eoscuc_timecode(&dat).unwrap();
        dat[7] = 1;
        assert_eq!(decode_eoscuc_timecode(&dat).unwrap(), base);
    }

    #[test]
    fn eoscuc_short_input_is_truncated() {
        assert!(matches!(
            decode_eoscuc_timecode(&[0u8; 4]),
            Err(Error::Truncated { actual: 4, minimum: 8 })
        ));
    }
}
