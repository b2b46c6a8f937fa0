/*
 * CMOS Real-Time Clock
 *
 * Reads the battery-backed RTC once at boot to obtain the wall-clock epoch.
 *
 * Register protocol:
 * - Indexed access: write the register index to the command port (0x70),
 *   read the value from the data port (0x71).
 * - Status register A bit 7 flags an update in progress; time registers are
 *   unreliable while it is set.
 * - Time-of-day registers hold BCD-encoded second/minute/hour/day/month/year.
 *
 * Reads are debounced: the full register file is snapshotted twice and the
 * six time fields must match between consecutive stable snapshots, otherwise
 * the read restarts. This guards against torn mid-update values.
 *
 * Hardware precondition: a present, responsive RTC. With no such clock the
 * update-in-progress wait spins forever; there is no fallback wall-clock
 * source to proceed with.
 */

use bitflags::bitflags;

use crate::io::PortBus;

const CMOS_ADDRESS: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;

/// Size of the CMOS register file.
const CMOS_REGS: usize = 128;

// Standard RTC time-of-day register indices.
const CMOS_SECOND: usize = 0x00;
const CMOS_MINUTE: usize = 0x02;
const CMOS_HOUR: usize = 0x04;
const CMOS_DAY: usize = 0x07;
const CMOS_MONTH: usize = 0x08;
const CMOS_YEAR: usize = 0x09;
const CMOS_STATUS_A: usize = 0x0A;

/// The fields that must agree between consecutive snapshots.
const TIME_FIELDS: [usize; 6] = [
    CMOS_SECOND,
    CMOS_MINUTE,
    CMOS_HOUR,
    CMOS_DAY,
    CMOS_MONTH,
    CMOS_YEAR,
];

bitflags! {
    /// RTC status register A.
    #[derive(Clone, Copy)]
    struct StatusA: u8 {
        const UPDATE_IN_PROGRESS = 1 << 7;
    }
}

/// Decode one BCD byte: one decimal digit per nibble.
fn from_bcd(raw: u8) -> u64 {
    (u64::from(raw) / 16) * 10 + (u64::from(raw) & 0xF)
}

fn update_in_progress(ports: &mut impl PortBus) -> bool {
    ports.write(CMOS_ADDRESS, CMOS_STATUS_A as u8);
    StatusA::from_bits_truncate(ports.read(CMOS_DATA)).contains(StatusA::UPDATE_IN_PROGRESS)
}

/// Snapshot the entire register file.
fn snapshot(ports: &mut impl PortBus, values: &mut [u8; CMOS_REGS]) {
    for index in 0..CMOS_REGS {
        ports.write(CMOS_ADDRESS, index as u8);
        values[index] = ports.read(CMOS_DATA);
    }
}

fn is_leap_year(year: u64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Seconds contributed by the full years between the Unix epoch and the
/// given two-digit RTC year (offset from 2000), exclusive.
fn secs_of_years(end_year: i64) -> u64 {
    let mut days: u64 = 0;
    let mut year = end_year + 2000;
    while year > 1969 {
        days += 365;
        if is_leap_year(year as u64) {
            days += 1;
        }
        year -= 1;
    }
    days * 86400
}

const DAYS_IN_MONTH: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Seconds contributed by the `months` already elapsed this year. February
/// contributes 29 days in a leap year; `year` is the two-digit RTC year.
fn secs_of_month(months: u64, year: u64) -> u64 {
    let year = year + 2000;
    let mut days: u64 = 0;
    for month in 0..months.min(12) as usize {
        days += DAYS_IN_MONTH[month];
        if month == 1 && is_leap_year(year) {
            days += 1;
        }
    }
    days * 86400
}

/// Read the RTC and return seconds since the Unix epoch.
///
/// Busy-waits out the update-in-progress window, snapshots until two
/// consecutive stable snapshots agree on all six time fields, then decodes
/// BCD and folds the calendar fields down to seconds.
pub fn read_epoch(ports: &mut impl PortBus) -> u64 {
    let mut values = [0u8; CMOS_REGS];
    let mut prior = [0u8; CMOS_REGS];

    while update_in_progress(ports) {}
    snapshot(ports, &mut values);

    loop {
        prior.copy_from_slice(&values);
        while update_in_progress(ports) {}
        snapshot(ports, &mut values);
        if TIME_FIELDS.iter().all(|&field| values[field] == prior[field]) {
            break;
        }
    }

    let year = from_bcd(values[CMOS_YEAR]);
    secs_of_years(year as i64 - 1)
        + secs_of_month(from_bcd(values[CMOS_MONTH]).saturating_sub(1), year)
        + from_bcd(values[CMOS_DAY]).saturating_sub(1) * 86400
        + from_bcd(values[CMOS_HOUR]) * 3600
        + from_bcd(values[CMOS_MINUTE]) * 60
        + from_bcd(values[CMOS_SECOND])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CmosFixture, to_bcd};

    #[test]
    fn test_from_bcd_round_trip() {
        for value in 0..=99u8 {
            assert_eq!(from_bcd(to_bcd(value)), u64::from(value));
        }
        assert_eq!(from_bcd(0x59), 59);
    }

    #[test]
    fn test_secs_of_month_leap_years() {
        // 2000 is divisible by 400 and keeps its leap day.
        assert_eq!(secs_of_month(2, 0), (31 + 29) * 86400);
        // 2001 is an ordinary year.
        assert_eq!(secs_of_month(2, 1), (31 + 28) * 86400);
        // 2100 is divisible by 100 but not 400: no leap day.
        assert_eq!(secs_of_month(2, 100), (31 + 28) * 86400);
    }

    #[test]
    fn test_secs_of_years_century_boundary() {
        // Full years 1970..=1999: 30 years, 7 of them leap.
        assert_eq!(secs_of_years(-1), (30 * 365 + 7) * 86400);
    }

    #[test]
    fn test_read_epoch_2024() {
        // 2024-01-01T10:15:30Z
        let mut cmos = CmosFixture::new(30, 15, 10, 1, 1, 24);
        assert_eq!(read_epoch(&mut cmos), 1_704_104_130);
    }

    #[test]
    fn test_read_epoch_waits_out_update_in_progress() {
        let mut cmos = CmosFixture::new(0, 0, 12, 15, 6, 23).with_update_in_progress(5);
        // 2023-06-15T12:00:00Z
        assert_eq!(read_epoch(&mut cmos), 1_686_830_400);
    }

    #[test]
    fn test_read_epoch_retries_on_torn_snapshot() {
        // The seconds register rolls from 59 to 0 between the first two
        // snapshots; the debounce loop must settle on the new value.
        let mut cmos = CmosFixture::new(59, 59, 23, 31, 12, 23).with_pending_change(0x00, to_bcd(0));
        // Accepted snapshot reads 2023-12-31T23:59:00Z.
        assert_eq!(read_epoch(&mut cmos), 1_704_067_140);
    }
}
