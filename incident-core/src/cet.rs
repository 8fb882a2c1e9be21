use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc, Weekday};

// Ticket timestamps are rendered in Central European Time. The EU rule:
// summer time runs from 01:00 UTC on the last Sunday of March until
// 01:00 UTC on the last Sunday of October.
const CET_SECS: i32 = 3600;
const CEST_SECS: i32 = 7200;

pub fn cet_offset(at: DateTime<Utc>) -> FixedOffset {
    let secs = if in_summer_time(at) { CEST_SECS } else { CET_SECS };
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}

pub fn to_cet(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&cet_offset(at))
}

pub fn now_cet() -> DateTime<FixedOffset> {
    to_cet(Utc::now())
}

/// ISO-8601 with numeric offset, e.g. `2025-10-23T14:00:00+02:00`.
pub fn now_cet_iso() -> String {
    now_cet().format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Human form used in chat footers, e.g. `2025-10-23 14:00:00 CEST`.
pub fn display(at: DateTime<Utc>) -> String {
    let name = if in_summer_time(at) { "CEST" } else { "CET" };
    format!("{} {name}", to_cet(at).format("%Y-%m-%d %H:%M:%S"))
}

fn in_summer_time(at: DateTime<Utc>) -> bool {
    let year = at.year();
    match (transition(year, 3), transition(year, 10)) {
        (Some(start), Some(end)) => at >= start && at < end,
        _ => false,
    }
}

fn transition(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let mut day = NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?;
    while day.weekday() != Weekday::Sun {
        day = day.pred_opt()?;
    }
    Some(day.and_hms_opt(1, 0, 0)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid timestamp")
    }

    #[test]
    fn winter_offset_is_plus_one() {
        let at = utc("2025-01-15T12:00:00Z");
        assert_eq!(cet_offset(at).local_minus_utc(), 3600);
        assert!(display(at).ends_with("CET"));
    }

    #[test]
    fn summer_offset_is_plus_two() {
        let at = utc("2025-07-15T12:00:00Z");
        assert_eq!(cet_offset(at).local_minus_utc(), 7200);
        assert!(display(at).ends_with("CEST"));
    }

    #[test]
    fn dst_boundaries_2025() {
        // Last Sunday of March 2025 is the 30th, of October the 26th.
        assert_eq!(cet_offset(utc("2025-03-30T00:59:59Z")).local_minus_utc(), 3600);
        assert_eq!(cet_offset(utc("2025-03-30T01:00:00Z")).local_minus_utc(), 7200);
        assert_eq!(cet_offset(utc("2025-10-26T00:59:59Z")).local_minus_utc(), 7200);
        assert_eq!(cet_offset(utc("2025-10-26T01:00:00Z")).local_minus_utc(), 3600);
    }

    #[test]
    fn iso_rendering_carries_numeric_offset() {
        let rendered = to_cet(utc("2025-07-15T12:30:00Z"))
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string();
        assert_eq!(rendered, "2025-07-15T14:30:00+02:00");
    }
}
