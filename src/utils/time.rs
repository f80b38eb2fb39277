use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Current time truncated to millisecond precision. Punch timestamps persist
/// as epoch milliseconds, so anything finer would not survive a round trip.
pub fn now_ms() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(Utc::now().timestamp_millis())
        .expect("current time is always in range")
}

/// This is the standard way of naming a punch file in punchlog. Month and day
/// are written without leading zeros, so file names must never be compared as
/// strings when ordering by date.
pub fn punch_file_name(date: NaiveDate) -> String {
    format!(
        "punch_{}_{}_{}.json",
        date.year(),
        date.month(),
        date.day()
    )
}

/// Inverse of [punch_file_name]. Returns [None] for anything that isn't a
/// well-formed punch file name.
pub fn parse_punch_file_name(name: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix("punch_")?.strip_suffix(".json")?;
    let mut parts = rest.splitn(3, '_');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}
