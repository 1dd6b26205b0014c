use std::fmt::{Display, Formatter};
use chrono::{Datelike, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    Am,
    Pm,
}

/// Time of day as typed by a user: "9", "9:30", "9:30am", "2 PM", "14:00".
///
/// Only the shape `hour[:minute][ meridiem]` is checked, hour and minute ranges
/// are not. "25:00" parses and keeps its hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    hour: u32,
    minute: u32,
    meridiem: Option<Meridiem>,
}

fn is_digits(s: &str, min_len: usize, max_len: usize) -> bool {
    (min_len..=max_len).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

impl WallTime {
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim().to_ascii_lowercase();
        let (core, meridiem) = if let Some(rest) = s.strip_suffix("am") {
            (rest.trim_end(), Some(Meridiem::Am))
        } else if let Some(rest) = s.strip_suffix("pm") {
            (rest.trim_end(), Some(Meridiem::Pm))
        } else {
            (s.as_str(), None)
        };
        let (hour, minute) = match core.split_once(':') {
            Some((hour, minute)) => (hour, Some(minute)),
            None => (core, None),
        };
        if !is_digits(hour, 1, 2) {
            return None;
        }
        let minute = match minute {
            Some(minute) if is_digits(minute, 2, 2) => minute.parse().ok()?,
            Some(_) => return None,
            None => 0,
        };
        Some(Self {
            hour: hour.parse().ok()?,
            minute,
            meridiem,
        })
    }
    /// Hour on the 24-hour clock. "12am" is 0, "12pm" stays 12.
    fn hour24(&self) -> u32 {
        match self.meridiem {
            Some(Meridiem::Pm) if self.hour != 12 => self.hour + 12,
            Some(Meridiem::Am) if self.hour == 12 => 0,
            _ => self.hour,
        }
    }
    pub fn minutes(&self) -> u32 {
        self.hour24() * 60 + self.minute
    }
    pub fn to_24h_string(&self) -> String {
        format!("{:0>2}:{:0>2}", self.hour24(), self.minute)
    }
    /// Input without a meridiem is read as a 24-hour value, so "9" shows as "9:00 AM".
    pub fn to_12h_string(&self) -> String {
        let (hour, meridiem) = match self.meridiem {
            Some(meridiem) => (self.hour, meridiem),
            None if self.hour == 0 => (12, Meridiem::Am),
            None if self.hour == 12 => (12, Meridiem::Pm),
            None if self.hour > 12 => (self.hour - 12, Meridiem::Pm),
            None => (self.hour, Meridiem::Am),
        };
        format!("{hour}:{:0>2} {meridiem}", self.minute)
    }
}

impl Display for Meridiem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Meridiem::Am => f.write_str("AM"),
            Meridiem::Pm => f.write_str("PM"),
        }
    }
}

/// Minutes since midnight, unparsable input counts as 0 and sorts first.
pub fn time_to_minutes(s: &str) -> u32 {
    WallTime::parse(s).map(|t| t.minutes()).unwrap_or(0)
}

/// Canonical "HH:MM", unparsable input is returned unchanged.
pub fn to_24_hour(s: &str) -> String {
    WallTime::parse(s).map(|t| t.to_24h_string()).unwrap_or_else(|| s.to_string())
}

/// "H:MM AM/PM" display form, unparsable input is returned unchanged.
pub fn to_12_hour(s: &str) -> String {
    WallTime::parse(s).map(|t| t.to_12h_string()).unwrap_or_else(|| s.to_string())
}

/// Integer value of the text before the first ':' the way a lenient integer
/// parse reads it: leading whitespace and sign allowed, stops at the first
/// non-digit. "9:30 AM" gives 9, "2 pm" gives 2, "pm" gives nothing.
pub fn leading_hour(s: &str) -> Option<i64> {
    let head = s.split(':').next().unwrap_or_default().trim_start();
    let (negative, digits) = match head.as_bytes().first() {
        Some(b'-') => (true, &head[1..]),
        Some(b'+') => (false, &head[1..]),
        _ => (false, head),
    };
    let end = digits.bytes().position(|b| !b.is_ascii_digit()).unwrap_or(digits.len());
    let hour = digits[..end].parse::<i64>().ok()?;
    Some(if negative { -hour } else { hour })
}

/// Day of week of an ISO "YYYY-MM-DD" date, 0 is Sunday.
pub fn weekday_of(date: &str) -> Option<u32> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()
        .map(|d| d.weekday().num_days_from_sunday())
}

/// Half-open interval overlap, abutting intervals do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}
