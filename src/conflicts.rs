use std::fmt::{Display, Formatter};
use crate::classes::{split_range, ClassSession};
use crate::lifecycle::ReservationStatus;
use crate::reservation::Reservation;
use crate::walltime::{overlaps, time_to_minutes, WallTime};

/// An existing booking colliding with a candidate time range.
#[derive(Debug, Clone, PartialEq)]
pub enum Conflict {
    Reservation { student_name: String, from_time: String, to_time: String },
    Class { name: String, time: String },
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::Reservation { student_name, from_time, to_time } => write!(f, "Reservation ({student_name}) {from_time}-{to_time}"),
            Conflict::Class { name, time } => write!(f, "Class ({name}) {time}"),
        }
    }
}

/// Reservations (not rejected) and classes on `date` overlapping `[from, to)`.
///
/// A candidate that does not parse, or whose end is not after its start, has no conflicts.
/// Reservation conflicts come first, then classes, each in storage order.
pub fn find_conflicts(date: &str, from: &str, to: &str, reservations: &[Reservation], classes: &[ClassSession]) -> Vec<Conflict> {
    if date.trim().is_empty() {
        return Vec::new();
    }
    let (Some(start), Some(end)) = (WallTime::parse(from), WallTime::parse(to)) else {
        return Vec::new();
    };
    let (start, end) = (start.minutes(), end.minutes());
    if end <= start {
        return Vec::new();
    }

    let reservation_conflicts = reservations.iter()
        .filter(|r| r.date == date && r.status != ReservationStatus::Rejected)
        .filter(|r| overlaps(start, end, time_to_minutes(&r.from_time), time_to_minutes(&r.to_time)))
        .map(|r| Conflict::Reservation {
            student_name: r.student_name.clone(),
            from_time: r.from_time.clone(),
            to_time: r.to_time.clone(),
        });
    let class_conflicts = classes.iter()
        .filter(|c| c.date == date && !c.time.is_empty())
        .filter(|c| {
            let (class_start, class_end) = split_range(&c.time);
            overlaps(start, end, time_to_minutes(class_start), class_end.map(time_to_minutes).unwrap_or(0))
        })
        .map(|c| Conflict::Class { name: c.name.clone(), time: c.time.clone() });

    reservation_conflicts.chain(class_conflicts).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::test::reservation;

    const DAY: &str = "2025-06-10";

    fn class(name: &str, date: &str, time: &str) -> ClassSession {
        serde_json::from_value(serde_json::json!({"id": 1, "name": name, "instructor": "T", "date": date, "time": time})).unwrap()
    }

    #[test]
    fn test_overlapping_reservation() {
        let reservations = vec![reservation("1", "Alice", DAY, "09:00", "11:00", ReservationStatus::Pending)];
        let conflicts = find_conflicts(DAY, "10:00", "12:00", &reservations, &[]);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].to_string(), "Reservation (Alice) 09:00-11:00");
    }

    #[test]
    fn test_abutting_reservation() {
        let reservations = vec![reservation("1", "Alice", DAY, "09:00", "11:00", ReservationStatus::Pending)];
        assert!(find_conflicts(DAY, "11:00", "12:00", &reservations, &[]).is_empty());
    }

    #[test]
    fn test_rejected_and_other_days_are_ignored() {
        let reservations = vec![
            reservation("1", "Alice", DAY, "09:00", "11:00", ReservationStatus::Rejected),
            reservation("2", "Bob", "2025-06-11", "09:00", "11:00", ReservationStatus::Approved),
        ];
        assert!(find_conflicts(DAY, "9am", "10am", &reservations, &[]).is_empty());
    }

    #[test]
    fn test_reservations_before_classes_in_storage_order() {
        let reservations = vec![
            reservation("1", "Late", DAY, "13:00", "15:00", ReservationStatus::Approved),
            reservation("2", "Early", DAY, "08:00", "10:00", ReservationStatus::Pending),
        ];
        let classes = vec![
            class("Lighting", DAY, "9:00 AM - 10:00 AM"),
            class("Sound", "2025-06-11", "09:00-17:00"),
            class("Empty", DAY, ""),
        ];
        let conflicts: Vec<String> = find_conflicts(DAY, "08:30", "14:00", &reservations, &classes)
            .iter().map(Conflict::to_string).collect();
        assert_eq!(conflicts, vec![
            "Reservation (Late) 13:00-15:00",
            "Reservation (Early) 08:00-10:00",
            "Class (Lighting) 09:00-10:00",
        ]);
    }

    #[test]
    fn test_invalid_candidate_has_no_conflicts() {
        let reservations = vec![reservation("1", "Alice", DAY, "09:00", "11:00", ReservationStatus::Pending)];
        assert!(find_conflicts(DAY, "noon", "12:00", &reservations, &[]).is_empty());
        assert!(find_conflicts(DAY, "10:00", "10:00", &reservations, &[]).is_empty());
        assert!(find_conflicts(DAY, "11:00", "10:00", &reservations, &[]).is_empty());
        assert!(find_conflicts("", "10:00", "11:00", &reservations, &[]).is_empty());
    }

    #[test]
    fn test_malformed_stored_times_fall_back_to_midnight() {
        // "soon" reads as minute 0, so the stored range is 00:00-10:00
        let reservations = vec![reservation("1", "Vague", DAY, "soon", "10:00", ReservationStatus::Pending)];
        assert_eq!(find_conflicts(DAY, "09:00", "09:30", &reservations, &[]).len(), 1);
        assert!(find_conflicts(DAY, "10:00", "11:00", &reservations, &[]).is_empty());
    }
}
