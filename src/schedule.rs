use chrono::NaiveDate;
use rocket::{Build, Rocket, State};
use rocket::serde::json::Json;
use rocket_dyn_templates::{context, Template};
use serde::Serialize;
use crate::classes::{split_range, ClassSession};
use crate::lifecycle::ReservationStatus;
use crate::reservation::Reservation;
use crate::store::{CollectionKey, Repository};
use crate::studio::display_name;
use crate::util::today_iso;
use crate::walltime::{leading_hour, overlaps, time_to_minutes, weekday_of};

pub const FIRST_SLOT_HOUR: i64 = 8;
pub const LAST_SLOT_HOUR: i64 = 17;

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AgendaKind {
    Class,
    Reservation,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub kind: AgendaKind,
    pub title: String,
    pub subtitle: String,
    pub start: String,
    pub end: String,
    /// sort key, 0 for an unreadable start
    pub start_minute: u32,
}

/// Agenda of one day. An empty `items` means nothing is scheduled.
#[derive(Serialize, Debug)]
pub struct DaySchedule {
    pub date: String,
    pub items: Vec<AgendaItem>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Slot {
    pub time: String,
    pub display: String,
    pub available: bool,
}

/// Classes on `date` and approved reservations on `date`, ordered by start minute.
/// Items starting at the same minute keep classes before reservations.
pub fn schedule_for(date: &str, reservations: &[Reservation], classes: &[ClassSession]) -> DaySchedule {
    let class_items = classes.iter()
        .filter(|c| c.date == date)
        .map(|c| {
            let (start, end) = split_range(&c.time);
            agenda_item(
                AgendaKind::Class,
                &c.name,
                format!("{} • {}", c.instructor, c.studio.as_deref().unwrap_or_default()).trim().to_string(),
                start,
                end.unwrap_or_default(),
            )
        });
    let reservation_items = reservations.iter()
        .filter(|r| r.date == date && r.status == ReservationStatus::Approved)
        .map(|r| agenda_item(AgendaKind::Reservation, &r.student_name, r.project_name.clone(), &r.from_time, &r.to_time));

    let mut items: Vec<AgendaItem> = class_items.chain(reservation_items).collect();
    // stable
    items.sort_by_key(|item| item.start_minute);
    DaySchedule { date: date.to_string(), items }
}

fn agenda_item(kind: AgendaKind, title: &str, subtitle: String, start: &str, end: &str) -> AgendaItem {
    AgendaItem {
        kind,
        title: title.to_string(),
        subtitle,
        start: start.trim().to_string(),
        end: end.trim().to_string(),
        start_minute: time_to_minutes(start),
    }
}

/// Grid label of a slot hour. Hours up to and including 12 are labelled AM, so noon reads "12:00 AM".
pub fn slot_label(hour: i64) -> String {
    if hour <= 12 {
        format!("{hour}:00 AM")
    } else {
        format!("{}:00 PM", hour - 12)
    }
}

fn hour_span(start: &str, end: &str) -> Option<(i64, i64)> {
    Some((leading_hour(start)?, leading_hour(end)?))
}

/// Hourly slots from 08:00 to 17:00 for one studio.
///
/// Works on whole hours only. A reservation blocks a slot when it is on the same date in the
/// same `studio` and not rejected. A class blocks a slot when it is in the same studio and
/// falls on the same weekday as `date`, whatever its own date is.
pub fn availability(date: &str, studio: &str, reservations: &[Reservation], classes: &[ClassSession]) -> Vec<Slot> {
    let weekday = weekday_of(date);
    let reservation_spans: Vec<(i64, i64)> = reservations.iter()
        .filter(|r| r.date == date && r.studio.as_deref() == Some(studio) && r.status != ReservationStatus::Rejected)
        .filter_map(|r| hour_span(&r.from_time, &r.to_time))
        .collect();
    let class_spans: Vec<(i64, i64)> = classes.iter()
        .filter(|c| c.studio.as_deref() == Some(studio) && weekday.is_some() && c.weekday() == weekday)
        .filter_map(|c| c.time_range())
        .filter_map(|(start, end)| hour_span(start, end))
        .collect();

    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .map(|hour| {
            let time = format!("{hour:0>2}:00");
            let available = !reservation_spans.iter()
                .chain(class_spans.iter())
                .any(|&(start, end)| overlaps(hour, hour + 1, start, end));
            Slot { time, display: slot_label(hour), available }
        })
        .collect()
}

#[get("/api/schedule/<date>")]
async fn get_schedule(date: &str, repo: &State<Repository>) -> Json<DaySchedule> {
    let reservations = repo.load::<Reservation>(CollectionKey::Reservations).await.records;
    let classes = repo.load::<ClassSession>(CollectionKey::Classes).await.records;
    Json(schedule_for(date, &reservations, &classes))
}

#[get("/api/availability/<date>/<studio>")]
async fn get_availability(date: &str, studio: &str, repo: &State<Repository>) -> Json<Vec<Slot>> {
    let reservations = repo.load::<Reservation>(CollectionKey::Reservations).await.records;
    let classes = repo.load::<ClassSession>(CollectionKey::Classes).await.records;
    Json(availability(date, studio, &reservations, &classes))
}

#[get("/schedule?<date>&<studio>")]
async fn schedule_page(date: Option<&str>, studio: Option<&str>, repo: &State<Repository>) -> Template {
    let date = date.map(str::to_string).unwrap_or_else(today_iso);
    let reservations = repo.load::<Reservation>(CollectionKey::Reservations).await.records;
    let classes = repo.load::<ClassSession>(CollectionKey::Classes).await.records;
    let schedule = schedule_for(&date, &reservations, &classes);
    let slots = studio.map(|studio| availability(&date, studio, &reservations, &classes));
    let day_name = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok().map(|d| d.format("%A").to_string());
    Template::render("schedule", context! {
        date,
        day_name,
        studio_name: studio.map(display_name),
        items: schedule.items,
        slots,
    })
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_schedule,
        get_availability,
        schedule_page,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::test::reservation;
    use serde_json::json;

    const DAY: &str = "2025-06-10";

    fn class(value: serde_json::Value) -> ClassSession {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_legacy_class_sorts_among_reservations() {
        let classes = vec![
            class(json!({"id": 1, "name": "Lighting", "instructor": "Dr. Noor", "studio": "Studio A", "date": DAY, "time": "1:00 PM - 2:30 PM"})),
        ];
        let mut morning = reservation("1", "Alice", DAY, "09:00", "10:00", ReservationStatus::Approved);
        morning.project_name = "Short film".into();
        let reservations = vec![
            reservation("2", "Bob", DAY, "15:00", "16:00", ReservationStatus::Approved),
            morning,
            reservation("3", "Carol", DAY, "11:00", "12:00", ReservationStatus::Pending),
        ];
        let schedule = schedule_for(DAY, &reservations, &classes);
        let titles: Vec<&str> = schedule.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Alice", "Lighting", "Bob"]);
        assert_eq!(schedule.items[0].subtitle, "Short film");
        assert_eq!(schedule.items[1].kind, AgendaKind::Class);
        assert_eq!(schedule.items[1].subtitle, "Dr. Noor • Studio A");
        assert_eq!(schedule.items[1].start, "13:00");
        assert_eq!(schedule.items[1].end, "14:30");
        assert_eq!(schedule.items[1].start_minute, 780);
    }

    #[test]
    fn test_ties_keep_classes_first() {
        let classes = vec![class(json!({"id": 1, "name": "Audio", "instructor": "B", "date": DAY, "time": "09:00-10:00"}))];
        let reservations = vec![reservation("1", "Alice", DAY, "9:00", "10:00", ReservationStatus::Approved)];
        let schedule = schedule_for(DAY, &reservations, &classes);
        assert_eq!(schedule.items[0].kind, AgendaKind::Class);
        assert_eq!(schedule.items[0].subtitle, "B •");
        assert_eq!(schedule.items[1].kind, AgendaKind::Reservation);
    }

    #[test]
    fn test_empty_day_differs_from_malformed_start() {
        let schedule = schedule_for(DAY, &[], &[]);
        assert!(schedule.items.is_empty());

        let reservations = vec![reservation("1", "Vague", DAY, "soon", "later", ReservationStatus::Approved)];
        let schedule = schedule_for(DAY, &reservations, &[]);
        assert_eq!(schedule.items.len(), 1);
        assert_eq!(schedule.items[0].start_minute, 0);
        assert_eq!(schedule.items[0].start, "soon");
    }

    #[test]
    fn test_slots_cover_working_day() {
        let slots = availability(DAY, "photography", &[], &[]);
        assert_eq!(slots.len(), 10);
        assert_eq!(slots[0].time, "08:00");
        assert_eq!(slots[0].display, "8:00 AM");
        assert_eq!(slots[4].time, "12:00");
        assert_eq!(slots[4].display, "12:00 AM");
        assert_eq!(slots[5].display, "1:00 PM");
        assert_eq!(slots[9].time, "17:00");
        assert_eq!(slots[9].display, "5:00 PM");
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn test_weekday_class_occupies_slots() {
        // dated a week earlier, same weekday, no reservation on DAY
        let classes = vec![class(json!({"id": 1, "name": "Weekly", "instructor": "T", "studio": "photography", "date": "2025-06-03", "time": "10:00-12:00"}))];
        let slots = availability(DAY, "photography", &[], &classes);
        let occupied: Vec<&str> = slots.iter().filter(|s| !s.available).map(|s| s.time.as_str()).collect();
        assert_eq!(occupied, vec!["10:00", "11:00"]);

        assert!(availability("2025-06-11", "photography", &[], &classes).iter().all(|s| s.available));
        assert!(availability(DAY, "audio-recording", &[], &classes).iter().all(|s| s.available));
    }

    #[test]
    fn test_explicit_day_of_week_wins() {
        let classes = vec![class(json!({"id": 1, "name": "Weekly", "instructor": "T", "studio": "photography", "dayOfWeek": 2, "date": "2025-06-12", "time": "08:00-09:00"}))];
        let slots = availability(DAY, "photography", &[], &classes);
        assert!(!slots[0].available);
        assert!(slots[1].available);
    }

    #[test]
    fn test_reservation_hours_are_truncated() {
        let mut r = reservation("1", "Alice", DAY, "9:30", "10:15", ReservationStatus::Pending);
        r.studio = Some("photography".into());
        let mut rejected = reservation("2", "Bob", DAY, "14:00", "15:00", ReservationStatus::Rejected);
        rejected.studio = Some("photography".into());
        let slots = availability(DAY, "photography", &[r, rejected], &[]);
        let occupied: Vec<&str> = slots.iter().filter(|s| !s.available).map(|s| s.time.as_str()).collect();
        // 9:30-10:15 reads as hours 9..10
        assert_eq!(occupied, vec!["09:00"]);
    }
}
