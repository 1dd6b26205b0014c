use rocket::{Build, Rocket, State};
use rocket::serde::json::Json;
use serde::Serialize;
use crate::classes::ClassSession;
use crate::lifecycle::ReservationStatus;
use crate::reservation::Reservation;
use crate::store::{CollectionKey, Repository};
use crate::util::today_iso;

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_reservations: usize,
    pub pending_requests: usize,
    pub approved_today: usize,
    pub total_classes: usize,
}

pub fn stats(date: &str, reservations: &[Reservation], classes: &[ClassSession]) -> DashboardStats {
    DashboardStats {
        total_reservations: reservations.len(),
        pending_requests: reservations.iter().filter(|r| r.status == ReservationStatus::Pending).count(),
        approved_today: reservations.iter().filter(|r| r.status == ReservationStatus::Approved && r.date == date).count(),
        total_classes: classes.len(),
    }
}

#[get("/api/stats?<date>")]
async fn get_stats(date: Option<&str>, repo: &State<Repository>) -> Json<DashboardStats> {
    let date = date.map(str::to_string).unwrap_or_else(today_iso);
    let reservations = repo.load::<Reservation>(CollectionKey::Reservations).await.records;
    let classes = repo.load::<ClassSession>(CollectionKey::Classes).await.records;
    Json(stats(&date, &reservations, &classes))
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_stats,
    ])
}
