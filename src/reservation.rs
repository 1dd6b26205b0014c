use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::info;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Serialize};
use crate::classes::{split_range, ClassSession};
use crate::conflicts::{find_conflicts, Conflict};
use crate::lifecycle::{self, ReservationAction, ReservationStatus, Tracked, Transition};
use crate::notify::Notifier;
use crate::record::{is_blank, lenient_text, RecordId};
use crate::store::{CollectionKey, Repository};
use crate::util::{anyhow_to_custom_error, today_iso, transition_to_response};
use crate::walltime::WallTime;

/// A student's request to use a studio. `duration` is free text and never used in time math.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", from = "StoredReservation")]
pub struct Reservation {
    pub id: RecordId,
    pub student_name: String,
    pub student_id: String,
    pub email: String,
    pub phone: String,
    pub college: String,
    pub department: String,
    pub date: String,
    pub from_time: String,
    pub to_time: String,
    pub duration: String,
    pub project_name: String,
    pub about_project: String,
    pub needed_tools: String,
    pub supervisor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio_type: Option<String>,
    pub status: ReservationStatus,
    pub submitted_at: String,
}

impl Reservation {
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.submitted_at).ok().map(|dt| dt.to_utc())
    }
    pub fn in_studio(&self, studio: &str) -> bool {
        self.studio_type.as_deref() == Some(studio) || self.studio.as_deref() == Some(studio)
    }
}

impl Tracked for Reservation {
    type Status = ReservationStatus;
    fn id(&self) -> &RecordId {
        &self.id
    }
    fn status(&self) -> ReservationStatus {
        self.status
    }
    fn set_status(&mut self, status: ReservationStatus) {
        self.status = status;
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StoredReservation {
    id: RecordId,
    #[serde(deserialize_with = "lenient_text")]
    student_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    student_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    email: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    phone: Option<String>,
    #[serde(deserialize_with = "lenient_text", alias = "collegeText")]
    college: Option<String>,
    #[serde(deserialize_with = "lenient_text", alias = "departmentText")]
    department: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    from_time: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    to_time: Option<String>,
    /// combined "start-end" written by older front ends
    #[serde(deserialize_with = "lenient_text")]
    time: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    duration: Option<String>,
    #[serde(deserialize_with = "lenient_text", alias = "projectTitle")]
    project_name: Option<String>,
    #[serde(deserialize_with = "lenient_text", alias = "projectDescription")]
    about_project: Option<String>,
    #[serde(deserialize_with = "lenient_text", alias = "equipmentNeeded")]
    needed_tools: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    supervisor: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    studio: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    studio_type: Option<String>,
    status: ReservationStatus,
    #[serde(deserialize_with = "lenient_text", alias = "createdAt")]
    submitted_at: Option<String>,
}

impl From<StoredReservation> for Reservation {
    fn from(r: StoredReservation) -> Self {
        let (legacy_from, legacy_to) = match r.time.as_deref() {
            Some(time) => {
                let (start, end) = split_range(time);
                (Some(start.to_string()), end.map(str::to_string))
            }
            None => (None, None),
        };
        let pick = |value: Option<String>, legacy: Option<String>| {
            value.filter(|v| !v.is_empty()).or(legacy).unwrap_or_default()
        };
        Self {
            id: r.id,
            student_name: r.student_name.unwrap_or_default(),
            student_id: r.student_id.unwrap_or_default(),
            email: r.email.unwrap_or_default(),
            phone: r.phone.unwrap_or_default(),
            college: r.college.unwrap_or_default(),
            department: r.department.unwrap_or_default(),
            date: r.date.unwrap_or_default(),
            from_time: pick(r.from_time, legacy_from),
            to_time: pick(r.to_time, legacy_to),
            duration: r.duration.unwrap_or_default(),
            project_name: r.project_name.unwrap_or_default(),
            about_project: r.about_project.unwrap_or_default(),
            needed_tools: r.needed_tools.unwrap_or_default(),
            supervisor: r.supervisor.unwrap_or_default(),
            studio: r.studio.filter(|s| !is_blank(s)),
            studio_type: r.studio_type.filter(|s| !is_blank(s)),
            status: r.status,
            submitted_at: r.submitted_at.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct PostedReservation {
    pub student_name: String,
    pub student_id: String,
    pub email: String,
    pub phone: String,
    #[serde(alias = "collegeText")]
    pub college: String,
    #[serde(alias = "departmentText")]
    pub department: String,
    pub date: Option<String>,
    pub from_time: String,
    pub to_time: String,
    pub duration: String,
    pub project_name: String,
    pub about_project: String,
    pub needed_tools: String,
    pub supervisor: String,
    pub studio: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub date: String,
    pub from_time: String,
    pub to_time: String,
}

#[derive(Serialize, Debug)]
pub struct ConflictReport {
    pub conflicts: Vec<String>,
}

impl PostedReservation {
    /// The date defaults to today, start and end must parse with the end after the start.
    pub fn into_reservation(self, id: RecordId, now: DateTime<Utc>) -> Result<Reservation, String> {
        let (Some(start), Some(end)) = (WallTime::parse(&self.from_time), WallTime::parse(&self.to_time)) else {
            return Err(format!("Unrecognized time range: '{}' - '{}'", self.from_time, self.to_time));
        };
        if end.minutes() <= start.minutes() {
            return Err("End time must be after start time".to_string());
        }
        let date = self.date.filter(|d| !is_blank(d)).unwrap_or_else(today_iso);
        Ok(Reservation {
            id,
            student_name: self.student_name,
            student_id: self.student_id,
            email: self.email,
            phone: self.phone,
            college: self.college,
            department: self.department,
            date,
            from_time: self.from_time,
            to_time: self.to_time,
            duration: self.duration,
            project_name: self.project_name,
            about_project: self.about_project,
            needed_tools: self.needed_tools,
            supervisor: self.supervisor,
            studio: None,
            studio_type: self.studio.filter(|s| !is_blank(s)),
            status: ReservationStatus::Pending,
            submitted_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        })
    }
}

pub fn filter_reservations<'a>(reservations: &'a [Reservation], status: Option<&str>, studio: Option<&str>) -> Vec<&'a Reservation> {
    let status = status.filter(|s| *s != "all" && !s.is_empty()).map(ReservationStatus::from_text);
    let studio = studio.filter(|s| *s != "all" && !s.is_empty());
    reservations.iter()
        .filter(|r| status.is_none_or(|s| s == Some(r.status)))
        .filter(|r| studio.is_none_or(|s| r.in_studio(s)))
        .collect()
}

/// Pending reservations, most recently submitted first.
pub fn recent_pending(reservations: &[Reservation], limit: usize) -> Vec<&Reservation> {
    reservations.iter()
        .filter(|r| r.status == ReservationStatus::Pending)
        .sorted_by(|a, b| b.submitted_at().cmp(&a.submitted_at()))
        .take(limit)
        .collect()
}

#[get("/api/reservations?<status>&<studio>")]
async fn get_reservations(status: Option<&str>, studio: Option<&str>, repo: &State<Repository>) -> Json<Vec<Reservation>> {
    let coll = repo.load::<Reservation>(CollectionKey::Reservations).await;
    Json(filter_reservations(&coll.records, status, studio).into_iter().cloned().collect())
}

#[get("/api/reservations/recent")]
async fn get_recent_reservations(repo: &State<Repository>) -> Json<Vec<Reservation>> {
    let coll = repo.load::<Reservation>(CollectionKey::Reservations).await;
    Json(recent_pending(&coll.records, 5).into_iter().cloned().collect())
}

#[post("/api/reservations/conflicts", data = "<candidate>")]
async fn post_conflicts(candidate: Json<Candidate>, repo: &State<Repository>) -> Json<ConflictReport> {
    let reservations = repo.load::<Reservation>(CollectionKey::Reservations).await.records;
    let classes = repo.load::<ClassSession>(CollectionKey::Classes).await.records;
    let conflicts = find_conflicts(&candidate.date, &candidate.from_time, &candidate.to_time, &reservations, &classes);
    Json(ConflictReport { conflicts: conflicts.iter().map(Conflict::to_string).collect() })
}

#[post("/api/reservations", data = "<posted>")]
async fn post_reservation(posted: Json<PostedReservation>, repo: &State<Repository>, notifier: &State<Notifier>) -> Result<Json<Reservation>, Custom<String>> {
    let mut coll = repo.load::<Reservation>(CollectionKey::Reservations).await;
    let now = Utc::now();
    let id = RecordId::time_ordered(now.timestamp_millis(), coll.records.iter().map(|r| &r.id));
    let posted = posted.into_inner();
    let studio_type = posted.studio.clone();
    let reservation = posted.into_reservation(id, now)
        .map_err(|e| Custom(Status::BadRequest, e))?;

    let classes = repo.load::<ClassSession>(CollectionKey::Classes).await.records;
    let conflicts = find_conflicts(&reservation.date, &reservation.from_time, &reservation.to_time, &coll.records, &classes);
    if !conflicts.is_empty() {
        info!("Reservation on {} {}-{} refused, {} conflicts", reservation.date, reservation.from_time, reservation.to_time, conflicts.len());
        return Err(Custom(Status::Conflict, format!("Selected time is not available. Conflicts: {}", conflicts.iter().join("; "))));
    }

    coll.records.push(reservation.clone());
    repo.save(CollectionKey::Reservations, &mut coll).await.map_err(anyhow_to_custom_error)?;
    info!("Reservation created, id: {}, date: {}", reservation.id, reservation.date);
    notifier.reservation_submitted(&reservation, studio_type.as_deref());
    Ok(Json(reservation))
}

async fn reservation_transition(id: &str, action: ReservationAction, repo: &Repository, notifier: &Notifier) -> Result<Json<Transition<ReservationStatus>>, Custom<String>> {
    let outcome = lifecycle::transition::<Reservation>(repo, CollectionKey::Reservations, id, action).await
        .map_err(anyhow_to_custom_error)?;
    if let Transition::Applied { .. } = outcome {
        let coll = repo.load::<Reservation>(CollectionKey::Reservations).await;
        if let Some(reservation) = coll.records.iter().find(|r| r.id.matches(id)) {
            notifier.reservation_status_changed(reservation);
        }
    }
    transition_to_response(outcome, "Reservation", id)
}

#[post("/api/reservations/<id>/approve")]
async fn approve_reservation(id: &str, repo: &State<Repository>, notifier: &State<Notifier>) -> Result<Json<Transition<ReservationStatus>>, Custom<String>> {
    reservation_transition(id, ReservationAction::Approve, repo, notifier).await
}

#[post("/api/reservations/<id>/reject")]
async fn reject_reservation(id: &str, repo: &State<Repository>, notifier: &State<Notifier>) -> Result<Json<Transition<ReservationStatus>>, Custom<String>> {
    reservation_transition(id, ReservationAction::Reject, repo, notifier).await
}

#[delete("/api/reservations/<id>")]
async fn delete_reservation(id: &str, repo: &State<Repository>) -> Result<(), Custom<String>> {
    let deleted = lifecycle::delete::<Reservation>(repo, CollectionKey::Reservations, id).await
        .map_err(anyhow_to_custom_error)?;
    if deleted {
        Ok(())
    } else {
        Err(Custom(Status::NotFound, format!("Reservation {id} not found")))
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_reservations,
        get_recent_reservations,
        post_conflicts,
        post_reservation,
        approve_reservation,
        reject_reservation,
        delete_reservation,
    ])
}
