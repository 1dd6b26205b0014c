use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use log::info;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Serialize};
use crate::lifecycle::{self, BorrowAction, BorrowStatus, Tracked, Transition};
use crate::notify::Notifier;
use crate::record::{is_blank, lenient_text, RecordId};
use crate::store::{CollectionKey, Repository};
use crate::util::{anyhow_to_custom_error, transition_to_response};

const NOT_APPLICABLE: &str = "N/A";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", from = "StoredBorrow")]
pub struct BorrowRequest {
    pub id: RecordId,
    pub student_name: String,
    pub student_id: String,
    pub email: String,
    pub phone: String,
    pub borrow_date: String,
    pub return_date: String,
    pub dr: String,
    pub class_type: String,
    pub class_other: String,
    pub tools: String,
    pub supervisor: String,
    pub status: BorrowStatus,
    pub submitted_at: String,
}

impl BorrowRequest {
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.submitted_at).ok().map(|dt| dt.to_utc())
    }
}

impl Tracked for BorrowRequest {
    type Status = BorrowStatus;
    fn id(&self) -> &RecordId {
        &self.id
    }
    fn status(&self) -> BorrowStatus {
        self.status
    }
    fn set_status(&mut self, status: BorrowStatus) {
        self.status = status;
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StoredBorrow {
    id: RecordId,
    #[serde(deserialize_with = "lenient_text")]
    student_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    student_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    email: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    phone: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    borrow_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    return_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    dr: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    class_type: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    class_other: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    tools: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    supervisor: Option<String>,
    status: BorrowStatus,
    #[serde(deserialize_with = "lenient_text")]
    submitted_at: Option<String>,
}

fn or_not_applicable(value: Option<String>) -> String {
    value.filter(|v| !is_blank(v)).unwrap_or_else(|| NOT_APPLICABLE.to_string())
}

impl From<StoredBorrow> for BorrowRequest {
    fn from(b: StoredBorrow) -> Self {
        Self {
            id: b.id,
            student_name: b.student_name.unwrap_or_default(),
            student_id: b.student_id.unwrap_or_default(),
            email: b.email.unwrap_or_default(),
            phone: b.phone.unwrap_or_default(),
            borrow_date: b.borrow_date.unwrap_or_default(),
            return_date: b.return_date.unwrap_or_default(),
            dr: or_not_applicable(b.dr),
            class_type: b.class_type.unwrap_or_default(),
            class_other: or_not_applicable(b.class_other),
            tools: b.tools.unwrap_or_default(),
            supervisor: b.supervisor.unwrap_or_default(),
            status: b.status,
            submitted_at: b.submitted_at.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase", default)]
pub struct PostedBorrow {
    pub student_name: String,
    pub student_id: String,
    pub email: String,
    pub phone: String,
    pub borrow_date: String,
    pub return_date: String,
    pub dr: Option<String>,
    pub class_type: String,
    pub class_other: Option<String>,
    pub tools: String,
    pub supervisor: String,
}

fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

impl PostedBorrow {
    pub fn into_borrow(self, id: RecordId, now: DateTime<Utc>) -> Result<BorrowRequest, String> {
        let (Some(borrow_date), Some(return_date)) = (parse_day(&self.borrow_date), parse_day(&self.return_date)) else {
            return Err(format!("Invalid borrow period: '{}' - '{}'", self.borrow_date, self.return_date));
        };
        if return_date <= borrow_date {
            return Err("Return date must be after borrow date".to_string());
        }
        Ok(BorrowRequest {
            id,
            student_name: self.student_name,
            student_id: self.student_id,
            email: self.email,
            phone: self.phone,
            borrow_date: self.borrow_date,
            return_date: self.return_date,
            dr: or_not_applicable(self.dr),
            class_type: self.class_type,
            class_other: or_not_applicable(self.class_other),
            tools: self.tools,
            supervisor: self.supervisor,
            status: BorrowStatus::Pending,
            submitted_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        })
    }
}

/// Newest submission first, optionally only one status. Unreadable submission times go last.
pub fn list_borrows<'a>(borrows: &'a [BorrowRequest], status: Option<&str>) -> Vec<&'a BorrowRequest> {
    let status = status.filter(|s| *s != "all" && !s.is_empty()).map(BorrowStatus::from_text);
    borrows.iter()
        .filter(|b| status.is_none_or(|s| s == Some(b.status)))
        .sorted_by(|a, b| b.submitted_at().cmp(&a.submitted_at()))
        .collect()
}

#[get("/api/borrows?<status>")]
async fn get_borrows(status: Option<&str>, repo: &State<Repository>) -> Json<Vec<BorrowRequest>> {
    let coll = repo.load::<BorrowRequest>(CollectionKey::Borrows).await;
    Json(list_borrows(&coll.records, status).into_iter().cloned().collect())
}

#[post("/api/borrows", data = "<posted>")]
async fn post_borrow(posted: Json<PostedBorrow>, repo: &State<Repository>, notifier: &State<Notifier>) -> Result<Json<BorrowRequest>, Custom<String>> {
    let mut coll = repo.load::<BorrowRequest>(CollectionKey::Borrows).await;
    let now = Utc::now();
    let id = RecordId::time_ordered(now.timestamp_millis(), coll.records.iter().map(|b| &b.id));
    let borrow = posted.into_inner().into_borrow(id, now)
        .map_err(|e| Custom(Status::BadRequest, e))?;
    coll.records.push(borrow.clone());
    repo.save(CollectionKey::Borrows, &mut coll).await.map_err(anyhow_to_custom_error)?;
    info!("Borrow request created, id: {}, period: {} - {}", borrow.id, borrow.borrow_date, borrow.return_date);
    notifier.borrow_submitted(&borrow);
    Ok(Json(borrow))
}

async fn borrow_transition(id: &str, action: BorrowAction, repo: &Repository) -> Result<Json<Transition<BorrowStatus>>, Custom<String>> {
    let outcome = lifecycle::transition::<BorrowRequest>(repo, CollectionKey::Borrows, id, action).await
        .map_err(anyhow_to_custom_error)?;
    transition_to_response(outcome, "Borrow request", id)
}

#[post("/api/borrows/<id>/approve")]
async fn approve_borrow(id: &str, repo: &State<Repository>) -> Result<Json<Transition<BorrowStatus>>, Custom<String>> {
    borrow_transition(id, BorrowAction::Approve, repo).await
}

#[post("/api/borrows/<id>/reject")]
async fn reject_borrow(id: &str, repo: &State<Repository>) -> Result<Json<Transition<BorrowStatus>>, Custom<String>> {
    borrow_transition(id, BorrowAction::Reject, repo).await
}

#[post("/api/borrows/<id>/return")]
async fn return_borrow(id: &str, repo: &State<Repository>) -> Result<Json<Transition<BorrowStatus>>, Custom<String>> {
    borrow_transition(id, BorrowAction::Return, repo).await
}

#[delete("/api/borrows/<id>")]
async fn delete_borrow(id: &str, repo: &State<Repository>) -> Result<(), Custom<String>> {
    let deleted = lifecycle::delete::<BorrowRequest>(repo, CollectionKey::Borrows, id).await
        .map_err(anyhow_to_custom_error)?;
    if deleted {
        Ok(())
    } else {
        Err(Custom(Status::NotFound, format!("Borrow request {id} not found")))
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        get_borrows,
        post_borrow,
        approve_borrow,
        reject_borrow,
        return_borrow,
        delete_borrow,
    ])
}
